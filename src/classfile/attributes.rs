//! Attributes and the structured attribute payloads the filter rewrites.
//!
//! Attributes are kept as raw `(name, info)` pairs so unknown attributes survive a
//! rewrite untouched. The payloads the filter needs to understand are decoded on demand
//! from the raw bytes and encoded back with the helpers in this module.

use crate::{
    classfile::constantpool::ConstantPool,
    file::{parser::Parser, writer::Writer},
    Result,
};

/// `Code`
pub const CODE: &str = "Code";
/// `RuntimeVisibleAnnotations`
pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
/// `RuntimeInvisibleAnnotations`
pub const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
/// `InnerClasses`
pub const INNER_CLASSES: &str = "InnerClasses";
/// `EnclosingMethod`
pub const ENCLOSING_METHOD: &str = "EnclosingMethod";
/// `BootstrapMethods`
pub const BOOTSTRAP_METHODS: &str = "BootstrapMethods";
/// `NestMembers`
pub const NEST_MEMBERS: &str = "NestMembers";
/// `PermittedSubclasses`
pub const PERMITTED_SUBCLASSES: &str = "PermittedSubclasses";

/// A raw attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Constant pool index of the attribute name
    pub name_index: u16,
    /// Attribute payload, excluding the name and length header
    pub info: Vec<u8>,
}

impl Attribute {
    /// Read a `u16` count followed by that many attributes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated attributes.
    pub fn parse_list(parser: &mut Parser<'_>) -> Result<Vec<Attribute>> {
        let count = parser.read_be::<u16>()?;
        let mut attributes = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let name_index = parser.read_be::<u16>()?;
            let len = parser.read_be::<u32>()? as usize;
            let info = parser.read_bytes(len)?.to_vec();
            attributes.push(Attribute { name_index, info });
        }
        Ok(attributes)
    }

    /// Write a `u16` count followed by the attributes.
    ///
    /// # Errors
    /// Returns an error if there are too many attributes or one is too large.
    pub fn write_list(attributes: &[Attribute], out: &mut Writer) -> Result<()> {
        out.write_count(attributes.len(), "attributes")?;
        for attribute in attributes {
            out.write_be(attribute.name_index);
            let slot = out.reserve_u32();
            out.write_bytes(&attribute.info);
            out.patch_length(slot)?;
        }
        Ok(())
    }

    /// Position of the first attribute called `name`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if an attribute name index is invalid.
    pub fn position(
        attributes: &[Attribute],
        pool: &ConstantPool,
        name: &str,
    ) -> Result<Option<usize>> {
        for (index, attribute) in attributes.iter().enumerate() {
            if pool.utf8(attribute.name_index)? == name {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// The first attribute called `name`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if an attribute name index is invalid.
    pub fn find<'a>(
        attributes: &'a [Attribute],
        pool: &ConstantPool,
        name: &str,
    ) -> Result<Option<&'a Attribute>> {
        Ok(Self::position(attributes, pool, name)?.map(|index| &attributes[index]))
    }
}

/// One record of the `InnerClasses` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InnerClassEntry {
    /// Class constant of the nested class
    pub inner_class_info_index: u16,
    /// Class constant of the declaring class, `0` for local and anonymous classes
    pub outer_class_info_index: u16,
    /// Utf8 constant of the simple name, `0` for anonymous classes
    pub inner_name_index: u16,
    /// Access flags of the nested class as declared in source
    pub inner_class_access_flags: u16,
}

/// Decode an `InnerClasses` payload.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] for truncated input.
pub fn parse_inner_classes(info: &[u8]) -> Result<Vec<InnerClassEntry>> {
    let mut parser = Parser::new(info);
    let count = parser.read_be::<u16>()?;
    let mut entries = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        entries.push(InnerClassEntry {
            inner_class_info_index: parser.read_be()?,
            outer_class_info_index: parser.read_be()?,
            inner_name_index: parser.read_be()?,
            inner_class_access_flags: parser.read_be()?,
        });
    }
    Ok(entries)
}

/// Encode an `InnerClasses` payload.
///
/// # Errors
/// Returns an error if there are more than 65535 entries.
pub fn write_inner_classes(entries: &[InnerClassEntry]) -> Result<Vec<u8>> {
    let mut out = Writer::new();
    out.write_count(entries.len(), "inner class entries")?;
    for entry in entries {
        out.write_be(entry.inner_class_info_index);
        out.write_be(entry.outer_class_info_index);
        out.write_be(entry.inner_name_index);
        out.write_be(entry.inner_class_access_flags);
    }
    Ok(out.into_inner())
}

/// Decoded `EnclosingMethod` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnclosingMethod {
    /// Class constant of the enclosing class
    pub class_index: u16,
    /// NameAndType of the enclosing method, `0` if the class is not enclosed by a method
    pub method_index: u16,
}

/// Decode an `EnclosingMethod` payload.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] for truncated input.
pub fn parse_enclosing_method(info: &[u8]) -> Result<EnclosingMethod> {
    let mut parser = Parser::new(info);
    Ok(EnclosingMethod {
        class_index: parser.read_be()?,
        method_index: parser.read_be()?,
    })
}

/// One entry of the `BootstrapMethods` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapMethod {
    /// MethodHandle constant of the bootstrap method
    pub method_ref: u16,
    /// Constant pool indices of the static arguments
    pub arguments: Vec<u16>,
}

/// Decode a `BootstrapMethods` payload.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] for truncated input.
pub fn parse_bootstrap_methods(info: &[u8]) -> Result<Vec<BootstrapMethod>> {
    let mut parser = Parser::new(info);
    let count = parser.read_be::<u16>()?;
    let mut methods = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let method_ref = parser.read_be::<u16>()?;
        let arguments = parser.read_u16_list()?;
        methods.push(BootstrapMethod {
            method_ref,
            arguments,
        });
    }
    Ok(methods)
}

/// Encode a `BootstrapMethods` payload.
///
/// # Errors
/// Returns an error if a count exceeds 65535.
pub fn write_bootstrap_methods(methods: &[BootstrapMethod]) -> Result<Vec<u8>> {
    let mut out = Writer::new();
    out.write_count(methods.len(), "bootstrap methods")?;
    for method in methods {
        out.write_be(method.method_ref);
        write_u16_list_into(&method.arguments, &mut out)?;
    }
    Ok(out.into_inner())
}

/// Decode a `NestMembers` or `PermittedSubclasses` payload.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] for truncated input.
pub fn parse_class_list(info: &[u8]) -> Result<Vec<u16>> {
    Parser::new(info).read_u16_list()
}

/// Encode a `NestMembers` or `PermittedSubclasses` payload.
///
/// # Errors
/// Returns an error if there are more than 65535 classes.
pub fn write_class_list(classes: &[u16]) -> Result<Vec<u8>> {
    let mut out = Writer::new();
    write_u16_list_into(classes, &mut out)?;
    Ok(out.into_inner())
}

fn write_u16_list_into(values: &[u16], out: &mut Writer) -> Result<()> {
    out.write_count(values.len(), "list entries")?;
    for value in values {
        out.write_be(*value);
    }
    Ok(())
}
