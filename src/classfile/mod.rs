//! Reading and writing JVM class files.
//!
//! A [`ClassFile`] is a faithful, mostly raw decoding of the class file format: the
//! constant pool is decoded into [`constantpool::Constant`] values, fields and methods into
//! [`MemberInfo`] records, and every attribute is kept as raw bytes until somebody asks for
//! its structure. Serialising an unmodified [`ClassFile`] reproduces the input byte for byte,
//! which is what lets the filter leave untouched classes alone.
//!
//! # Key Components
//!
//! - [`ClassFile`] - The decoded class
//! - [`constantpool`] - Constant pool and modified UTF-8
//! - [`attributes`] - Raw attributes plus `InnerClasses`, `EnclosingMethod`, `BootstrapMethods`
//! - [`annotations`] - Runtime annotation payloads
//! - [`code`] / [`opcodes`] - Method bodies and instruction decoding
//! - [`descriptor`] - Field and method descriptor helpers
//! - [`builder`] - Assembling small classes from scratch
//!
//! # Examples
//!
//! ```rust
//! use jarfilter::classfile::{builder::ClassBuilder, ClassFile};
//!
//! let bytes = ClassBuilder::new("com/example/Foo").build()?;
//! let class = ClassFile::parse(&bytes)?;
//! assert_eq!(class.name()?, "com/example/Foo");
//! assert_eq!(class.to_bytes()?, bytes);
//! # Ok::<(), jarfilter::Error>(())
//! ```

pub mod access;
pub mod annotations;
pub mod attributes;
pub mod builder;
pub mod code;
pub mod constantpool;
pub mod descriptor;
pub mod opcodes;

use crate::{
    classfile::{
        access::AccessFlags,
        annotations::{parse_annotations, Annotation},
        attributes::{Attribute, RUNTIME_INVISIBLE_ANNOTATIONS, RUNTIME_VISIBLE_ANNOTATIONS},
        constantpool::ConstantPool,
    },
    file::{parser::Parser, writer::Writer},
    Result,
};

/// Magic number at the start of every class file.
pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

/// A field or method declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    /// Access flags
    pub access: AccessFlags,
    /// Utf8 constant holding the name
    pub name_index: u16,
    /// Utf8 constant holding the descriptor
    pub descriptor_index: u16,
    /// Attributes of the member
    pub attributes: Vec<Attribute>,
}

impl MemberInfo {
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        Ok(MemberInfo {
            access: AccessFlags::from_raw(parser.read_be::<u16>()?),
            name_index: parser.read_be()?,
            descriptor_index: parser.read_be()?,
            attributes: Attribute::parse_list(parser)?,
        })
    }

    fn write(&self, out: &mut Writer) -> Result<()> {
        out.write_be(self.access.bits());
        out.write_be(self.name_index);
        out.write_be(self.descriptor_index);
        Attribute::write_list(&self.attributes, out)
    }
}

/// A decoded class file.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    /// Minor version
    pub minor_version: u16,
    /// Major version
    pub major_version: u16,
    /// The constant pool
    pub constant_pool: ConstantPool,
    /// Class access flags
    pub access: AccessFlags,
    /// Class constant of this class
    pub this_class: u16,
    /// Class constant of the superclass, `0` for `java/lang/Object` and modules
    pub super_class: u16,
    /// Class constants of the direct superinterfaces
    pub interfaces: Vec<u16>,
    /// Field declarations
    pub fields: Vec<MemberInfo>,
    /// Method declarations
    pub methods: Vec<MemberInfo>,
    /// Class attributes
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Decode a class file.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for empty input, [`crate::Error::Malformed`] for a bad
    /// magic number, an invalid constant pool or trailing bytes, and
    /// [`crate::Error::OutOfBounds`] for truncated input.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(crate::Error::Empty);
        }

        let mut parser = Parser::new(data);
        let magic = parser.read_be::<u32>()?;
        if magic != CLASS_MAGIC {
            return Err(malformed_error!("Invalid class file magic 0x{:08x}", magic));
        }

        let minor_version = parser.read_be::<u16>()?;
        let major_version = parser.read_be::<u16>()?;
        let constant_pool = ConstantPool::parse(&mut parser)?;
        let access = AccessFlags::from_raw(parser.read_be::<u16>()?);
        let this_class = parser.read_be::<u16>()?;
        let super_class = parser.read_be::<u16>()?;
        let interfaces = parser.read_u16_list()?;

        let field_count = parser.read_be::<u16>()?;
        let mut fields = Vec::with_capacity(usize::from(field_count));
        for _ in 0..field_count {
            fields.push(MemberInfo::parse(&mut parser)?);
        }

        let method_count = parser.read_be::<u16>()?;
        let mut methods = Vec::with_capacity(usize::from(method_count));
        for _ in 0..method_count {
            methods.push(MemberInfo::parse(&mut parser)?);
        }

        let attributes = Attribute::parse_list(&mut parser)?;
        if parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes after class file",
                parser.remaining()
            ));
        }

        let class = ClassFile {
            minor_version,
            major_version,
            constant_pool,
            access,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        };
        class.name()?;
        Ok(class)
    }

    /// Encode the class file.
    ///
    /// # Errors
    /// Returns an error if a table exceeds the limits of the class file format.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Writer::new();
        out.write_be(CLASS_MAGIC);
        out.write_be(self.minor_version);
        out.write_be(self.major_version);
        self.constant_pool.write(&mut out)?;
        out.write_be(self.access.bits());
        out.write_be(self.this_class);
        out.write_be(self.super_class);
        out.write_count(self.interfaces.len(), "interfaces")?;
        for interface in &self.interfaces {
            out.write_be(*interface);
        }
        out.write_count(self.fields.len(), "fields")?;
        for field in &self.fields {
            field.write(&mut out)?;
        }
        out.write_count(self.methods.len(), "methods")?;
        for method in &self.methods {
            method.write(&mut out)?;
        }
        Attribute::write_list(&self.attributes, &mut out)?;
        Ok(out.into_inner())
    }

    /// Internal name of this class, such as `com/example/Foo$Bar`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `this_class` is not a Class constant.
    pub fn name(&self) -> Result<&str> {
        self.constant_pool.class_name(self.this_class)
    }

    /// Name of a field or method.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the name index is not a Utf8 constant.
    pub fn member_name(&self, member: &MemberInfo) -> Result<&str> {
        self.constant_pool.utf8(member.name_index)
    }

    /// Descriptor of a field or method.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor index is not a Utf8 constant.
    pub fn member_descriptor(&self, member: &MemberInfo) -> Result<&str> {
        self.constant_pool.utf8(member.descriptor_index)
    }

    /// The first class attribute called `name`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if an attribute name index is invalid.
    pub fn attribute(&self, name: &str) -> Result<Option<&Attribute>> {
        Attribute::find(&self.attributes, &self.constant_pool, name)
    }

    /// Visible and invisible runtime annotations of an attribute list, in that order.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if an annotation attribute cannot be decoded.
    pub fn annotations_of(&self, attributes: &[Attribute]) -> Result<Vec<Annotation>> {
        let mut found = Vec::new();
        for attribute in attributes {
            let name = self.constant_pool.utf8(attribute.name_index)?;
            if name == RUNTIME_VISIBLE_ANNOTATIONS || name == RUNTIME_INVISIBLE_ANNOTATIONS {
                found.extend(parse_annotations(&attribute.info)?);
            }
        }
        Ok(found)
    }
}

/// Returns `true` for archive entries holding a class file that should be processed.
///
/// Module descriptors (`module-info.class`, also inside `META-INF/versions/`) are not
/// regular classes and are left alone.
#[must_use]
pub fn is_class_entry(entry_name: &str) -> bool {
    entry_name.ends_with(".class")
        && !entry_name.ends_with('/')
        && entry_name.rsplit('/').next() != Some("module-info.class")
}
