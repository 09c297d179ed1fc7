//! Kotlin metadata support.
//!
//! Kotlin records the declarations of a class in a `@kotlin.Metadata` annotation: `k` holds
//! the kind of container, `d1` a protobuf message encoded as strings and `d2` the strings
//! that message refers to. When the filter deletes members from a class file, the metadata
//! must lose the matching declarations or the Kotlin compiler and reflection will see
//! members that do not exist.
//!
//! - [`bitencoding`] turns `d1` into bytes and back
//! - [`protobuf`] keeps messages lossless while declarations are removed
//! - [`strings`] resolves the string table
//! - [`signatures`] derives the JVM members behind each declaration
//! - [`document`] ties these together for one annotation
//! - [`transform`] decides which declarations go

pub mod bitencoding;
pub mod document;
pub mod protobuf;
pub mod signatures;
pub mod strings;
pub mod transform;

use strum::{Display, FromRepr};

use crate::{
    classfile::{
        annotations::{parse_annotations, write_annotations, Annotation, ElementValue},
        attributes::{Attribute, RUNTIME_VISIBLE_ANNOTATIONS},
        ClassFile,
    },
    Result,
};

/// Descriptor of the `@kotlin.Metadata` annotation.
pub const KOTLIN_METADATA_DESC: &str = "Lkotlin/Metadata;";

/// Protobuf field numbers of the metadata messages.
#[allow(missing_docs)]
pub mod fields {
    pub const CLASS_FLAGS: u32 = 1;
    pub const CLASS_FQ_NAME: u32 = 3;
    pub const CLASS_COMPANION_OBJECT_NAME: u32 = 4;
    pub const CLASS_NESTED_CLASS_NAME: u32 = 7;
    pub const CLASS_CONSTRUCTOR: u32 = 8;
    pub const CLASS_FUNCTION: u32 = 9;
    pub const CLASS_PROPERTY: u32 = 10;
    pub const CLASS_TYPE_ALIAS: u32 = 11;
    pub const CLASS_ENUM_ENTRY: u32 = 13;
    pub const CLASS_SEALED_SUBCLASS_FQ_NAME: u32 = 16;

    pub const PACKAGE_FUNCTION: u32 = 3;
    pub const PACKAGE_PROPERTY: u32 = 4;
    pub const PACKAGE_TYPE_ALIAS: u32 = 5;

    pub const TYPE_TABLE: u32 = 30;
    pub const TYPE_TABLE_TYPE: u32 = 1;
    pub const TYPE_CLASS_NAME: u32 = 6;

    pub const FUNCTION_NAME: u32 = 2;
    pub const FUNCTION_RETURN_TYPE: u32 = 3;
    pub const FUNCTION_RECEIVER_TYPE: u32 = 5;
    pub const FUNCTION_VALUE_PARAMETER: u32 = 6;
    pub const FUNCTION_RETURN_TYPE_ID: u32 = 7;
    pub const FUNCTION_RECEIVER_TYPE_ID: u32 = 8;

    pub const PROPERTY_NAME: u32 = 2;
    pub const PROPERTY_RETURN_TYPE: u32 = 3;
    pub const PROPERTY_RECEIVER_TYPE: u32 = 5;
    pub const PROPERTY_RETURN_TYPE_ID: u32 = 9;
    pub const PROPERTY_RECEIVER_TYPE_ID: u32 = 10;

    pub const CONSTRUCTOR_VALUE_PARAMETER: u32 = 2;

    pub const PARAMETER_TYPE: u32 = 3;
    pub const PARAMETER_TYPE_ID: u32 = 5;

    pub const TYPE_ALIAS_NAME: u32 = 2;

    /// JVM signature extension of functions, constructors and properties
    pub const JVM_SIGNATURE: u32 = 100;
    pub const SIGNATURE_NAME: u32 = 1;
    pub const SIGNATURE_DESC: u32 = 2;

    pub const PROPERTY_SIGNATURE_FIELD: u32 = 1;
    pub const PROPERTY_SIGNATURE_SYNTHETIC: u32 = 2;
    pub const PROPERTY_SIGNATURE_GETTER: u32 = 3;
    pub const PROPERTY_SIGNATURE_SETTER: u32 = 4;
}

/// Class flag bits holding the class kind.
pub const CLASS_KIND_SHIFT: u32 = 6;
/// Kind of an annotation class.
pub const CLASS_KIND_ANNOTATION: i32 = 4;
/// Kind of a companion object.
pub const CLASS_KIND_COMPANION: i32 = 6;
/// Flags of a class message that does not set them.
pub const DEFAULT_CLASS_FLAGS: i32 = 6;

/// The value of the `k` element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr)]
#[repr(i32)]
pub enum MetadataKind {
    /// A class, interface or object
    Class = 1,
    /// A file facade holding top-level declarations
    File = 2,
    /// A lambda or other compiler-generated class
    SyntheticClass = 3,
    /// The facade of a `@JvmMultifileClass`
    MultiFileClassFacade = 4,
    /// One part of a `@JvmMultifileClass`
    MultiFileClassPart = 5,
}

impl MetadataKind {
    /// Returns `true` if the metadata describes package-level declarations.
    #[must_use]
    pub fn is_package(self) -> bool {
        matches!(self, MetadataKind::File | MetadataKind::MultiFileClassPart)
    }
}

/// The elements of a `@kotlin.Metadata` annotation the filter works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KotlinMetadata {
    /// The `k` element, `1` when absent
    pub kind: i32,
    /// Bit-encoded protobuf messages
    pub d1: Vec<String>,
    /// String table the messages index into
    pub d2: Vec<String>,
}

impl KotlinMetadata {
    /// The known kind, if any.
    #[must_use]
    pub fn metadata_kind(&self) -> Option<MetadataKind> {
        MetadataKind::from_repr(self.kind)
    }

    /// Read the metadata of a class, if it has any.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the annotation attribute or the annotation's
    /// elements cannot be decoded.
    pub fn read(class: &ClassFile) -> Result<Option<Self>> {
        let Some(attribute) = class.attribute(RUNTIME_VISIBLE_ANNOTATIONS)? else {
            return Ok(None);
        };
        let pool = &class.constant_pool;
        for annotation in parse_annotations(&attribute.info)? {
            if annotation.descriptor(pool)? != KOTLIN_METADATA_DESC {
                continue;
            }
            let kind = match annotation.element(pool, "k")? {
                Some(value) => value.as_int(pool)?,
                None => 1,
            };
            let strings = |name| -> Result<Vec<String>> {
                match annotation.element(pool, name)? {
                    Some(value) => value.as_strings(pool),
                    None => Ok(Vec::new()),
                }
            };
            return Ok(Some(KotlinMetadata {
                kind,
                d1: strings("d1")?,
                d2: strings("d2")?,
            }));
        }
        Ok(None)
    }

    /// Replace the `d1` element of the class's metadata annotation.
    ///
    /// Returns `false` if the class has no metadata annotation.
    ///
    /// # Errors
    /// Returns an error if the annotations cannot be decoded or the constant pool is full.
    pub fn replace_d1(class: &mut ClassFile, d1: &[String]) -> Result<bool> {
        let Some(position) = Attribute::position(
            &class.attributes,
            &class.constant_pool,
            RUNTIME_VISIBLE_ANNOTATIONS,
        )?
        else {
            return Ok(false);
        };

        let mut annotations = parse_annotations(&class.attributes[position].info)?;
        let mut found = false;
        for annotation in &mut annotations {
            if annotation.descriptor(&class.constant_pool)? != KOTLIN_METADATA_DESC {
                continue;
            }
            let value = string_array(class, d1)?;
            set_element(class, annotation, "d1", value)?;
            found = true;
            break;
        }

        if found {
            class.attributes[position].info = write_annotations(&annotations)?;
        }
        Ok(found)
    }
}

fn string_array(class: &mut ClassFile, values: &[String]) -> Result<ElementValue> {
    let mut elements = Vec::with_capacity(values.len());
    for value in values {
        elements.push(ElementValue::Const {
            tag: b's',
            index: class.constant_pool.add_utf8(value)?,
        });
    }
    Ok(ElementValue::Array(elements))
}

fn set_element(
    class: &mut ClassFile,
    annotation: &mut Annotation,
    name: &str,
    value: ElementValue,
) -> Result<()> {
    if let Some(existing) = annotation.element_mut(&class.constant_pool, name)? {
        *existing = value;
        return Ok(());
    }
    let name_index = class.constant_pool.add_utf8(name)?;
    annotation.elements.push((name_index, value));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::builder::ClassBuilder;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_read_metadata() {
        let class = ClassBuilder::new("com/example/Foo")
            .kotlin_metadata(1, &strings(&["\u{0}abc"]), &strings(&["Foo", "bar"]))
            .into_class()
            .unwrap();
        let metadata = KotlinMetadata::read(&class).unwrap().unwrap();
        assert_eq!(metadata.kind, 1);
        assert_eq!(metadata.metadata_kind(), Some(MetadataKind::Class));
        assert_eq!(metadata.d1, strings(&["\u{0}abc"]));
        assert_eq!(metadata.d2, strings(&["Foo", "bar"]));
    }

    #[test]
    fn test_no_metadata() {
        let class = ClassBuilder::new("com/example/Plain").into_class().unwrap();
        assert!(KotlinMetadata::read(&class).unwrap().is_none());
    }

    #[test]
    fn test_replace_d1() {
        let mut class = ClassBuilder::new("com/example/Foo")
            .class_annotation("Lcom/example/Other;")
            .kotlin_metadata(2, &strings(&["old"]), &strings(&["x"]))
            .into_class()
            .unwrap();
        assert!(KotlinMetadata::replace_d1(&mut class, &strings(&["new", "parts"])).unwrap());

        let reparsed = ClassFile::parse(&class.to_bytes().unwrap()).unwrap();
        let metadata = KotlinMetadata::read(&reparsed).unwrap().unwrap();
        assert_eq!(metadata.kind, 2);
        assert_eq!(metadata.d1, strings(&["new", "parts"]));
        assert_eq!(metadata.d2, strings(&["x"]));
        assert!(MetadataKind::from_repr(metadata.kind).unwrap().is_package());
    }
}
