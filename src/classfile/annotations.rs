//! Runtime annotations.
//!
//! `RuntimeVisibleAnnotations` and `RuntimeInvisibleAnnotations` are fully decoded into
//! [`Annotation`] values. The filter strips annotations by dropping entries from the list,
//! and the Kotlin metadata transformer replaces the `d1` element value of
//! `@kotlin.Metadata`. Writing a decoded list reproduces the original bytes exactly.

use crate::{
    classfile::constantpool::ConstantPool,
    file::{parser::Parser, writer::Writer},
    Result,
};

/// Annotations nest through element values; anything deeper than this is rejected.
const MAX_NESTING: usize = 64;

/// A decoded annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Utf8 constant holding the annotation's field descriptor
    pub type_index: u16,
    /// Element name constant and value pairs
    pub elements: Vec<(u16, ElementValue)>,
}

/// The value of an annotation element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// Primitive or string constant, tagged by one of `BCDFIJSZs`
    Const {
        /// Element value tag
        tag: u8,
        /// Constant pool index of the value
        index: u16,
    },
    /// Enum constant
    Enum {
        /// Utf8 constant holding the enum type descriptor
        type_name_index: u16,
        /// Utf8 constant holding the constant name
        const_name_index: u16,
    },
    /// Class literal, Utf8 constant holding a return descriptor
    Class(u16),
    /// Nested annotation
    Annotation(Annotation),
    /// Array of values
    Array(Vec<ElementValue>),
}

impl Annotation {
    /// Field descriptor of the annotation type, such as `Lkotlin/Metadata;`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the type index is not a Utf8 constant.
    pub fn descriptor<'p>(&self, pool: &'p ConstantPool) -> Result<&'p str> {
        pool.utf8(self.type_index)
    }

    /// Value of the element called `name`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if an element name index is invalid.
    pub fn element(&self, pool: &ConstantPool, name: &str) -> Result<Option<&ElementValue>> {
        for (name_index, value) in &self.elements {
            if pool.utf8(*name_index)? == name {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Mutable value of the element called `name`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if an element name index is invalid.
    pub fn element_mut(
        &mut self,
        pool: &ConstantPool,
        name: &str,
    ) -> Result<Option<&mut ElementValue>> {
        for (name_index, value) in &mut self.elements {
            if pool.utf8(*name_index)? == name {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn parse(parser: &mut Parser<'_>, depth: usize) -> Result<Self> {
        let type_index = parser.read_be::<u16>()?;
        let count = parser.read_be::<u16>()?;
        let mut elements = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let name_index = parser.read_be::<u16>()?;
            elements.push((name_index, ElementValue::parse(parser, depth)?));
        }
        Ok(Annotation {
            type_index,
            elements,
        })
    }

    fn write(&self, out: &mut Writer) -> Result<()> {
        out.write_be(self.type_index);
        out.write_count(self.elements.len(), "annotation elements")?;
        for (name_index, value) in &self.elements {
            out.write_be(*name_index);
            value.write(out)?;
        }
        Ok(())
    }
}

impl ElementValue {
    fn parse(parser: &mut Parser<'_>, depth: usize) -> Result<Self> {
        if depth > MAX_NESTING {
            return Err(malformed_error!("Annotation nesting exceeds {}", MAX_NESTING));
        }

        let tag = parser.read_be::<u8>()?;
        Ok(match tag {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => ElementValue::Const {
                tag,
                index: parser.read_be()?,
            },
            b'e' => ElementValue::Enum {
                type_name_index: parser.read_be()?,
                const_name_index: parser.read_be()?,
            },
            b'c' => ElementValue::Class(parser.read_be()?),
            b'@' => ElementValue::Annotation(Annotation::parse(parser, depth + 1)?),
            b'[' => {
                let count = parser.read_be::<u16>()?;
                let mut values = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    values.push(ElementValue::parse(parser, depth + 1)?);
                }
                ElementValue::Array(values)
            }
            _ => return Err(malformed_error!("Unknown element value tag 0x{:02x}", tag)),
        })
    }

    fn write(&self, out: &mut Writer) -> Result<()> {
        match self {
            ElementValue::Const { tag, index } => {
                out.write_be(*tag);
                out.write_be(*index);
            }
            ElementValue::Enum {
                type_name_index,
                const_name_index,
            } => {
                out.write_be(b'e');
                out.write_be(*type_name_index);
                out.write_be(*const_name_index);
            }
            ElementValue::Class(index) => {
                out.write_be(b'c');
                out.write_be(*index);
            }
            ElementValue::Annotation(annotation) => {
                out.write_be(b'@');
                annotation.write(out)?;
            }
            ElementValue::Array(values) => {
                out.write_be(b'[');
                out.write_count(values.len(), "array elements")?;
                for value in values {
                    value.write(out)?;
                }
            }
        }
        Ok(())
    }

    /// Integer value of an `I` constant.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the value is not an integer constant.
    pub fn as_int(&self, pool: &ConstantPool) -> Result<i32> {
        match self {
            ElementValue::Const { tag: b'I', index } => match pool.get(*index)? {
                crate::classfile::constantpool::Constant::Integer(value) => Ok(*value),
                _ => Err(malformed_error!("Integer element points at a non-integer constant")),
            },
            _ => Err(malformed_error!("Annotation element is not an integer")),
        }
    }

    /// Strings of an array of `s` constants.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the value is not an array of strings.
    pub fn as_strings(&self, pool: &ConstantPool) -> Result<Vec<String>> {
        let ElementValue::Array(values) = self else {
            return Err(malformed_error!("Annotation element is not an array"));
        };

        values
            .iter()
            .map(|value| match value {
                ElementValue::Const { tag: b's', index } => pool.utf8(*index).map(str::to_string),
                _ => Err(malformed_error!("Array element is not a string")),
            })
            .collect()
    }
}

/// Decode the payload of a runtime annotations attribute.
///
/// # Errors
/// Returns an error for unknown tags, excessive nesting or truncated input.
pub fn parse_annotations(info: &[u8]) -> Result<Vec<Annotation>> {
    let mut parser = Parser::new(info);
    let count = parser.read_be::<u16>()?;
    let mut annotations = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        annotations.push(Annotation::parse(&mut parser, 0)?);
    }
    if parser.has_more_data() {
        return Err(malformed_error!(
            "{} trailing bytes after annotations",
            parser.remaining()
        ));
    }
    Ok(annotations)
}

/// Encode the payload of a runtime annotations attribute.
///
/// # Errors
/// Returns an error if a count exceeds 65535.
pub fn write_annotations(annotations: &[Annotation]) -> Result<Vec<u8>> {
    let mut out = Writer::new();
    out.write_count(annotations.len(), "annotations")?;
    for annotation in annotations {
        annotation.write(&mut out)?;
    }
    Ok(out.into_inner())
}
