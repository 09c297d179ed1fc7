//! The class file constant pool.
//!
//! The pool is decoded into a vector of [`Constant`] values indexed exactly like the class
//! file: slot `0` is unusable and every `long` or `double` constant occupies two slots.
//! Strings are decoded from the JVM's modified UTF-8 into Rust strings and encoded back
//! when the class is serialised.
//!
//! Rewriting a class only ever appends to the pool. [`ConstantPool::find_or_add`] reuses an
//! existing equal entry so repeated rewrites of the same class produce identical pools.

use crate::{file::parser::Parser, file::writer::Writer, Result};

/// Maximum number of slots (including the unusable slot `0`) a constant pool can hold.
pub const MAX_POOL_SLOTS: usize = 65535;

/// A single constant pool entry.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// Slot `0` and the upper half of `long` / `double` constants
    Unusable,
    Utf8(String),
    Integer(i32),
    /// Raw IEEE-754 bits, kept verbatim so NaN payloads survive
    Float(u32),
    Long(i64),
    /// Raw IEEE-754 bits, kept verbatim so NaN payloads survive
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef { class_index: u16, name_and_type_index: u16 },
    MethodRef { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodRef { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { kind: u8, reference_index: u16 },
    MethodType(u16),
    Dynamic { bootstrap_index: u16, name_and_type_index: u16 },
    InvokeDynamic { bootstrap_index: u16, name_and_type_index: u16 },
    Module(u16),
    Package(u16),
}

impl Constant {
    /// Class file tag of this constant.
    #[must_use]
    pub fn tag(&self) -> u8 {
        match self {
            Constant::Unusable => 0,
            Constant::Utf8(_) => 1,
            Constant::Integer(_) => 3,
            Constant::Float(_) => 4,
            Constant::Long(_) => 5,
            Constant::Double(_) => 6,
            Constant::Class(_) => 7,
            Constant::String(_) => 8,
            Constant::FieldRef { .. } => 9,
            Constant::MethodRef { .. } => 10,
            Constant::InterfaceMethodRef { .. } => 11,
            Constant::NameAndType { .. } => 12,
            Constant::MethodHandle { .. } => 15,
            Constant::MethodType(_) => 16,
            Constant::Dynamic { .. } => 17,
            Constant::InvokeDynamic { .. } => 18,
            Constant::Module(_) => 19,
            Constant::Package(_) => 20,
        }
    }

    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// A resolved field or method reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    /// Internal name of the owning class
    pub owner: &'a str,
    /// Member name
    pub name: &'a str,
    /// Member descriptor
    pub descriptor: &'a str,
}

/// The decoded constant pool of a class file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool {
            entries: vec![Constant::Unusable],
        }
    }
}

impl ConstantPool {
    /// Create a pool containing only the unusable slot `0`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the pool starting at the `constant_pool_count` field.
    ///
    /// # Errors
    /// Returns an error for unknown tags, invalid modified UTF-8 or truncated input.
    pub fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let count = usize::from(parser.read_be::<u16>()?);
        if count == 0 {
            return Err(malformed_error!("constant_pool_count must be at least 1"));
        }

        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unusable);
        while entries.len() < count {
            let tag = parser.read_be::<u8>()?;
            let constant = match tag {
                1 => {
                    let len = usize::from(parser.read_be::<u16>()?);
                    Constant::Utf8(decode_modified_utf8(parser.read_bytes(len)?)?)
                }
                3 => Constant::Integer(parser.read_be::<i32>()?),
                4 => Constant::Float(parser.read_be::<u32>()?),
                5 => Constant::Long(parser.read_be::<i64>()?),
                6 => Constant::Double(parser.read_be::<u64>()?),
                7 => Constant::Class(parser.read_be::<u16>()?),
                8 => Constant::String(parser.read_be::<u16>()?),
                9 => Constant::FieldRef {
                    class_index: parser.read_be()?,
                    name_and_type_index: parser.read_be()?,
                },
                10 => Constant::MethodRef {
                    class_index: parser.read_be()?,
                    name_and_type_index: parser.read_be()?,
                },
                11 => Constant::InterfaceMethodRef {
                    class_index: parser.read_be()?,
                    name_and_type_index: parser.read_be()?,
                },
                12 => Constant::NameAndType {
                    name_index: parser.read_be()?,
                    descriptor_index: parser.read_be()?,
                },
                15 => Constant::MethodHandle {
                    kind: parser.read_be()?,
                    reference_index: parser.read_be()?,
                },
                16 => Constant::MethodType(parser.read_be::<u16>()?),
                17 => Constant::Dynamic {
                    bootstrap_index: parser.read_be()?,
                    name_and_type_index: parser.read_be()?,
                },
                18 => Constant::InvokeDynamic {
                    bootstrap_index: parser.read_be()?,
                    name_and_type_index: parser.read_be()?,
                },
                19 => Constant::Module(parser.read_be::<u16>()?),
                20 => Constant::Package(parser.read_be::<u16>()?),
                _ => {
                    return Err(malformed_error!(
                        "Unknown constant pool tag {} at slot {}",
                        tag,
                        entries.len()
                    ))
                }
            };

            let wide = constant.is_wide();
            entries.push(constant);
            if wide {
                entries.push(Constant::Unusable);
            }
        }

        if entries.len() != count {
            return Err(malformed_error!("Wide constant overruns the constant pool"));
        }

        Ok(ConstantPool { entries })
    }

    /// Serialise the pool including the leading `constant_pool_count`.
    ///
    /// # Errors
    /// Returns an error if a string is too long for modified UTF-8 encoding.
    pub fn write(&self, out: &mut Writer) -> Result<()> {
        out.write_count(self.entries.len(), "constant pool slots")?;
        for constant in &self.entries {
            if matches!(constant, Constant::Unusable) {
                continue;
            }

            out.write_be(constant.tag());
            match constant {
                Constant::Unusable => {}
                Constant::Utf8(value) => {
                    let bytes = encode_modified_utf8(value);
                    out.write_count(bytes.len(), "bytes in a string constant")?;
                    out.write_bytes(&bytes);
                }
                Constant::Integer(value) => out.write_be(*value),
                Constant::Float(bits) => out.write_be(*bits),
                Constant::Long(value) => out.write_be(*value),
                Constant::Double(bits) => out.write_be(*bits),
                Constant::Class(index)
                | Constant::String(index)
                | Constant::MethodType(index)
                | Constant::Module(index)
                | Constant::Package(index) => out.write_be(*index),
                Constant::FieldRef {
                    class_index: first,
                    name_and_type_index: second,
                }
                | Constant::MethodRef {
                    class_index: first,
                    name_and_type_index: second,
                }
                | Constant::InterfaceMethodRef {
                    class_index: first,
                    name_and_type_index: second,
                }
                | Constant::NameAndType {
                    name_index: first,
                    descriptor_index: second,
                }
                | Constant::Dynamic {
                    bootstrap_index: first,
                    name_and_type_index: second,
                }
                | Constant::InvokeDynamic {
                    bootstrap_index: first,
                    name_and_type_index: second,
                } => {
                    out.write_be(*first);
                    out.write_be(*second);
                }
                Constant::MethodHandle {
                    kind,
                    reference_index,
                } => {
                    out.write_be(*kind);
                    out.write_be(*reference_index);
                }
            }
        }
        Ok(())
    }

    /// Number of slots, including the unusable slot `0`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the pool holds no usable constants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Look up the constant at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for slot `0`, unusable slots and out of range indices.
    pub fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(usize::from(index)) {
            Some(Constant::Unusable) | None => {
                Err(malformed_error!("Invalid constant pool index {}", index))
            }
            Some(constant) => Ok(constant),
        }
    }

    /// Resolve a `CONSTANT_Utf8` entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or has another tag.
    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value),
            other => Err(malformed_error!(
                "Constant {} is not Utf8 (tag {})",
                index,
                other.tag()
            )),
        }
    }

    /// Resolve a `CONSTANT_Class` entry to its internal name.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or has another tag.
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Class(name_index) => self.utf8(*name_index),
            other => Err(malformed_error!(
                "Constant {} is not a Class (tag {})",
                index,
                other.tag()
            )),
        }
    }

    /// Resolve an optional class reference where `0` means "none".
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a non-zero index that is not a Class.
    pub fn optional_class_name(&self, index: u16) -> Result<Option<&str>> {
        if index == 0 {
            return Ok(None);
        }
        self.class_name(index).map(Some)
    }

    /// Resolve a `CONSTANT_NameAndType` entry to `(name, descriptor)`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or has another tag.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            other => Err(malformed_error!(
                "Constant {} is not a NameAndType (tag {})",
                index,
                other.tag()
            )),
        }
    }

    /// Resolve a field, method or interface method reference.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is not a member reference.
    pub fn member_ref(&self, index: u16) -> Result<MemberRef<'_>> {
        match self.get(index)? {
            Constant::FieldRef {
                class_index,
                name_and_type_index,
            }
            | Constant::MethodRef {
                class_index,
                name_and_type_index,
            }
            | Constant::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => {
                let owner = self.class_name(*class_index)?;
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Ok(MemberRef {
                    owner,
                    name,
                    descriptor,
                })
            }
            other => Err(malformed_error!(
                "Constant {} is not a member reference (tag {})",
                index,
                other.tag()
            )),
        }
    }

    /// Resolve the member behind a `CONSTANT_MethodHandle`.
    ///
    /// Returns `None` when `index` refers to any other kind of constant, which is how
    /// non-handle bootstrap arguments are skipped.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the handle's reference is invalid.
    pub fn method_handle(&self, index: u16) -> Result<Option<MemberRef<'_>>> {
        match self.get(index)? {
            Constant::MethodHandle {
                reference_index, ..
            } => self.member_ref(*reference_index).map(Some),
            _ => Ok(None),
        }
    }

    /// Return the index of an equal constant, appending it if none exists.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn find_or_add(&mut self, constant: Constant) -> Result<u16> {
        if let Some(index) = self.entries.iter().position(|entry| *entry == constant) {
            if index != 0 {
                return u16::try_from(index)
                    .map_err(|_| malformed_error!("Constant pool index {} overflows", index));
            }
        }

        let slots = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + slots > MAX_POOL_SLOTS {
            return Err(malformed_error!("Constant pool is full"));
        }

        let index = self.entries.len();
        let wide = constant.is_wide();
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Unusable);
        }

        u16::try_from(index).map_err(|_| malformed_error!("Constant pool index {} overflows", index))
    }

    /// Find or add a `CONSTANT_Utf8`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_utf8(&mut self, value: &str) -> Result<u16> {
        self.find_or_add(Constant::Utf8(value.to_string()))
    }

    /// Find or add a `CONSTANT_Class` for an internal name.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_class(&mut self, internal_name: &str) -> Result<u16> {
        let name_index = self.add_utf8(internal_name)?;
        self.find_or_add(Constant::Class(name_index))
    }

    /// Find or add a `CONSTANT_String`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_string(&mut self, value: &str) -> Result<u16> {
        let string_index = self.add_utf8(value)?;
        self.find_or_add(Constant::String(string_index))
    }

    /// Find or add a `CONSTANT_NameAndType`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.find_or_add(Constant::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    /// Find or add a `CONSTANT_Methodref`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.add_class(owner)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.find_or_add(Constant::MethodRef {
            class_index,
            name_and_type_index,
        })
    }

    /// Find or add a `CONSTANT_Fieldref`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.add_class(owner)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.find_or_add(Constant::FieldRef {
            class_index,
            name_and_type_index,
        })
    }
}

/// Decode the JVM's modified UTF-8.
///
/// Supplementary characters arrive as surrogate pairs of three-byte sequences and `U+0000`
/// as the two bytes `C0 80`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for truncated sequences, invalid lead bytes and
/// unpaired surrogates.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    if bytes.is_ascii() && !bytes.contains(&0) {
        return String::from_utf8(bytes.to_vec())
            .map_err(|_| malformed_error!("Invalid ASCII string constant"));
    }

    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let lead = bytes[i];
        let continuation = |offset: usize| -> Result<u16> {
            match bytes.get(i + offset) {
                Some(byte) if byte & 0xC0 == 0x80 => Ok(u16::from(byte & 0x3F)),
                _ => Err(malformed_error!("Truncated modified UTF-8 sequence at {}", i)),
            }
        };

        if lead & 0x80 == 0 {
            if lead == 0 {
                return Err(malformed_error!("Raw NUL byte in modified UTF-8 at {}", i));
            }
            units.push(u16::from(lead));
            i += 1;
        } else if lead & 0xE0 == 0xC0 {
            units.push((u16::from(lead & 0x1F) << 6) | continuation(1)?);
            i += 2;
        } else if lead & 0xF0 == 0xE0 {
            units.push((u16::from(lead & 0x0F) << 12) | (continuation(1)? << 6) | continuation(2)?);
            i += 3;
        } else {
            return Err(malformed_error!(
                "Invalid modified UTF-8 lead byte 0x{:02x} at {}",
                lead,
                i
            ));
        }
    }

    String::from_utf16(&units).map_err(|_| malformed_error!("Unpaired surrogate in string constant"))
}

/// Encode a string as the JVM's modified UTF-8.
#[must_use]
pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modified_utf8_nul_and_latin() {
        let value = "\u{0}a\u{ff}";
        let encoded = encode_modified_utf8(value);
        assert_eq!(encoded, vec![0xC0, 0x80, b'a', 0xC3, 0xBF]);
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), value);
    }

    #[test]
    fn test_modified_utf8_supplementary() {
        let value = "x\u{1F600}";
        let encoded = encode_modified_utf8(value);
        assert_eq!(encoded.len(), 1 + 6);
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), value);
    }

    #[test]
    fn test_modified_utf8_rejects_garbage() {
        assert!(decode_modified_utf8(&[0xC3]).is_err());
        assert!(decode_modified_utf8(&[0xF0, 0x9F, 0x98, 0x80]).is_err());
        assert!(decode_modified_utf8(&[b'a', 0x00]).is_err());
        assert!(decode_modified_utf8(&[0xED, 0xA0, 0x80]).is_err());
    }

    #[test]
    fn test_find_or_add_reuses_entries() {
        let mut pool = ConstantPool::new();
        let first = pool.add_method_ref("a/B", "run", "()V").unwrap();
        let len = pool.len();
        let second = pool.add_method_ref("a/B", "run", "()V").unwrap();

        assert_eq!(first, second);
        assert_eq!(pool.len(), len);
        let member = pool.member_ref(first).unwrap();
        assert_eq!(member.owner, "a/B");
        assert_eq!(member.name, "run");
        assert_eq!(member.descriptor, "()V");
    }

    #[test]
    fn test_parse_wide_constants() {
        let mut out = Writer::new();
        let mut pool = ConstantPool::new();
        pool.find_or_add(Constant::Long(-5)).unwrap();
        let utf8 = pool.add_utf8("after").unwrap();
        assert_eq!(utf8, 3);
        pool.write(&mut out).unwrap();

        let bytes = out.into_inner();
        let mut parser = Parser::new(&bytes);
        let parsed = ConstantPool::parse(&mut parser).unwrap();
        assert_eq!(parsed, pool);
        assert_eq!(parsed.utf8(3).unwrap(), "after");
        assert!(parsed.get(2).is_err());
        assert!(parsed.get(0).is_err());
    }

    #[test]
    fn test_unknown_tag() {
        let bytes = [0x00, 0x02, 0x02, 0x00];
        let mut parser = Parser::new(&bytes);
        assert!(ConstantPool::parse(&mut parser).is_err());
    }

    #[test]
    fn test_method_handle_resolution() {
        let mut pool = ConstantPool::new();
        let method = pool.add_method_ref("a/B", "lambda$0", "()V").unwrap();
        let handle = pool
            .find_or_add(Constant::MethodHandle {
                kind: 6,
                reference_index: method,
            })
            .unwrap();
        let text = pool.add_string("text").unwrap();

        assert_eq!(pool.method_handle(handle).unwrap().unwrap().name, "lambda$0");
        assert!(pool.method_handle(text).unwrap().is_none());
    }
}
