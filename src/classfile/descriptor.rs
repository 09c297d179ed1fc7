//! Helpers for JVM field and method descriptors.

use crate::{classfile::opcodes::op, Result};

/// Computational category of a field type, as far as the operand stack is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackKind {
    /// `boolean`, `byte`, `char`, `short` and `int`
    Int,
    /// `long`
    Long,
    /// `float`
    Float,
    /// `double`
    Double,
    /// Objects and arrays
    Reference,
}

impl StackKind {
    /// Classify a field descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an empty or unknown descriptor.
    pub fn of(descriptor: &str) -> Result<Self> {
        Ok(match descriptor.as_bytes().first() {
            Some(b'Z' | b'B' | b'C' | b'S' | b'I') => StackKind::Int,
            Some(b'J') => StackKind::Long,
            Some(b'F') => StackKind::Float,
            Some(b'D') => StackKind::Double,
            Some(b'L' | b'[') => StackKind::Reference,
            _ => return Err(malformed_error!("Invalid field descriptor '{}'", descriptor)),
        })
    }

    /// Number of stack and local slots a value occupies.
    #[must_use]
    pub fn slots(self) -> u16 {
        match self {
            StackKind::Long | StackKind::Double => 2,
            _ => 1,
        }
    }

    /// Opcode pushing the zero value of this kind.
    #[must_use]
    pub fn zero_opcode(self) -> u8 {
        match self {
            StackKind::Int => op::ICONST_0,
            StackKind::Long => op::LCONST_0,
            StackKind::Float => op::FCONST_0,
            StackKind::Double => op::DCONST_0,
            StackKind::Reference => op::ACONST_NULL,
        }
    }

    /// Opcode discarding one value of this kind from the stack.
    #[must_use]
    pub fn pop_opcode(self) -> u8 {
        if self.slots() == 2 {
            op::POP2
        } else {
            op::POP
        }
    }
}

/// Split a method descriptor into its parameter types and its return type.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `descriptor` is not a method descriptor.
pub fn parse_method_descriptor(descriptor: &str) -> Result<(Vec<&str>, &str)> {
    let Some(rest) = descriptor.strip_prefix('(') else {
        return Err(malformed_error!("Invalid method descriptor '{}'", descriptor));
    };
    let Some(close) = rest.find(')') else {
        return Err(malformed_error!("Invalid method descriptor '{}'", descriptor));
    };

    let params = &rest[..close];
    let ret = &rest[close + 1..];
    if ret.is_empty() {
        return Err(malformed_error!("Missing return type in '{}'", descriptor));
    }

    let bytes = params.as_bytes();
    let mut types = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'[' => {
                i += 1;
                continue;
            }
            b'L' => match params[i..].find(';') {
                Some(end) => i += end + 1,
                None => return Err(malformed_error!("Unterminated class in '{}'", descriptor)),
            },
            b'Z' | b'B' | b'C' | b'S' | b'I' | b'J' | b'F' | b'D' => i += 1,
            other => {
                return Err(malformed_error!(
                    "Invalid type '{}' in '{}'",
                    char::from(other),
                    descriptor
                ))
            }
        }
        types.push(&params[start..i]);
        start = i;
    }
    if start != bytes.len() {
        return Err(malformed_error!("Dangling array in '{}'", descriptor));
    }

    Ok((types, ret))
}

/// Number of local variable slots taken by the parameters of a method descriptor.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `descriptor` is not a method descriptor.
pub fn parameter_slots(descriptor: &str) -> Result<u16> {
    let (params, _) = parse_method_descriptor(descriptor)?;
    let mut slots = 0u16;
    for param in params {
        slots = slots.saturating_add(StackKind::of(param)?.slots());
    }
    Ok(slots)
}

/// The parameter part of a method descriptor, up to and including `)`.
///
/// Descriptors without a `)` are returned unchanged.
#[must_use]
pub fn extension_of(descriptor: &str) -> &str {
    match descriptor.find(')') {
        Some(close) => &descriptor[..=close],
        None => descriptor,
    }
}

/// Returns `true` for descriptors of methods returning `void`.
#[must_use]
pub fn returns_void(descriptor: &str) -> bool {
    descriptor.ends_with(")V")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method_descriptor() {
        let (params, ret) = parse_method_descriptor("(I[JLjava/lang/String;[[Lx/Y;D)V").unwrap();
        assert_eq!(params, vec!["I", "[J", "Ljava/lang/String;", "[[Lx/Y;", "D"]);
        assert_eq!(ret, "V");
        assert_eq!(parameter_slots("(I[JLjava/lang/String;[[Lx/Y;D)V").unwrap(), 6);
        assert_eq!(parameter_slots("(JD)J").unwrap(), 4);
    }

    #[test]
    fn test_invalid_descriptors() {
        assert!(parse_method_descriptor("I").is_err());
        assert!(parse_method_descriptor("(Ljava/lang/String)V").is_err());
        assert!(parse_method_descriptor("([)V").is_err());
        assert!(parse_method_descriptor("()").is_err());
        assert!(StackKind::of("").is_err());
    }

    #[test]
    fn test_extension_and_void() {
        assert_eq!(extension_of("(ILjava/lang/String;)J"), "(ILjava/lang/String;)");
        assert_eq!(extension_of("I"), "I");
        assert!(returns_void("()V"));
        assert!(!returns_void("()Ljava/lang/Void;"));
    }

    #[test]
    fn test_stack_kinds() {
        assert_eq!(StackKind::of("Z").unwrap().zero_opcode(), op::ICONST_0);
        assert_eq!(StackKind::of("J").unwrap().pop_opcode(), op::POP2);
        assert_eq!(StackKind::of("[I").unwrap(), StackKind::Reference);
        assert_eq!(StackKind::of("D").unwrap().slots(), 2);
    }
}
