//! JVM opcodes and instruction decoding.
//!
//! Only the instructions the filter reacts to are named. Every other opcode is walked
//! over by length, which [`instruction_length`] computes for the complete instruction
//! set including the padded `tableswitch` / `lookupswitch` and the `wide` prefix.

use strum::{Display, FromRepr};

use crate::{file::io::read_be, Result};

#[allow(missing_docs)]
pub mod op {
    pub const NOP: u8 = 0x00;
    pub const ACONST_NULL: u8 = 0x01;
    pub const ICONST_0: u8 = 0x03;
    pub const LCONST_0: u8 = 0x09;
    pub const FCONST_0: u8 = 0x0b;
    pub const DCONST_0: u8 = 0x0e;
    pub const BIPUSH: u8 = 0x10;
    pub const LDC: u8 = 0x12;
    pub const LDC_W: u8 = 0x13;
    pub const ILOAD: u8 = 0x15;
    pub const ALOAD: u8 = 0x19;
    pub const ALOAD_0: u8 = 0x2a;
    pub const POP: u8 = 0x57;
    pub const POP2: u8 = 0x58;
    pub const DUP: u8 = 0x59;
    pub const IADD: u8 = 0x60;
    pub const IINC: u8 = 0x84;
    pub const TABLESWITCH: u8 = 0xaa;
    pub const LOOKUPSWITCH: u8 = 0xab;
    pub const IRETURN: u8 = 0xac;
    pub const LRETURN: u8 = 0xad;
    pub const FRETURN: u8 = 0xae;
    pub const DRETURN: u8 = 0xaf;
    pub const ARETURN: u8 = 0xb0;
    pub const RETURN: u8 = 0xb1;
    pub const GETSTATIC: u8 = 0xb2;
    pub const PUTSTATIC: u8 = 0xb3;
    pub const GETFIELD: u8 = 0xb4;
    pub const PUTFIELD: u8 = 0xb5;
    pub const INVOKEVIRTUAL: u8 = 0xb6;
    pub const INVOKESPECIAL: u8 = 0xb7;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const INVOKEINTERFACE: u8 = 0xb9;
    pub const INVOKEDYNAMIC: u8 = 0xba;
    pub const NEW: u8 = 0xbb;
    pub const ATHROW: u8 = 0xbf;
    pub const WIDE: u8 = 0xc4;
    pub const GOTO_W: u8 = 0xc8;
    pub const JSR_W: u8 = 0xc9;
}

/// Field access instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display)]
#[repr(u8)]
pub enum FieldAccess {
    /// Read a static field
    #[strum(serialize = "getstatic")]
    GetStatic = 0xb2,
    /// Write a static field
    #[strum(serialize = "putstatic")]
    PutStatic = 0xb3,
    /// Read an instance field
    #[strum(serialize = "getfield")]
    GetField = 0xb4,
    /// Write an instance field
    #[strum(serialize = "putfield")]
    PutField = 0xb5,
}

impl FieldAccess {
    /// The opcode of this instruction.
    #[must_use]
    pub fn opcode(self) -> u8 {
        self as u8
    }

    /// Instruction reads or writes an instance field.
    #[must_use]
    pub fn is_instance(self) -> bool {
        matches!(self, FieldAccess::GetField | FieldAccess::PutField)
    }

    /// Instruction writes the field.
    #[must_use]
    pub fn is_write(self) -> bool {
        matches!(self, FieldAccess::PutStatic | FieldAccess::PutField)
    }
}

/// Method invocation instructions with a constant pool member reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display)]
#[repr(u8)]
pub enum MethodCall {
    /// Virtual dispatch
    #[strum(serialize = "invokevirtual")]
    InvokeVirtual = 0xb6,
    /// Constructors, private and super calls
    #[strum(serialize = "invokespecial")]
    InvokeSpecial = 0xb7,
    /// Static call
    #[strum(serialize = "invokestatic")]
    InvokeStatic = 0xb8,
    /// Interface dispatch
    #[strum(serialize = "invokeinterface")]
    InvokeInterface = 0xb9,
}

fn fixed_length(opcode: u8) -> Option<usize> {
    Some(match opcode {
        0x00..=0x0f => 1,
        0x10 => 2,
        0x11 => 3,
        0x12 => 2,
        0x13 | 0x14 => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x83 => 1,
        0x84 => 3,
        0x85..=0x98 => 1,
        0x99..=0xa8 => 3,
        0xa9 => 2,
        0xac..=0xb1 => 1,
        0xb2..=0xb8 => 3,
        0xb9 | 0xba => 5,
        0xbb => 3,
        0xbc => 2,
        0xbd => 3,
        0xbe | 0xbf => 1,
        0xc0 | 0xc1 => 3,
        0xc2 | 0xc3 => 1,
        0xc5 => 4,
        0xc6 | 0xc7 => 3,
        0xc8 | 0xc9 => 5,
        _ => return None,
    })
}

/// Length in bytes of the instruction starting at `offset`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for unknown opcodes and instructions that run past
/// the end of `code`.
pub fn instruction_length(code: &[u8], offset: usize) -> Result<usize> {
    let Some(&opcode) = code.get(offset) else {
        return Err(malformed_error!("Instruction offset {} is outside the code", offset));
    };

    let length = match opcode {
        op::TABLESWITCH => {
            let operands = offset + 1 + switch_padding(offset);
            let low = read_be::<i32>(code.get(operands + 4..).unwrap_or_default())?;
            let high = read_be::<i32>(code.get(operands + 8..).unwrap_or_default())?;
            if high < low {
                return Err(malformed_error!("tableswitch at {} has high < low", offset));
            }
            let entries = (i64::from(high) - i64::from(low) + 1) as usize;
            operands - offset + 12 + entries * 4
        }
        op::LOOKUPSWITCH => {
            let operands = offset + 1 + switch_padding(offset);
            let pairs = read_be::<i32>(code.get(operands + 4..).unwrap_or_default())?;
            let Ok(pairs) = usize::try_from(pairs) else {
                return Err(malformed_error!("lookupswitch at {} has negative npairs", offset));
            };
            operands - offset + 8 + pairs * 8
        }
        op::WIDE => match code.get(offset + 1) {
            Some(&op::IINC) => 6,
            Some(_) => 4,
            None => return Err(malformed_error!("Truncated wide instruction at {}", offset)),
        },
        other => match fixed_length(other) {
            Some(length) => length,
            None => return Err(malformed_error!("Unknown opcode 0x{:02x} at {}", other, offset)),
        },
    };

    if offset + length > code.len() {
        return Err(malformed_error!(
            "Instruction at {} runs past the end of the code",
            offset
        ));
    }
    Ok(length)
}

fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

/// A decoded instruction position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    /// Byte offset within the code array
    pub offset: usize,
    /// The opcode
    pub opcode: u8,
    /// All bytes of the instruction, opcode included
    pub bytes: &'a [u8],
}

impl Instruction<'_> {
    /// The `u16` constant pool operand following the opcode.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the instruction has no such operand.
    pub fn cp_index(&self) -> Result<u16> {
        read_be::<u16>(self.bytes.get(1..).unwrap_or_default())
    }
}

/// Decode the instruction boundaries of a code array.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the code cannot be walked to its end.
pub fn instructions(code: &[u8]) -> Result<Vec<Instruction<'_>>> {
    let mut offset = 0;
    let mut decoded = Vec::new();
    while offset < code.len() {
        let length = instruction_length(code, offset)?;
        decoded.push(Instruction {
            offset,
            opcode: code[offset],
            bytes: &code[offset..offset + length],
        });
        offset += length;
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_sequence() {
        // aload_0; invokespecial #1; iinc 1 1; return
        let code = [0x2a, 0xb7, 0x00, 0x01, 0x84, 0x01, 0x01, 0xb1];
        let decoded = instructions(&code).unwrap();
        let offsets: Vec<usize> = decoded.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![0, 1, 4, 7]);
        assert_eq!(decoded[1].cp_index().unwrap(), 1);
        assert_eq!(MethodCall::from_repr(decoded[1].opcode), Some(MethodCall::InvokeSpecial));
    }

    #[test]
    fn test_tableswitch_padding() {
        // iload_1 at 0, tableswitch at 1 (2 pad bytes), low 0, high 1
        let mut code = vec![0x1b, op::TABLESWITCH, 0, 0];
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&[0; 8]);
        code.push(op::RETURN);

        assert_eq!(instruction_length(&code, 1).unwrap(), 1 + 2 + 12 + 8);
        assert_eq!(instructions(&code).unwrap().len(), 3);
    }

    #[test]
    fn test_lookupswitch() {
        // lookupswitch at 0 (3 pad bytes), default, npairs 1
        let mut code = vec![op::LOOKUPSWITCH, 0, 0, 0];
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&[0; 8]);
        assert_eq!(instruction_length(&code, 0).unwrap(), code.len());
    }

    #[test]
    fn test_wide_forms() {
        assert_eq!(instruction_length(&[op::WIDE, op::ILOAD, 0, 1], 0).unwrap(), 4);
        assert_eq!(
            instruction_length(&[op::WIDE, op::IINC, 0, 1, 0, 1], 0).unwrap(),
            6
        );
        assert!(instruction_length(&[op::WIDE], 0).is_err());
    }

    #[test]
    fn test_invalid_code() {
        assert!(instructions(&[0xfe]).is_err());
        assert!(instructions(&[op::GETFIELD, 0x00]).is_err());
    }

    #[test]
    fn test_field_access_kinds() {
        assert_eq!(FieldAccess::from_repr(0xb5), Some(FieldAccess::PutField));
        assert!(FieldAccess::PutField.is_write());
        assert!(FieldAccess::GetField.is_instance());
        assert!(!FieldAccess::GetStatic.is_instance());
        assert_eq!(FieldAccess::PutStatic.to_string(), "putstatic");
        assert_eq!(MethodCall::from_repr(0xba), None);
    }
}
