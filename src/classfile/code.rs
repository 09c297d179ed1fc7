//! The `Code` attribute.

use crate::{
    classfile::attributes::Attribute,
    file::{parser::Parser, writer::Writer},
    Result,
};

/// One row of a method's exception table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ExceptionHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Class constant of the caught type, `0` catches everything
    pub catch_type: u16,
}

/// Decoded `Code` attribute of a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    /// Maximum operand stack depth
    pub max_stack: u16,
    /// Number of local variable slots
    pub max_locals: u16,
    /// Bytecode
    pub code: Vec<u8>,
    /// Exception table
    pub exception_table: Vec<ExceptionHandler>,
    /// Nested attributes such as `LineNumberTable` and `StackMapTable`
    pub attributes: Vec<Attribute>,
}

impl CodeAttribute {
    /// Decode the payload of a `Code` attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated input and
    /// [`crate::Error::Malformed`] for trailing bytes.
    pub fn parse(info: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(info);
        let max_stack = parser.read_be::<u16>()?;
        let max_locals = parser.read_be::<u16>()?;
        let code_length = parser.read_be::<u32>()? as usize;
        let code = parser.read_bytes(code_length)?.to_vec();

        let handlers = parser.read_be::<u16>()?;
        let mut exception_table = Vec::with_capacity(usize::from(handlers));
        for _ in 0..handlers {
            exception_table.push(ExceptionHandler {
                start_pc: parser.read_be()?,
                end_pc: parser.read_be()?,
                handler_pc: parser.read_be()?,
                catch_type: parser.read_be()?,
            });
        }

        let attributes = Attribute::parse_list(&mut parser)?;
        if parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes in Code attribute",
                parser.remaining()
            ));
        }

        Ok(CodeAttribute {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    /// Encode the payload of a `Code` attribute.
    ///
    /// # Errors
    /// Returns an error if a table exceeds its count limit.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Writer::new();
        out.write_be(self.max_stack);
        out.write_be(self.max_locals);
        let Ok(code_length) = u32::try_from(self.code.len()) else {
            return Err(malformed_error!("Code array too large"));
        };
        out.write_be(code_length);
        out.write_bytes(&self.code);
        out.write_count(self.exception_table.len(), "exception handlers")?;
        for handler in &self.exception_table {
            out.write_be(handler.start_pc);
            out.write_be(handler.end_pc);
            out.write_be(handler.handler_pc);
            out.write_be(handler.catch_type);
        }
        Attribute::write_list(&self.attributes, &mut out)?;
        Ok(out.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        let attribute = CodeAttribute {
            max_stack: 2,
            max_locals: 1,
            code: vec![0x2a, 0xb1],
            exception_table: vec![ExceptionHandler {
                start_pc: 0,
                end_pc: 1,
                handler_pc: 1,
                catch_type: 0,
            }],
            attributes: vec![Attribute {
                name_index: 3,
                info: vec![0, 0],
            }],
        };

        let bytes = attribute.to_bytes().unwrap();
        assert_eq!(CodeAttribute::parse(&bytes).unwrap(), attribute);
    }

    #[test]
    fn test_code_truncated() {
        assert!(CodeAttribute::parse(&[0, 1, 0, 1, 0, 0, 0, 5, 0xb1]).is_err());
    }
}
