//! Cursor based parser for class file structures.
//!
//! [`crate::file::parser::Parser`] keeps a position inside a borrowed byte slice and offers
//! bounds-checked, big-endian reads. Every structure in [`crate::classfile`] is decoded
//! through it.
//!
//! # Examples
//!
//! ```rust
//! use jarfilter::Parser;
//!
//! let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_be::<u32>()?, 0xCAFE_BABE);
//! parser.advance_by(2)?;
//! assert_eq!(parser.read_be::<u16>()?, 52);
//! assert!(!parser.has_more_data());
//! # Ok::<(), jarfilter::Error>(())
//! ```

use crate::{
    file::io::{read_be_at, ClassIO},
    Error::OutOfBounds,
    Result,
};

/// A binary data parser for reading big-endian class file structures.
///
/// The parser maintains an internal position cursor and checks bounds on every
/// access, so truncated input surfaces as [`crate::Error::OutOfBounds`] instead
/// of a panic.
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`Parser`] from a byte slice.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if unread data remains.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Number of bytes left between the cursor and the end of the buffer.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Move the cursor to an absolute position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` lies past the end of the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Move the cursor forward by `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the step would leave the buffer.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        let target = self.position.checked_add(step).ok_or(OutOfBounds)?;
        self.seek(target)
    }

    /// Current position of the cursor.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// The complete underlying buffer.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Look at the byte under the cursor without consuming it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data.get(self.position).copied().ok_or(OutOfBounds)
    }

    /// Read a big-endian value and advance past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough data remains.
    pub fn read_be<T: ClassIO>(&mut self) -> Result<T> {
        read_be_at::<T>(self.data, &mut self.position)
    }

    /// Borrow the next `len` bytes and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `len` bytes remain.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.position.checked_add(len).ok_or(OutOfBounds)?;
        let Some(slice) = self.data.get(self.position..end) else {
            return Err(OutOfBounds);
        };

        self.position = end;
        Ok(slice)
    }

    /// Read a `u16` count followed by that many `u16` values.
    ///
    /// This shape is used by `NestMembers`, `PermittedSubclasses` and `Exceptions`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the list is truncated.
    pub fn read_u16_list(&mut self) -> Result<Vec<u16>> {
        let count = self.read_be::<u16>()?;
        let mut values = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            values.push(self.read_be::<u16>()?);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_reads() {
        let data = [0x00, 0x02, 0x00, 0x07, 0x00, 0x09, 0xFF];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.read_u16_list().unwrap(), vec![7, 9]);
        assert_eq!(parser.remaining(), 1);
        assert_eq!(parser.peek_byte().unwrap(), 0xFF);
        assert_eq!(parser.read_be::<u8>().unwrap(), 0xFF);
        assert!(!parser.has_more_data());
        assert!(parser.peek_byte().is_err());
    }

    #[test]
    fn test_read_bytes_bounds() {
        let data = [1, 2, 3, 4];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.read_bytes(3).unwrap(), &[1, 2, 3]);
        assert!(parser.read_bytes(2).is_err());
        assert_eq!(parser.pos(), 3);
    }

    #[test]
    fn test_seek_and_advance() {
        let data = [0u8; 8];
        let mut parser = Parser::new(&data);

        parser.seek(8).unwrap();
        assert!(parser.seek(9).is_err());
        parser.seek(2).unwrap();
        parser.advance_by(4).unwrap();
        assert_eq!(parser.pos(), 6);
        assert!(parser.advance_by(usize::MAX).is_err());
    }
}
