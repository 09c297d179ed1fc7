//! Output buffer for serialising class file structures.

use crate::{
    file::io::{write_be, write_be_at, ClassIO},
    Result,
};

/// A growable big-endian output buffer.
///
/// Besides appending values, the writer can reserve a length slot and fill it in once
/// the size of the following structure is known, which is how attribute lengths are
/// produced.
#[derive(Debug, Default)]
pub struct Writer {
    data: Vec<u8>,
}

impl Writer {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Writer { data: Vec::new() }
    }

    /// Append a big-endian value.
    pub fn write_be<T: ClassIO>(&mut self, value: T) {
        write_be(&mut self.data, value);
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Write a count as `u16`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `count` does not fit in 16 bits.
    pub fn write_count(&mut self, count: usize, what: &str) -> Result<()> {
        let Ok(count) = u16::try_from(count) else {
            return Err(malformed_error!("Too many {} ({})", what, count));
        };
        self.write_be(count);
        Ok(())
    }

    /// Reserve a `u32` length slot and return its position.
    pub fn reserve_u32(&mut self) -> usize {
        let pos = self.data.len();
        self.write_be(0u32);
        pos
    }

    /// Fill a slot reserved with [`Writer::reserve_u32`] with the number of bytes written since.
    ///
    /// # Errors
    /// Returns an error if the slot is invalid or the length exceeds `u32`.
    pub fn patch_length(&mut self, slot: usize) -> Result<()> {
        let written = self.data.len().saturating_sub(slot + 4);
        let Ok(written) = u32::try_from(written) else {
            return Err(malformed_error!("Structure too large ({} bytes)", written));
        };

        let mut offset = slot;
        write_be_at(&mut self.data, &mut offset, written)
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume the writer and return the bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_patching() {
        let mut writer = Writer::new();
        writer.write_be(7u16);
        let slot = writer.reserve_u32();
        writer.write_bytes(&[1, 2, 3]);
        writer.patch_length(slot).unwrap();

        assert_eq!(writer.into_inner(), vec![0, 7, 0, 0, 0, 3, 1, 2, 3]);
    }

    #[test]
    fn test_count_overflow() {
        let mut writer = Writer::new();
        assert!(writer.write_count(65535, "entries").is_ok());
        assert!(writer.write_count(65536, "entries").is_err());
    }
}
