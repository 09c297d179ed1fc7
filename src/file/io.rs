//! Big-endian reading and writing of primitive values.
//!
//! Every multi-byte quantity in a JVM class file is stored in big-endian order. This module
//! provides the [`crate::file::io::ClassIO`] trait together with bounds-checked helpers that
//! read values at an offset and write or patch values inside a growing output buffer.
//!
//! # Key Components
//!
//! - [`crate::file::io::ClassIO`] - Endian conversion for the primitive types
//! - [`crate::file::io::read_be`] - Read a value from the start of a buffer
//! - [`crate::file::io::read_be_at`] - Read a value at an offset and advance it
//! - [`crate::file::io::write_be`] - Append a value to a buffer
//! - [`crate::file::io::write_be_at`] - Overwrite a value at an offset and advance it
//!
//! # Examples
//!
//! ```rust,ignore
//! use jarfilter::file::io::{read_be_at, write_be};
//!
//! let mut out = Vec::new();
//! write_be(&mut out, 0xCAFE_BABEu32);
//!
//! let mut offset = 0;
//! let magic: u32 = read_be_at(&out, &mut offset)?;
//! assert_eq!(magic, 0xCAFE_BABE);
//! assert_eq!(offset, 4);
//! # Ok::<(), jarfilter::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Trait for the primitive types that can be read from and written to class file data.
///
/// Each implementation names the fixed-size byte array matching the width of the type.
pub trait ClassIO: Sized + Copy {
    /// Byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte array in big-endian
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte array in big-endian
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_class_io {
    ($($ty:ty => $n:expr),* $(,)?) => {
        $(
            impl ClassIO for $ty {
                type Bytes = [u8; $n];

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_class_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
}

/// Read a big-endian value from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than `T`.
pub fn read_be<T: ClassIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0;
    read_be_at(data, &mut offset)
}

/// Read a big-endian value at `offset` and advance `offset` past it.
///
/// # Arguments
/// * `data` - The buffer to read from
/// * `offset` - Read position, advanced by the width of `T` on success
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the read would exceed `data`.
pub fn read_be_at<T: ClassIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let end = offset.checked_add(type_len).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_be_bytes(read))
}

/// Append a big-endian value to `out`.
pub fn write_be<T: ClassIO>(out: &mut Vec<u8>, value: T) {
    out.extend_from_slice(value.to_be_bytes().as_ref());
}

/// Overwrite a big-endian value at `offset` and advance `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit at `offset`.
pub fn write_be_at<T: ClassIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_be_bytes();
    let bytes = bytes.as_ref();
    let end = offset.checked_add(bytes.len()).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(bytes);
    *offset = end;
    Ok(())
}
