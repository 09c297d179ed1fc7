//! Byte level access to class files and archives.
//!
//! - [`crate::file::io`] - Big-endian primitive conversion
//! - [`crate::file::parser`] - Bounds checked reading cursor
//! - [`crate::file::writer`] - Output buffer with length back-patching

pub mod io;
pub mod parser;
pub mod writer;
