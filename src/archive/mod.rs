//! Filtering whole JAR archives.
//!
//! [`JarFilter`] reads an archive once, runs its class entries through
//! [`crate::filter::ClassFilter`] pass after pass, and writes the final entries back with
//! [`entries::write_entries`]. Entries that are not classes are carried over untouched.

pub mod driver;
pub mod entries;

pub use driver::{FilterReport, JarFilter};
pub use entries::ArchiveEntry;
