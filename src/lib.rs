// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![warn(missing_docs)]
#![allow(clippy::too_many_arguments)]
//#![deny(unsafe_code)]
// - 'archive/entries.rs' uses mmap to map an input archive into memory

//! # jarfilter
//!
//! A post-compilation filter for JVM archives. `jarfilter` removes classes, fields and
//! methods marked with configurable annotations from the class files of a JAR, replaces
//! the bodies of other marked methods with a stub that throws, and keeps the Kotlin
//! `@kotlin.Metadata` of every class consistent with what is left.
//!
//! ## Features
//!
//! - **Annotation driven** - strip, delete and stub roles, each a set of annotation names
//! - **Cascading** - callers of deleted methods and readers of deleted fields go as well,
//!   across classes, until the archive no longer changes
//! - **Constructor safe** - field initialisers of deleted fields are patched in place
//!   instead of deleting the constructor
//! - **Kotlin aware** - functions, properties, constructors, nested classes, sealed
//!   subclasses and type aliases disappear from the metadata together with their bytecode
//! - **Metadata repair** - [`MetaFixer`] fixes the metadata of archives filtered by other
//!   tools
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use jarfilter::prelude::*;
//! use std::path::Path;
//!
//! let config = FilterConfig::new()
//!     .with_delete(["net.corda.core.DeleteForDJVM"])
//!     .with_stub(["net.corda.core.StubOutForDJVM"])
//!     .with_strip(["net.corda.core.KeepForDJVM"]);
//!
//! let report = JarFilter::new(config)?.filter_file(Path::new("in.jar"), Path::new("out.jar"))?;
//! println!(
//!     "{} passes, {} classes and {} methods deleted",
//!     report.passes,
//!     report.deleted_classes.len(),
//!     report.deleted_methods
//! );
//! # Ok::<(), jarfilter::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`archive`] - Reading and writing archives, and the multi-pass [`JarFilter`] driver
//! - [`filter`] - Filtering a single class file until it stops changing
//! - [`kotlin`] - Decoding, filtering and re-encoding `@kotlin.Metadata`
//! - [`metafix`] - Repairing metadata against the class files it describes
//! - [`classfile`] - The class file model, its attributes, bytecode and a builder
//! - [`registry`] - Classes and methods deleted so far, shared across the archive
//! - [`elements`] - Identities of fields and methods and their lifetimes
//! - [`config`] - Annotation sets and driver options
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result):
//!
//! ```rust,no_run
//! use jarfilter::{Error, FilterConfig, JarFilter};
//!
//! let filter = JarFilter::new(FilterConfig::new().with_delete(["a.DeleteMe"]))?;
//! match filter.filter_bytes(&std::fs::read("in.jar")?) {
//!     Ok((_, report)) => println!("{} classes rewritten", report.modified_classes.len()),
//!     Err(Error::Malformed { message, .. }) => println!("Malformed input: {}", message),
//!     Err(e) => println!("Error: {}", e),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
#[macro_use]
pub(crate) mod error;

/// Byte level readers and writers.
pub mod file;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use jarfilter::prelude::*;
///
/// let filter = JarFilter::new(FilterConfig::new().with_delete(["a.DeleteMe"]))?;
/// # Ok::<(), jarfilter::Error>(())
/// ```
pub mod prelude;

pub mod archive;
pub mod classfile;
pub mod config;
pub mod elements;
pub mod filter;
pub mod kotlin;
pub mod metafix;
pub mod registry;

/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust,no_run
/// use jarfilter::{Result, ClassFile};
///
/// fn class_name(bytes: &[u8]) -> Result<String> {
///     Ok(ClassFile::parse(bytes)?.name()?.to_string())
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `jarfilter` Error type
///
/// Every fallible operation of the crate reports one of its variants.
pub use error::Error;

/// The archive filter and its report.
pub use archive::{FilterReport, JarFilter};

/// The decoded class file model.
pub use classfile::ClassFile;

/// Configuration of [`JarFilter`] and [`MetaFixer`].
pub use config::{AnnotationSets, ArchiveOptions, FilterConfig};

/// Single class filtering.
pub use filter::{ClassDisposition, ClassFilter};

/// The metadata repair tool and its report.
pub use metafix::{MetaFixReport, MetaFixer};

/// Bounds checked reading of big-endian binary data.
///
/// # Example
///
/// ```rust
/// use jarfilter::Parser;
/// let data = [0xCA, 0xFE, 0xBA, 0xBE];
/// let mut parser = Parser::new(&data);
/// assert_eq!(parser.read_be::<u32>()?, 0xCAFE_BABE);
/// # Ok::<(), jarfilter::Error>(())
/// ```
pub use file::parser::Parser;

/// The shared registry of deleted classes and methods.
pub use registry::UnwantedRegistry;
