//! # jarfilter Prelude
//!
//! The types needed to filter or repair an archive, for glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all jarfilter operations
pub use crate::Error;

/// The result type used throughout jarfilter
pub use crate::Result;

// ================================================================================================
// Entry Points
// ================================================================================================

/// Multi-pass archive filter and its report
pub use crate::{FilterReport, JarFilter};

/// Metadata repair and its report
pub use crate::{MetaFixReport, MetaFixer};

/// Single class filtering
pub use crate::filter::{ClassDisposition, ClassFilter, FilterOutcome};

// ================================================================================================
// Configuration
// ================================================================================================

/// Annotation roles, sets and driver options
pub use crate::config::{AnnotationRole, AnnotationSets, ArchiveOptions, FilterConfig};

// ================================================================================================
// Class Files
// ================================================================================================

/// The class file model and its builder
pub use crate::classfile::{access::AccessFlags, builder::ClassBuilder, ClassFile};

/// Field and method identities
pub use crate::elements::{FieldElement, MethodElement};

/// Deleted classes and methods shared across an archive
pub use crate::registry::UnwantedRegistry;
