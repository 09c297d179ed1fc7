//! Configuration of the archive filter and the metadata repair tool.
//!
//! The filter is driven by three disjoint sets of annotation types: annotations that are
//! simply stripped, annotations that delete the element they are placed on, and annotations
//! that replace a method body with a stub. Annotation types may be given as qualified names
//! (`com.example.DeleteMe`), internal names (`com/example/DeleteMe`) or field descriptors
//! (`Lcom/example/DeleteMe;`); they are all normalised to descriptors.
//!
//! # Examples
//!
//! ```rust
//! use jarfilter::FilterConfig;
//!
//! let config = FilterConfig::new()
//!     .with_delete(["com.example.DeleteMe"])
//!     .with_stub(["com.example.StubMeOut"])
//!     .with_max_passes(3);
//! config.validate()?;
//! assert!(config.annotations.is_delete("Lcom/example/DeleteMe;"));
//! # Ok::<(), jarfilter::Error>(())
//! ```

use std::collections::BTreeSet;

use strum::{Display, EnumIter, IntoEnumIterator};

use crate::Result;

/// Default upper bound of passes over an archive.
pub const DEFAULT_MAX_PASSES: usize = 5;

/// What the filter does with an element carrying an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum AnnotationRole {
    /// Remove the annotation, keep the element
    #[strum(serialize = "strip")]
    Strip,
    /// Remove the element
    #[strum(serialize = "delete")]
    Delete,
    /// Replace the method body
    #[strum(serialize = "stub")]
    Stub,
}

/// Convert an annotation type name into a field descriptor.
///
/// # Errors
/// Returns [`crate::Error::Config`] for empty names and names containing characters that
/// cannot appear in a class name.
pub fn to_descriptor(name: &str) -> Result<String> {
    let name = name.trim();
    if name.starts_with('L') && name.ends_with(';') && name.len() > 2 {
        return Ok(name.to_string());
    }
    if name.is_empty() || name.contains([';', '[', '<', '>']) || name.starts_with('.') {
        return Err(config_error!("'{}' is not an annotation type name", name));
    }
    Ok(format!("L{};", name.replace('.', "/")))
}

/// The strip, delete and stub annotation sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationSets {
    strip: BTreeSet<String>,
    delete: BTreeSet<String>,
    stub: BTreeSet<String>,
    invalid: Vec<String>,
}

impl AnnotationSets {
    /// Create empty sets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_all<I, S>(&mut self, role: AnnotationRole, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            match to_descriptor(name.as_ref()) {
                Ok(descriptor) => {
                    self.set_mut(role).insert(descriptor);
                }
                Err(_) => self.invalid.push(name.as_ref().to_string()),
            }
        }
    }

    fn set_mut(&mut self, role: AnnotationRole) -> &mut BTreeSet<String> {
        match role {
            AnnotationRole::Strip => &mut self.strip,
            AnnotationRole::Delete => &mut self.delete,
            AnnotationRole::Stub => &mut self.stub,
        }
    }

    /// Descriptors assigned to `role`.
    #[must_use]
    pub fn set(&self, role: AnnotationRole) -> &BTreeSet<String> {
        match role {
            AnnotationRole::Strip => &self.strip,
            AnnotationRole::Delete => &self.delete,
            AnnotationRole::Stub => &self.stub,
        }
    }

    /// Add annotations to strip.
    #[must_use]
    pub fn with_strip<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.insert_all(AnnotationRole::Strip, names);
        self
    }

    /// Add annotations that delete their element.
    #[must_use]
    pub fn with_delete<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.insert_all(AnnotationRole::Delete, names);
        self
    }

    /// Add annotations that stub their method.
    #[must_use]
    pub fn with_stub<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.insert_all(AnnotationRole::Stub, names);
        self
    }

    /// The role of the annotation with `descriptor`, if it has one.
    #[must_use]
    pub fn role_of(&self, descriptor: &str) -> Option<AnnotationRole> {
        AnnotationRole::iter().find(|role| self.set(*role).contains(descriptor))
    }

    /// Returns `true` if `descriptor` is in the strip set.
    #[must_use]
    pub fn is_strip(&self, descriptor: &str) -> bool {
        self.strip.contains(descriptor)
    }

    /// Returns `true` if `descriptor` is in the delete set.
    #[must_use]
    pub fn is_delete(&self, descriptor: &str) -> bool {
        self.delete.contains(descriptor)
    }

    /// Returns `true` if `descriptor` is in the stub set.
    #[must_use]
    pub fn is_stub(&self, descriptor: &str) -> bool {
        self.stub.contains(descriptor)
    }

    /// Returns `true` if no annotation has a role.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strip.is_empty() && self.delete.is_empty() && self.stub.is_empty()
    }

    /// Check that every name was valid and that the sets are pairwise disjoint.
    ///
    /// # Errors
    /// Returns [`crate::Error::Config`] naming the offending annotation.
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = self.invalid.first() {
            return Err(config_error!("'{}' is not an annotation type name", name));
        }

        let roles: Vec<AnnotationRole> = AnnotationRole::iter().collect();
        for (index, first) in roles.iter().enumerate() {
            for second in &roles[index + 1..] {
                if let Some(shared) = self.set(*first).intersection(self.set(*second)).next() {
                    return Err(config_error!(
                        "annotation {} is listed for both {} and {}",
                        shared,
                        first,
                        second
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Entry handling for rewritten archives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Keep each entry's modification time instead of the fixed 1980-02-01 timestamp.
    pub preserve_timestamps: bool,
}

impl ArchiveOptions {
    /// Create the default options (normalised timestamps).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep or normalise entry timestamps.
    #[must_use]
    pub fn with_preserve_timestamps(mut self, preserve: bool) -> Self {
        self.preserve_timestamps = preserve;
        self
    }
}

/// Configuration for [`crate::JarFilter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    /// The strip, delete and stub annotation sets.
    pub annotations: AnnotationSets,

    /// Maximum number of passes over the archive (default: 5, at least 1).
    pub max_passes: usize,

    /// Entry handling of the output archive.
    pub archive: ArchiveOptions,

    /// Process the classes of a pass on the rayon thread pool (default: false).
    pub parallel: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            annotations: AnnotationSets::default(),
            max_passes: DEFAULT_MAX_PASSES,
            archive: ArchiveOptions::default(),
            parallel: false,
        }
    }
}

impl FilterConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the annotation sets.
    #[must_use]
    pub fn with_annotations(mut self, annotations: AnnotationSets) -> Self {
        self.annotations = annotations;
        self
    }

    /// Adds annotations to strip.
    #[must_use]
    pub fn with_strip<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.annotations = self.annotations.with_strip(names);
        self
    }

    /// Adds annotations that delete their element.
    #[must_use]
    pub fn with_delete<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.annotations = self.annotations.with_delete(names);
        self
    }

    /// Adds annotations that stub their method.
    #[must_use]
    pub fn with_stub<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.annotations = self.annotations.with_stub(names);
        self
    }

    /// Sets the maximum number of passes; values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes.max(1);
        self
    }

    /// Keep or normalise entry timestamps.
    #[must_use]
    pub fn with_preserve_timestamps(mut self, preserve: bool) -> Self {
        self.archive.preserve_timestamps = preserve;
        self
    }

    /// Enable parallel processing of the classes within a pass.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// The effective pass bound, never below 1.
    #[must_use]
    pub fn effective_max_passes(&self) -> usize {
        self.max_passes.max(1)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns [`crate::Error::Config`] if the annotation sets overlap or contain invalid names.
    pub fn validate(&self) -> Result<()> {
        self.annotations.validate()
    }
}
