//! Identities of the class members the filter tracks.
//!
//! A [`MethodElement`] is identified by name and descriptor. A [`FieldElement`] is identified
//! by name and an *extension*: for a physical field the extension is always `"()"`, so a
//! field is found by name alone, while the Kotlin `$annotations` holder of a property is
//! recorded under the holder's parameter list.
//!
//! Elements inferred from Kotlin metadata or speculative evidence may not exist in the
//! class at all. They start with a [`Lifetime::Speculative`] time-to-live that counts down
//! on every visit of the class and are purged once it runs out, unless a physical
//! declaration confirms them first.

use std::{
    collections::HashSet,
    hash::{Hash, Hasher},
};

use crate::classfile::{access::AccessFlags, descriptor};

/// Number of class visits a speculative element survives without confirmation.
pub const DEFAULT_LIFETIME: i32 = 1;

/// Descriptor placeholder for fields known only by name.
pub const DUMMY_DESCRIPTOR: &str = "?";

/// Extension of every physical field.
pub const FIELD_EXTENSION: &str = "()";

/// Suffix of the synthetic method Kotlin emits to carry property annotations.
const ANNOTATIONS_HOLDER_SUFFIX: &str = "annotations";

/// How long an element stays in a working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Inferred, with the number of visits left before it expires
    Speculative(i32),
    /// Seen in the class file, never expires
    Confirmed,
}

impl Lifetime {
    /// Count down one visit. Returns `true` once the element has expired.
    pub fn tick(&mut self) -> bool {
        match self {
            Lifetime::Confirmed => false,
            Lifetime::Speculative(ttl) => {
                *ttl -= 1;
                *ttl < 0
            }
        }
    }
}

/// Elements that can expire from a working set.
pub trait Expiring {
    /// Count down one visit. Returns `true` once the element has expired.
    fn tick(&mut self) -> bool;

    /// Mark the element as physically present.
    fn confirm(&mut self);

    /// Returns `true` if the element has been seen in the class file.
    fn is_confirmed(&self) -> bool;
}

/// Tick every element of `set`, dropping the expired ones. Returns the number dropped.
pub fn drain_expired<T: Expiring + Eq + Hash>(set: &mut HashSet<T>) -> usize {
    let before = set.len();
    *set = set
        .drain()
        .filter_map(|mut element| (!element.tick()).then_some(element))
        .collect();
    before - set.len()
}

/// A method, identified by name and descriptor.
#[derive(Debug, Clone)]
pub struct MethodElement {
    name: String,
    descriptor: String,
    access: AccessFlags,
    lifetime: Lifetime,
}

impl MethodElement {
    /// A method inferred from evidence other than its declaration.
    #[must_use]
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        MethodElement {
            name: name.into(),
            descriptor: descriptor.into(),
            access: AccessFlags::empty(),
            lifetime: Lifetime::Speculative(DEFAULT_LIFETIME),
        }
    }

    /// A method seen in the class file.
    #[must_use]
    pub fn declared(name: impl Into<String>, descriptor: impl Into<String>, access: AccessFlags) -> Self {
        MethodElement {
            name: name.into(),
            descriptor: descriptor.into(),
            access,
            lifetime: Lifetime::Confirmed,
        }
    }

    /// The method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The method descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Access flags, empty for inferred methods.
    #[must_use]
    pub fn access(&self) -> AccessFlags {
        self.access
    }

    /// Current lifetime.
    #[must_use]
    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// Name up to the first `$`, which strips Kotlin's mangling suffixes.
    #[must_use]
    pub fn visible_name(&self) -> &str {
        visible_name(&self.name)
    }

    /// Parameter part of the descriptor, up to and including `)`.
    #[must_use]
    pub fn extension(&self) -> &str {
        descriptor::extension_of(&self.descriptor)
    }

    /// Instance or static initializer.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>" || self.name == "<clinit>"
    }

    /// Method returning `void`.
    #[must_use]
    pub fn is_void_function(&self) -> bool {
        descriptor::returns_void(&self.descriptor)
    }

    /// Compiler generated method.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.access.contains(AccessFlags::SYNTHETIC)
    }

    /// Method without a body.
    #[must_use]
    pub fn is_abstract_or_native(&self) -> bool {
        self.access.has_no_body()
    }

    /// Kotlin's synthetic `name$annotations` method that carries the annotations of a
    /// property or type alias.
    #[must_use]
    pub fn is_annotations_holder(&self) -> bool {
        self.is_kotlin_synthetic(&[ANNOTATIONS_HOLDER_SUFFIX]) && self.is_void_function()
    }

    /// Compiler generated method whose name carries one of the `$`-separated `tags`,
    /// such as `foo$default`.
    #[must_use]
    pub fn is_kotlin_synthetic(&self, tags: &[&str]) -> bool {
        self.is_synthetic()
            && self
                .name
                .split_once('$')
                .is_some_and(|(_, tag)| tags.contains(&tag))
    }
}

impl PartialEq for MethodElement {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.descriptor == other.descriptor
    }
}

impl Eq for MethodElement {}

impl Hash for MethodElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.descriptor.hash(state);
    }
}

impl Expiring for MethodElement {
    fn tick(&mut self) -> bool {
        self.lifetime.tick()
    }

    fn confirm(&mut self) {
        self.lifetime = Lifetime::Confirmed;
    }

    fn is_confirmed(&self) -> bool {
        self.lifetime == Lifetime::Confirmed
    }
}

impl std::fmt::Display for MethodElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}

/// A field, identified by name and extension.
#[derive(Debug, Clone)]
pub struct FieldElement {
    name: String,
    descriptor: String,
    extension: String,
    lifetime: Lifetime,
}

impl FieldElement {
    /// A field seen in the class file.
    #[must_use]
    pub fn declared(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        FieldElement {
            name: name.into(),
            descriptor: descriptor.into(),
            extension: FIELD_EXTENSION.to_string(),
            lifetime: Lifetime::Confirmed,
        }
    }

    /// A field known only by name and extension, with a placeholder descriptor.
    #[must_use]
    pub fn inferred(name: impl Into<String>, extension: impl Into<String>) -> Self {
        FieldElement {
            name: name.into(),
            descriptor: DUMMY_DESCRIPTOR.to_string(),
            extension: extension.into(),
            lifetime: Lifetime::Speculative(DEFAULT_LIFETIME),
        }
    }

    /// A physical field inferred from evidence other than its declaration.
    #[must_use]
    pub fn speculative(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        FieldElement {
            name: name.into(),
            descriptor: descriptor.into(),
            extension: FIELD_EXTENSION.to_string(),
            lifetime: Lifetime::Speculative(DEFAULT_LIFETIME),
        }
    }

    /// The field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The field descriptor, [`DUMMY_DESCRIPTOR`] if unknown.
    #[must_use]
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// The extension, `"()"` for physical fields.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Current lifetime.
    #[must_use]
    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// Record the real descriptor once the field has been seen.
    pub fn set_descriptor(&mut self, descriptor: &str) {
        if self.descriptor != descriptor {
            self.descriptor = descriptor.to_string();
        }
    }
}

impl PartialEq for FieldElement {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.extension == other.extension
    }
}

impl Eq for FieldElement {}

impl Hash for FieldElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.extension.hash(state);
    }
}

impl Expiring for FieldElement {
    fn tick(&mut self) -> bool {
        self.lifetime.tick()
    }

    fn confirm(&mut self) {
        self.lifetime = Lifetime::Confirmed;
    }

    fn is_confirmed(&self) -> bool {
        self.lifetime == Lifetime::Confirmed
    }
}

impl std::fmt::Display for FieldElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.descriptor)
    }
}

/// Name up to the first `$`. Names starting with `$` are returned unchanged.
#[must_use]
pub fn visible_name(name: &str) -> &str {
    match name.find('$') {
        Some(0) | None => name,
        Some(separator) => &name[..separator],
    }
}
