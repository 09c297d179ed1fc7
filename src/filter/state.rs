//! Working state of one class while it converges.

use std::collections::HashSet;

use crate::{
    elements::{drain_expired, Expiring, FieldElement, MethodElement},
    registry::UnwantedRegistry,
};

/// Everything known to be unwanted about one class.
///
/// The state outlives individual visits of the class: it is seeded once from the
/// [`UnwantedRegistry`], accumulates discoveries over every visit, and is drained of expired
/// speculative entries after each visit. The `discovered` flag records whether the current
/// visit learnt anything new, which is what drives the local fixed point.
#[derive(Debug, Clone)]
pub struct WorkingState {
    class_name: String,
    unwanted_class: bool,
    unwanted_fields: HashSet<FieldElement>,
    deleted_methods: HashSet<MethodElement>,
    stubbed_methods: HashSet<MethodElement>,
    discovered: bool,
}

impl WorkingState {
    /// Seed the state of `class_name` from the registry.
    #[must_use]
    pub fn new(class_name: &str, registry: &UnwantedRegistry) -> Self {
        WorkingState {
            class_name: class_name.to_string(),
            unwanted_class: registry.contains_class(class_name),
            unwanted_fields: HashSet::new(),
            deleted_methods: registry.methods_of(class_name),
            stubbed_methods: HashSet::new(),
            discovered: false,
        }
    }

    /// Internal name of the class.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Start a new visit.
    pub fn begin_visit(&mut self) {
        self.discovered = false;
    }

    /// Returns `true` if the current visit added anything.
    #[must_use]
    pub fn discovered(&self) -> bool {
        self.discovered
    }

    /// Mark the whole class as unwanted.
    pub fn mark_class_unwanted(&mut self) {
        if !self.unwanted_class {
            self.unwanted_class = true;
            self.discovered = true;
        }
    }

    /// Returns `true` if the class must be dropped.
    #[must_use]
    pub fn is_class_unwanted(&self) -> bool {
        self.unwanted_class
    }

    /// Mark a field as unwanted. Returns `true` if it was new.
    pub fn mark_field(&mut self, field: FieldElement) -> bool {
        let added = self.unwanted_fields.insert(field);
        self.discovered |= added;
        added
    }

    /// Mark a method as deleted, overriding any stub marking. Returns `true` if it was new.
    pub fn mark_method_deleted(&mut self, method: MethodElement) -> bool {
        if let Some(stubbed) = self.stubbed_methods.take(&method) {
            log::debug!(
                "{}: deletion of {} overrides its stub marking",
                self.class_name,
                stubbed
            );
        }

        let added = self.deleted_methods.insert(method);
        self.discovered |= added;
        added
    }

    /// Mark a method for stubbing. Deleted methods stay deleted. Returns `true` if it was new.
    pub fn mark_method_stubbed(&mut self, method: MethodElement) -> bool {
        if self.deleted_methods.contains(&method) {
            return false;
        }

        let added = self.stubbed_methods.insert(method);
        self.discovered |= added;
        added
    }

    /// A physical method declaration was seen; confirm a matching speculative entry.
    pub fn confirm_method(&mut self, name: &str, descriptor: &str) {
        let probe = MethodElement::new(name, descriptor);
        if let Some(mut method) = self.deleted_methods.take(&probe) {
            method.confirm();
            self.deleted_methods.insert(method);
        }
    }

    /// A physical field declaration was seen; confirm a matching speculative entry and
    /// record its real descriptor.
    pub fn confirm_field(&mut self, name: &str, descriptor: &str) {
        let probe = FieldElement::declared(name, descriptor);
        if let Some(mut field) = self.unwanted_fields.take(&probe) {
            field.confirm();
            field.set_descriptor(descriptor);
            self.unwanted_fields.insert(field);
        }
    }

    /// Returns `true` if the method is deleted.
    #[must_use]
    pub fn is_method_deleted(&self, name: &str, descriptor: &str) -> bool {
        self.deleted_methods
            .contains(&MethodElement::new(name, descriptor))
    }

    /// Returns `true` if the method is stubbed.
    #[must_use]
    pub fn is_method_stubbed(&self, name: &str, descriptor: &str) -> bool {
        self.stubbed_methods
            .contains(&MethodElement::new(name, descriptor))
    }

    /// Returns `true` if the physical field called `name` is unwanted.
    #[must_use]
    pub fn is_field_unwanted(&self, name: &str) -> bool {
        self.unwanted_fields
            .contains(&FieldElement::speculative(name, crate::elements::DUMMY_DESCRIPTOR))
    }

    /// The unwanted fields, including inferred annotation holders.
    #[must_use]
    pub fn unwanted_fields(&self) -> &HashSet<FieldElement> {
        &self.unwanted_fields
    }

    /// The deleted methods.
    #[must_use]
    pub fn deleted_methods(&self) -> &HashSet<MethodElement> {
        &self.deleted_methods
    }

    /// The stubbed methods.
    #[must_use]
    pub fn stubbed_methods(&self) -> &HashSet<MethodElement> {
        &self.stubbed_methods
    }

    /// Returns `true` if the class needs rewriting at all.
    #[must_use]
    pub fn has_marks(&self) -> bool {
        !self.unwanted_fields.is_empty()
            || !self.deleted_methods.is_empty()
            || !self.stubbed_methods.is_empty()
    }

    /// Age every speculative entry by one visit, dropping the expired ones.
    pub fn drain(&mut self) {
        let fields = drain_expired(&mut self.unwanted_fields);
        let methods = drain_expired(&mut self.deleted_methods);
        if fields + methods > 0 {
            log::debug!(
                "{}: {} speculative field(s) and {} method(s) expired",
                self.class_name,
                fields,
                methods
            );
        }
    }

    /// Consume the state, returning the deleted methods to keep in the registry.
    #[must_use]
    pub fn into_deleted_methods(self) -> HashSet<MethodElement> {
        self.deleted_methods
    }
}
