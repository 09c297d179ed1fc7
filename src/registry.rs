//! Cross-class record of everything that has been deleted.
//!
//! The [`UnwantedRegistry`] is shared by every class processed during a filtering run and
//! survives from one pass over the archive to the next. It knows which classes have been
//! deleted outright and, for each surviving class, which of its methods are gone. Other
//! classes consult it to discover that they reference something that no longer exists.
//!
//! The registry is backed by [`dashmap`] so a pass can process entries in parallel.

use std::collections::HashSet;

use dashmap::{DashMap, DashSet};

use crate::elements::MethodElement;

/// Deleted classes and the deleted methods of surviving classes.
#[derive(Debug, Default)]
pub struct UnwantedRegistry {
    classes: DashSet<String>,
    class_methods: DashMap<String, HashSet<MethodElement>>,
}

impl UnwantedRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A frozen copy of the current records.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        UnwantedRegistry {
            classes: self.classes.clone(),
            class_methods: self.class_methods.clone(),
        }
    }

    /// Record a deleted class. Returns `true` if it was not known before.
    ///
    /// Any method-level records for the class become meaningless and are dropped.
    pub fn add_class(&self, class_name: &str) -> bool {
        let added = self.classes.insert(class_name.to_string());
        if added {
            self.class_methods.remove(class_name);
        }
        added
    }

    /// Returns `true` if `class_name` has been deleted.
    #[must_use]
    pub fn contains_class(&self, class_name: &str) -> bool {
        self.classes.contains(class_name)
    }

    /// Record one deleted method of a surviving class. Returns `true` if it was new.
    ///
    /// Methods of deleted classes are not tracked.
    pub fn add_method(&self, class_name: &str, method: MethodElement) -> bool {
        if self.contains_class(class_name) {
            return false;
        }
        self.class_methods
            .entry(class_name.to_string())
            .or_default()
            .insert(method)
    }

    /// Returns `true` if the method `name` with `descriptor` of `class_name` is deleted.
    #[must_use]
    pub fn contains_method(&self, class_name: &str, name: &str, descriptor: &str) -> bool {
        self.class_methods
            .get(class_name)
            .is_some_and(|methods| methods.contains(&MethodElement::new(name, descriptor)))
    }

    /// The deleted methods recorded for `class_name`.
    #[must_use]
    pub fn methods_of(&self, class_name: &str) -> HashSet<MethodElement> {
        self.class_methods
            .get(class_name)
            .map(|methods| methods.value().clone())
            .unwrap_or_default()
    }

    /// Replace the deleted methods of `class_name` with the final set of a class visit.
    pub fn update_methods(&self, class_name: &str, methods: HashSet<MethodElement>) {
        if self.contains_class(class_name) {
            return;
        }
        if methods.is_empty() {
            self.class_methods.remove(class_name);
        } else {
            self.class_methods.insert(class_name.to_string(), methods);
        }
    }

    /// Number of deleted classes.
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Number of deleted methods across all surviving classes.
    #[must_use]
    pub fn method_count(&self) -> usize {
        // A class may be deleted by its outer class while recording its own methods.
        self.class_methods
            .iter()
            .filter(|entry| !self.classes.contains(entry.key()))
            .map(|entry| entry.value().len())
            .sum()
    }

    /// Sorted names of the deleted classes.
    #[must_use]
    pub fn deleted_classes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.iter().map(|name| name.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_class_drops_methods() {
        let registry = UnwantedRegistry::new();
        assert!(registry.add_method("a/B", MethodElement::new("f", "()V")));
        assert!(registry.contains_method("a/B", "f", "()V"));

        assert!(registry.add_class("a/B"));
        assert!(!registry.add_class("a/B"));
        assert!(registry.contains_class("a/B"));
        assert!(!registry.contains_method("a/B", "f", "()V"));
        assert!(!registry.add_method("a/B", MethodElement::new("g", "()V")));
        assert_eq!(registry.method_count(), 0);
    }

    #[test]
    fn test_update_methods_replaces() {
        let registry = UnwantedRegistry::new();
        registry.add_method("a/C", MethodElement::new("old", "()V"));

        let mut methods = HashSet::new();
        methods.insert(MethodElement::new("new", "(I)V"));
        registry.update_methods("a/C", methods);
        assert!(!registry.contains_method("a/C", "old", "()V"));
        assert!(registry.contains_method("a/C", "new", "(I)V"));
        assert_eq!(registry.methods_of("a/C").len(), 1);

        registry.update_methods("a/C", HashSet::new());
        assert_eq!(registry.method_count(), 0);
    }

    #[test]
    fn test_deleted_classes_sorted() {
        let registry = UnwantedRegistry::new();
        registry.add_class("z/Z");
        registry.add_class("a/A");
        assert_eq!(registry.deleted_classes(), vec!["a/A", "z/Z"]);
        assert_eq!(registry.class_count(), 2);
    }

    #[test]
    fn test_snapshot_is_frozen() {
        let registry = UnwantedRegistry::new();
        registry.add_method("a/B", MethodElement::new("f", "()V"));
        let snapshot = registry.snapshot();

        registry.add_class("a/Gone");
        registry.add_method("a/B", MethodElement::new("g", "()V"));

        assert!(snapshot.contains_method("a/B", "f", "()V"));
        assert!(!snapshot.contains_method("a/B", "g", "()V"));
        assert!(!snapshot.contains_class("a/Gone"));
        assert_eq!(registry.method_count(), 2);
    }
}
