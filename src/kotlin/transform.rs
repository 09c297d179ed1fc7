//! Removing declarations from metadata.
//!
//! A transformer walks the declarations of a class or package message and asks a
//! [`DeclarationEvidence`] whether each one should go. Two kinds of evidence exist:
//!
//! - [`DeletedMembers`] lists what the filter deleted from the class file. Declarations
//!   whose JVM members were deleted are removed.
//! - [`PresentMembers`] lists what the class file still contains. Declarations whose JVM
//!   members are missing are removed; this is how metadata of an already filtered archive
//!   is repaired.
//!
//! Removing a property can expose more members to delete (its accessors, its annotation
//! holder and its backing field). These are reported back in [`TransformOutcome`] so the
//! filter can act on them in its next visit.

use std::collections::HashSet;

use crate::{
    elements::{visible_name, FieldElement, MethodElement, FIELD_EXTENSION},
    kotlin::{
        document::MetadataDocument,
        fields,
        protobuf::RawMessage,
        signatures::{
            constructor_signature, function_signature, property_members, PropertyMembers,
            TypeTable,
        },
        strings::NameResolver,
        KotlinMetadata, MetadataKind, CLASS_KIND_ANNOTATION, CLASS_KIND_COMPANION,
        CLASS_KIND_SHIFT, DEFAULT_CLASS_FLAGS,
    },
    registry::UnwantedRegistry,
    Result,
};

/// Decides which metadata declarations must be removed.
pub trait DeclarationEvidence {
    /// Whether the function with this JVM signature is gone.
    fn removes_function(&self, method: &MethodElement) -> bool;

    /// Whether the constructor with this JVM signature is gone.
    fn removes_constructor(&self, method: &MethodElement) -> bool {
        self.removes_function(method)
    }

    /// Whether the property with these JVM members is gone. Properties of a companion
    /// object keep their backing field in the enclosing class, so a missing field alone
    /// says nothing about them.
    fn removes_property(&self, property: &PropertyMembers, in_companion: bool) -> bool;

    /// Whether the nested class with this JVM name is gone.
    fn removes_nested_class(&self, class_name: &str) -> bool;

    /// Whether the sealed subclass with this JVM name is gone.
    fn removes_sealed_subclass(&self, class_name: &str) -> bool;

    /// Whether the type alias called `name` is gone.
    fn removes_type_alias(&self, name: &str) -> bool;
}

/// Evidence of what the filter deleted from one class.
pub struct DeletedMembers<'a> {
    fields: &'a HashSet<FieldElement>,
    methods: &'a HashSet<MethodElement>,
    registry: &'a UnwantedRegistry,
}

impl<'a> DeletedMembers<'a> {
    /// Create evidence from the deleted fields and methods of a class and the classes
    /// deleted so far.
    #[must_use]
    pub fn new(
        fields: &'a HashSet<FieldElement>,
        methods: &'a HashSet<MethodElement>,
        registry: &'a UnwantedRegistry,
    ) -> Self {
        DeletedMembers {
            fields,
            methods,
            registry,
        }
    }
}

impl DeclarationEvidence for DeletedMembers<'_> {
    fn removes_function(&self, method: &MethodElement) -> bool {
        self.methods.contains(method)
    }

    fn removes_property(&self, property: &PropertyMembers, in_companion: bool) -> bool {
        if let Some(getter) = &property.getter {
            if self.methods.contains(getter) {
                return true;
            }
        }
        if let Some(holder) = &property.holder {
            let inferred = FieldElement::inferred(visible_name(holder.name()), holder.extension());
            if self.methods.contains(holder) || self.fields.contains(&inferred) {
                return true;
            }
        }
        match (&property.getter, &property.field) {
            (None, Some(field)) => !in_companion && self.fields.contains(field),
            _ => false,
        }
    }

    fn removes_nested_class(&self, class_name: &str) -> bool {
        self.registry.contains_class(class_name)
    }

    fn removes_sealed_subclass(&self, class_name: &str) -> bool {
        self.registry.contains_class(class_name)
    }

    fn removes_type_alias(&self, name: &str) -> bool {
        self.fields
            .iter()
            .any(|field| field.name() == name && field.extension() == FIELD_EXTENSION)
    }
}

/// Evidence of what one class file still contains.
pub struct PresentMembers<'a> {
    fields: &'a HashSet<FieldElement>,
    methods: &'a HashSet<MethodElement>,
    nested_classes: &'a HashSet<String>,
    known_classes: &'a HashSet<String>,
}

impl<'a> PresentMembers<'a> {
    /// Create evidence from the declared fields and methods of a class, its nested classes
    /// that are still in the archive and every class name in the archive.
    #[must_use]
    pub fn new(
        fields: &'a HashSet<FieldElement>,
        methods: &'a HashSet<MethodElement>,
        nested_classes: &'a HashSet<String>,
        known_classes: &'a HashSet<String>,
    ) -> Self {
        PresentMembers {
            fields,
            methods,
            nested_classes,
            known_classes,
        }
    }
}

impl DeclarationEvidence for PresentMembers<'_> {
    fn removes_function(&self, method: &MethodElement) -> bool {
        !self.methods.contains(method)
    }

    fn removes_property(&self, property: &PropertyMembers, in_companion: bool) -> bool {
        match (&property.getter, &property.field) {
            (Some(getter), _) => !self.methods.contains(getter),
            (None, Some(field)) => !in_companion && !self.fields.contains(field),
            (None, None) => false,
        }
    }

    fn removes_nested_class(&self, class_name: &str) -> bool {
        !self.nested_classes.contains(class_name)
    }

    fn removes_sealed_subclass(&self, class_name: &str) -> bool {
        !self.known_classes.contains(class_name)
    }

    fn removes_type_alias(&self, _name: &str) -> bool {
        false
    }
}

/// The result of transforming one metadata annotation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOutcome {
    /// The new `d1`, present only if something was removed
    pub d1: Option<Vec<String>>,
    /// Descriptions of the removed declarations
    pub removed: Vec<String>,
    /// Members of removed properties that should be deleted as well
    pub extra_methods: Vec<MethodElement>,
    /// Backing fields of removed properties
    pub extra_fields: Vec<FieldElement>,
}

impl TransformOutcome {
    /// Returns `true` if the metadata changed.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.d1.is_some()
    }
}

/// Transform the metadata of `class_name` according to `evidence`.
///
/// Kinds other than classes, file facades and multi-file class parts are left alone.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for metadata that cannot be decoded.
pub fn transform_metadata<E: DeclarationEvidence>(
    metadata: &KotlinMetadata,
    class_name: &str,
    evidence: &E,
) -> Result<TransformOutcome> {
    let Some(kind) = metadata
        .metadata_kind()
        .filter(|kind| *kind == MetadataKind::Class || kind.is_package())
    else {
        return Ok(TransformOutcome::default());
    };
    if metadata.d1.iter().all(String::is_empty) {
        return Ok(TransformOutcome::default());
    }

    let mut document = MetadataDocument::decode(&metadata.d1, &metadata.d2)?;
    let mut outcome = if kind == MetadataKind::Class {
        ClassMetadataTransformer::new(class_name, evidence).transform(&mut document)?
    } else {
        PackageMetadataTransformer::new(class_name, evidence).transform(&mut document)?
    };

    if !outcome.removed.is_empty() {
        outcome.d1 = Some(document.encode());
    }
    Ok(outcome)
}

/// Removes declarations from the metadata of a class.
pub struct ClassMetadataTransformer<'a, E> {
    class_name: &'a str,
    evidence: &'a E,
}

impl<'a, E: DeclarationEvidence> ClassMetadataTransformer<'a, E> {
    /// Create a transformer for the class `class_name`.
    #[must_use]
    pub fn new(class_name: &'a str, evidence: &'a E) -> Self {
        ClassMetadataTransformer {
            class_name,
            evidence,
        }
    }

    /// Remove declarations from a class document.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for declarations that cannot be decoded.
    pub fn transform(&self, document: &mut MetadataDocument) -> Result<TransformOutcome> {
        let (resolver, message) = document.split_mut();
        let flags = message
            .int32(fields::CLASS_FLAGS)?
            .unwrap_or(DEFAULT_CLASS_FLAGS);
        let kind = (flags >> CLASS_KIND_SHIFT) & 0x7;
        let types = TypeTable::of(message)?;

        let mut pass =
            DeclarationPass::new(self.class_name, &resolver, types.as_ref(), self.evidence);
        if kind != CLASS_KIND_ANNOTATION {
            pass.constructors(message)?;
        }
        pass.functions(message, fields::CLASS_FUNCTION)?;
        pass.properties(message, fields::CLASS_PROPERTY, kind == CLASS_KIND_COMPANION)?;
        pass.type_aliases(message, fields::CLASS_TYPE_ALIAS)?;
        pass.nested_classes(message)?;
        pass.sealed_subclasses(message)?;
        Ok(pass.finish())
    }
}

/// Removes declarations from the metadata of a file facade or multi-file class part.
pub struct PackageMetadataTransformer<'a, E> {
    class_name: &'a str,
    evidence: &'a E,
}

impl<'a, E: DeclarationEvidence> PackageMetadataTransformer<'a, E> {
    /// Create a transformer for the facade class `class_name`.
    #[must_use]
    pub fn new(class_name: &'a str, evidence: &'a E) -> Self {
        PackageMetadataTransformer {
            class_name,
            evidence,
        }
    }

    /// Remove declarations from a package document.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for declarations that cannot be decoded.
    pub fn transform(&self, document: &mut MetadataDocument) -> Result<TransformOutcome> {
        let (resolver, message) = document.split_mut();
        let types = TypeTable::of(message)?;

        let mut pass =
            DeclarationPass::new(self.class_name, &resolver, types.as_ref(), self.evidence);
        pass.functions(message, fields::PACKAGE_FUNCTION)?;
        pass.properties(message, fields::PACKAGE_PROPERTY, false)?;
        pass.type_aliases(message, fields::PACKAGE_TYPE_ALIAS)?;
        Ok(pass.finish())
    }
}

struct DeclarationPass<'p, 'd, E> {
    class_name: &'p str,
    resolver: &'p NameResolver<'d>,
    types: Option<&'p TypeTable>,
    evidence: &'p E,
    outcome: TransformOutcome,
}

impl<'p, 'd, E: DeclarationEvidence> DeclarationPass<'p, 'd, E> {
    fn new(
        class_name: &'p str,
        resolver: &'p NameResolver<'d>,
        types: Option<&'p TypeTable>,
        evidence: &'p E,
    ) -> Self {
        DeclarationPass {
            class_name,
            resolver,
            types,
            evidence,
            outcome: TransformOutcome::default(),
        }
    }

    fn finish(self) -> TransformOutcome {
        self.outcome
    }

    fn removed(&mut self, what: &str, name: impl std::fmt::Display) {
        log::info!("-- removing {} {} from {}", what, name, self.class_name);
        self.outcome.removed.push(format!("{what} {name}"));
    }

    fn constructors(&mut self, message: &mut RawMessage) -> Result<()> {
        let mut positions = Vec::new();
        for (position, constructor) in message
            .messages(fields::CLASS_CONSTRUCTOR)?
            .iter()
            .enumerate()
        {
            let signature = constructor_signature(constructor, self.resolver, self.types)?;
            let Some(signature) = signature else {
                continue;
            };
            if self.evidence.removes_constructor(&signature) {
                self.removed("constructor", &signature);
                positions.push(position);
            }
        }
        message.remove_occurrences(fields::CLASS_CONSTRUCTOR, &positions);
        Ok(())
    }

    fn functions(&mut self, message: &mut RawMessage, number: u32) -> Result<()> {
        let mut positions = Vec::new();
        for (position, function) in message.messages(number)?.iter().enumerate() {
            let Some(signature) = function_signature(function, self.resolver, self.types)? else {
                continue;
            };
            if self.evidence.removes_function(&signature) {
                self.removed("function", &signature);
                positions.push(position);
            }
        }
        message.remove_occurrences(number, &positions);
        Ok(())
    }

    fn properties(
        &mut self,
        message: &mut RawMessage,
        number: u32,
        in_companion: bool,
    ) -> Result<()> {
        let mut positions = Vec::new();
        for (position, property) in message.messages(number)?.iter().enumerate() {
            let members = property_members(property, self.resolver, self.types)?;
            if !self.evidence.removes_property(&members, in_companion) {
                continue;
            }
            self.removed("property", &members.name);
            positions.push(position);

            let PropertyMembers {
                field,
                getter,
                setter,
                holder,
                ..
            } = members;
            self.outcome
                .extra_methods
                .extend([getter, setter, holder].into_iter().flatten());
            if let Some(field) = field {
                self.outcome
                    .extra_fields
                    .push(FieldElement::speculative(field.name(), field.descriptor()));
            }
        }
        message.remove_occurrences(number, &positions);
        Ok(())
    }

    fn type_aliases(&mut self, message: &mut RawMessage, number: u32) -> Result<()> {
        let mut positions = Vec::new();
        for (position, alias) in message.messages(number)?.iter().enumerate() {
            let Some(name) = alias.int32(fields::TYPE_ALIAS_NAME)? else {
                continue;
            };
            let name = self.resolver.string(name)?;
            if self.evidence.removes_type_alias(&name) {
                self.removed("type alias", &name);
                positions.push(position);
            }
        }
        message.remove_occurrences(number, &positions);
        Ok(())
    }

    fn nested_classes(&mut self, message: &mut RawMessage) -> Result<()> {
        let nested = message.int32s(fields::CLASS_NESTED_CLASS_NAME)?;
        let mut kept = Vec::with_capacity(nested.len());
        for index in &nested {
            let class_name = format!("{}${}", self.class_name, self.resolver.string(*index)?);
            if self.evidence.removes_nested_class(&class_name) {
                self.removed("nested class", &class_name);
            } else {
                kept.push(*index);
            }
        }
        if kept.len() != nested.len() {
            message.set_int32s(fields::CLASS_NESTED_CLASS_NAME, &kept);
        }
        Ok(())
    }

    fn sealed_subclasses(&mut self, message: &mut RawMessage) -> Result<()> {
        let subclasses = message.int32s(fields::CLASS_SEALED_SUBCLASS_FQ_NAME)?;
        let mut kept = Vec::with_capacity(subclasses.len());
        for index in &subclasses {
            let class_name = self.resolver.qualified_class_name(*index)?.replace('.', "$");
            if self.evidence.removes_sealed_subclass(&class_name) {
                self.removed("sealed subclass", &class_name);
            } else {
                kept.push(*index);
            }
        }
        if kept.len() != subclasses.len() {
            message.set_int32s(fields::CLASS_SEALED_SUBCLASS_FQ_NAME, &kept);
        }
        Ok(())
    }
}
