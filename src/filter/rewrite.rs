//! Applying a visit's decisions to the class file.
//!
//! The stages record what should happen; [`ClassRewriter`] makes it happen on the decoded
//! [`ClassFile`]:
//!
//! - unwanted fields and deleted methods are removed
//! - strip annotations are dropped everywhere, stub annotations from stubbed methods
//! - stubbed methods get a replacement body
//! - constructor accesses to deleted fields are neutralised in place
//! - nesting attributes forget deleted classes
//! - the Kotlin metadata loses declarations of deleted members
//!
//! Every step reports whether it changed anything, so that an untouched class is never
//! re-encoded.

use crate::{
    classfile::{
        annotations::{parse_annotations, write_annotations},
        attributes::{
            parse_class_list, parse_inner_classes, write_class_list, write_inner_classes,
            Attribute, CODE, INNER_CLASSES, NEST_MEMBERS, PERMITTED_SUBCLASSES,
            RUNTIME_INVISIBLE_ANNOTATIONS, RUNTIME_VISIBLE_ANNOTATIONS,
        },
        code::CodeAttribute,
        constantpool::ConstantPool,
        descriptor::StackKind,
        opcodes::{op, FieldAccess},
        ClassFile, MemberInfo,
    },
    config::AnnotationSets,
    elements::{FieldElement, MethodElement},
    filter::{state::WorkingState, stub::stub_body},
    kotlin::{
        transform::{transform_metadata, DeletedMembers},
        KotlinMetadata,
    },
    registry::UnwantedRegistry,
    Error, Result,
};

/// A field access inside a constructor or static initialiser that must be neutralised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPatch {
    /// The method containing the instruction
    pub method: MethodElement,
    /// Byte offset of the instruction
    pub offset: usize,
    /// The instruction found at `offset`
    pub kind: FieldAccess,
    /// Descriptor of the accessed field
    pub descriptor: String,
}

impl FieldPatch {
    /// The three bytes replacing the instruction. The replacement leaves the operand
    /// stack as the original instruction would have, with a zero value standing in for
    /// any value read.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an invalid field descriptor.
    pub fn replacement(&self) -> Result<[u8; 3]> {
        let value = StackKind::of(&self.descriptor)?;
        Ok(match self.kind {
            FieldAccess::GetField => [op::POP, value.zero_opcode(), op::NOP],
            FieldAccess::GetStatic => [value.zero_opcode(), op::NOP, op::NOP],
            FieldAccess::PutField => [value.pop_opcode(), op::POP, op::NOP],
            FieldAccess::PutStatic => [value.pop_opcode(), op::NOP, op::NOP],
        })
    }
}

/// Edits collected by the stages during one visit.
#[derive(Debug, Clone, Default)]
pub struct RewritePlan {
    patches: Vec<FieldPatch>,
}

impl RewritePlan {
    /// Record a field access patch.
    pub fn record(&mut self, patch: FieldPatch) {
        self.patches.push(patch);
    }

    /// The recorded patches, in the order they were found.
    #[must_use]
    pub fn patches(&self) -> &[FieldPatch] {
        &self.patches
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

/// What a rewrite did.
#[derive(Debug, Clone, Default)]
pub struct RewriteSummary {
    /// The class file was modified
    pub changed: bool,
    /// Methods the metadata transform found should be deleted too
    pub extra_methods: Vec<MethodElement>,
    /// Fields the metadata transform found should be deleted too
    pub extra_fields: Vec<FieldElement>,
}

/// Applies a visit's decisions to a decoded class file.
pub struct ClassRewriter<'a> {
    annotations: &'a AnnotationSets,
    registry: &'a UnwantedRegistry,
}

impl<'a> ClassRewriter<'a> {
    /// Create a rewriter for the configured annotation roles.
    #[must_use]
    pub fn new(annotations: &'a AnnotationSets, registry: &'a UnwantedRegistry) -> Self {
        ClassRewriter {
            annotations,
            registry,
        }
    }

    /// Rewrite `class` according to `state` and `plan`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InstructionMismatch`] if a patch does not find the
    /// instruction it expects, and [`crate::Error::Malformed`] for undecodable attributes.
    pub fn rewrite(
        &self,
        class: &mut ClassFile,
        state: &WorkingState,
        plan: &RewritePlan,
    ) -> Result<RewriteSummary> {
        let mut summary = RewriteSummary::default();

        summary.changed |= self.remove_fields(class, state)?;
        summary.changed |= self.remove_methods(class, state)?;
        summary.changed |= self.rewrite_methods(class, state, plan)?;

        let pool = &class.constant_pool;
        for field in &mut class.fields {
            summary.changed |= self.strip_annotations(pool, &mut field.attributes, false)?;
        }
        summary.changed |= self.strip_annotations(pool, &mut class.attributes, false)?;
        summary.changed |= self.filter_nesting(class)?;

        if let Some(metadata) = KotlinMetadata::read(class)? {
            let class_name = class.name()?.to_string();
            let evidence = DeletedMembers::new(
                state.unwanted_fields(),
                state.deleted_methods(),
                self.registry,
            );
            let outcome = transform_metadata(&metadata, &class_name, &evidence)?;
            if let Some(d1) = &outcome.d1 {
                summary.changed |= KotlinMetadata::replace_d1(class, d1)?;
            }
            summary.extra_methods = outcome.extra_methods;
            summary.extra_fields = outcome.extra_fields;
        }

        Ok(summary)
    }

    fn remove_fields(&self, class: &mut ClassFile, state: &WorkingState) -> Result<bool> {
        let keep = keep_flags(&class.fields, |field| {
            let name = class.member_name(field)?;
            if state.is_field_unwanted(name) {
                log::debug!("{}: removing field {}", state.class_name(), name);
                return Ok(false);
            }
            Ok(true)
        })?;
        Ok(retain_by(&mut class.fields, &keep))
    }

    fn remove_methods(&self, class: &mut ClassFile, state: &WorkingState) -> Result<bool> {
        let keep = keep_flags(&class.methods, |method| {
            let name = class.member_name(method)?;
            let descriptor = class.member_descriptor(method)?;
            if state.is_method_deleted(name, descriptor) {
                log::debug!("{}: removing method {}{}", state.class_name(), name, descriptor);
                return Ok(false);
            }
            Ok(true)
        })?;
        Ok(retain_by(&mut class.methods, &keep))
    }

    fn rewrite_methods(
        &self,
        class: &mut ClassFile,
        state: &WorkingState,
        plan: &RewritePlan,
    ) -> Result<bool> {
        let class_name = class.name()?.to_string();
        let mut changed = false;

        for method in &mut class.methods {
            let name = class.constant_pool.utf8(method.name_index)?.to_string();
            let descriptor = class.constant_pool.utf8(method.descriptor_index)?.to_string();
            let stubbed = state.is_method_stubbed(&name, &descriptor);

            changed |=
                self.strip_annotations(&class.constant_pool, &mut method.attributes, stubbed)?;

            if stubbed && !method.access.has_no_body() {
                changed |= replace_body(&mut class.constant_pool, method, &descriptor)?;
                continue;
            }

            let patches: Vec<&FieldPatch> = plan
                .patches()
                .iter()
                .filter(|patch| {
                    patch.method.name() == name && patch.method.descriptor() == descriptor
                })
                .collect();
            if !patches.is_empty() {
                apply_patches(&class_name, &class.constant_pool, method, &name, &patches)?;
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Drop configured annotations from an attribute list, and the attribute itself once it
    /// is empty.
    fn strip_annotations(
        &self,
        pool: &ConstantPool,
        attributes: &mut Vec<Attribute>,
        stubbed: bool,
    ) -> Result<bool> {
        let mut changed = false;
        let mut emptied = Vec::new();

        for (position, attribute) in attributes.iter_mut().enumerate() {
            let name = pool.utf8(attribute.name_index)?;
            if name != RUNTIME_VISIBLE_ANNOTATIONS && name != RUNTIME_INVISIBLE_ANNOTATIONS {
                continue;
            }

            let annotations = parse_annotations(&attribute.info)?;
            let before = annotations.len();
            let mut kept = Vec::with_capacity(annotations.len());
            for annotation in annotations {
                let descriptor = annotation.descriptor(pool)?;
                let remove = self.annotations.is_strip(descriptor)
                    || (stubbed && self.annotations.is_stub(descriptor));
                if !remove {
                    kept.push(annotation);
                }
            }

            if kept.len() == before {
                continue;
            }
            changed = true;
            if kept.is_empty() {
                emptied.push(position);
            } else {
                attribute.info = write_annotations(&kept)?;
            }
        }

        for position in emptied.into_iter().rev() {
            attributes.remove(position);
        }
        Ok(changed)
    }

    /// Remove deleted classes from `InnerClasses`, `NestMembers` and `PermittedSubclasses`.
    fn filter_nesting(&self, class: &mut ClassFile) -> Result<bool> {
        let mut changed = false;
        let pool = &class.constant_pool;

        for attribute in &mut class.attributes {
            let name = pool.utf8(attribute.name_index)?;
            if name == INNER_CLASSES {
                let entries = parse_inner_classes(&attribute.info)?;
                let before = entries.len();
                let mut kept = Vec::with_capacity(before);
                for entry in entries {
                    let inner = pool.class_name(entry.inner_class_info_index)?;
                    let outer = pool.optional_class_name(entry.outer_class_info_index)?;
                    if self.registry.contains_class(inner)
                        || outer.is_some_and(|outer| self.registry.contains_class(outer))
                    {
                        continue;
                    }
                    kept.push(entry);
                }
                if kept.len() != before {
                    attribute.info = write_inner_classes(&kept)?;
                    changed = true;
                }
            } else if name == NEST_MEMBERS || name == PERMITTED_SUBCLASSES {
                let classes = parse_class_list(&attribute.info)?;
                let before = classes.len();
                let mut kept = Vec::with_capacity(before);
                for index in classes {
                    if !self.registry.contains_class(pool.class_name(index)?) {
                        kept.push(index);
                    }
                }
                if kept.len() != before {
                    attribute.info = write_class_list(&kept)?;
                    changed = true;
                }
            }
        }
        Ok(changed)
    }
}

fn keep_flags<F>(members: &[MemberInfo], mut keep: F) -> Result<Vec<bool>>
where
    F: FnMut(&MemberInfo) -> Result<bool>,
{
    members.iter().map(|member| keep(member)).collect()
}

fn retain_by(members: &mut Vec<MemberInfo>, keep: &[bool]) -> bool {
    let before = members.len();
    let mut flags = keep.iter();
    members.retain(|_| flags.next().copied().unwrap_or(true));
    members.len() != before
}

/// Swap the body of a stubbed method. Returns `false` if it already is the stub.
fn replace_body(
    pool: &mut ConstantPool,
    method: &mut MemberInfo,
    descriptor: &str,
) -> Result<bool> {
    let Some(position) = Attribute::position(&method.attributes, pool, CODE)? else {
        return Ok(false);
    };

    let current = CodeAttribute::parse(&method.attributes[position].info)?;
    let stub = stub_body(pool, method.access, descriptor)?;
    if current == stub {
        return Ok(false);
    }

    method.attributes[position].info = stub.to_bytes()?;
    Ok(true)
}

fn apply_patches(
    class_name: &str,
    pool: &ConstantPool,
    method: &mut MemberInfo,
    method_name: &str,
    patches: &[&FieldPatch],
) -> Result<()> {
    let Some(position) = Attribute::position(&method.attributes, pool, CODE)? else {
        return Err(malformed_error!(
            "{}.{} has field patches but no Code attribute",
            class_name,
            method_name
        ));
    };

    let mut code = CodeAttribute::parse(&method.attributes[position].info)?;
    for patch in patches {
        let found = code.code.get(patch.offset).copied();
        if found != Some(patch.kind.opcode()) || patch.offset + 3 > code.code.len() {
            return Err(Error::InstructionMismatch {
                class: class_name.to_string(),
                method: patch.method.to_string(),
                offset: patch.offset,
                opcode: found.unwrap_or(op::NOP),
            });
        }
        let replacement = patch.replacement()?;
        code.code[patch.offset..patch.offset + 3].copy_from_slice(&replacement);
        log::debug!(
            "{}: neutralised {} at {} in {}",
            class_name,
            patch.kind,
            patch.offset,
            patch.method
        );
    }

    method.attributes[position].info = code.to_bytes()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{
        access::AccessFlags,
        builder::ClassBuilder,
        opcodes::{instructions, MethodCall},
    };

    fn sets() -> AnnotationSets {
        AnnotationSets::new()
            .with_delete(["x.Delete"])
            .with_stub(["x.Stub"])
            .with_strip(["x.Strip"])
    }

    fn code_of(class: &ClassFile, name: &str) -> CodeAttribute {
        let method = class
            .methods
            .iter()
            .find(|method| class.member_name(method).unwrap() == name)
            .unwrap();
        let attribute = Attribute::find(&method.attributes, &class.constant_pool, CODE)
            .unwrap()
            .unwrap();
        CodeAttribute::parse(&attribute.info).unwrap()
    }

    #[test]
    fn test_patch_replacements() {
        let patch = |kind, descriptor: &str| FieldPatch {
            method: MethodElement::new("<init>", "()V"),
            offset: 0,
            kind,
            descriptor: descriptor.to_string(),
        };
        assert_eq!(
            patch(FieldAccess::GetField, "J").replacement().unwrap(),
            [op::POP, op::LCONST_0, op::NOP]
        );
        assert_eq!(
            patch(FieldAccess::GetStatic, "Ljava/lang/String;")
                .replacement()
                .unwrap(),
            [op::ACONST_NULL, op::NOP, op::NOP]
        );
        assert_eq!(
            patch(FieldAccess::PutField, "D").replacement().unwrap(),
            [op::POP2, op::POP, op::NOP]
        );
        assert_eq!(
            patch(FieldAccess::PutStatic, "I").replacement().unwrap(),
            [op::POP, op::NOP, op::NOP]
        );
    }

    #[test]
    fn test_removes_members_and_strips_annotations() {
        let mut class = ClassBuilder::new("x/A")
            .class_annotation("Lx/Strip;")
            .field_annotated(AccessFlags::PRIVATE, "f", "I", &["Lx/Strip;", "Lx/Keep;"])
            .field(AccessFlags::PRIVATE, "gone", "I")
            .method(AccessFlags::PUBLIC, "dead", "()V", |code| {
                code.return_void();
                Ok(())
            })
            .into_class()
            .unwrap();

        let registry = UnwantedRegistry::new();
        let mut state = WorkingState::new("x/A", &registry);
        state.mark_field(FieldElement::declared("gone", "I"));
        state.mark_method_deleted(MethodElement::new("dead", "()V"));

        let annotations = sets();
        let rewriter = ClassRewriter::new(&annotations, &registry);
        let summary = rewriter
            .rewrite(&mut class, &state, &RewritePlan::default())
            .unwrap();
        assert!(summary.changed);
        assert_eq!(class.fields.len(), 1);
        assert!(class.methods.is_empty());
        assert!(class.annotations_of(&class.attributes).unwrap().is_empty());

        let kept = class.annotations_of(&class.fields[0].attributes).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].descriptor(&class.constant_pool).unwrap(), "Lx/Keep;");
    }

    #[test]
    fn test_stub_replaces_body_once() {
        let mut class = ClassBuilder::new("x/S")
            .method_annotated(AccessFlags::PUBLIC, "value", "()I", &["Lx/Stub;"], |code| {
                code.iconst(42);
                code.op(op::IRETURN);
                Ok(())
            })
            .into_class()
            .unwrap();

        let registry = UnwantedRegistry::new();
        let mut state = WorkingState::new("x/S", &registry);
        state.mark_method_stubbed(MethodElement::new("value", "()I"));

        let annotations = sets();
        let rewriter = ClassRewriter::new(&annotations, &registry);
        assert!(rewriter
            .rewrite(&mut class, &state, &RewritePlan::default())
            .unwrap()
            .changed);
        let code = code_of(&class, "value");
        assert_eq!(code.code.last(), Some(&op::ATHROW));
        assert!(class
            .annotations_of(&class.methods[0].attributes)
            .unwrap()
            .is_empty());

        assert!(!rewriter
            .rewrite(&mut class, &state, &RewritePlan::default())
            .unwrap()
            .changed);
    }

    #[test]
    fn test_constructor_patch() {
        let mut class = ClassBuilder::new("x/C")
            .field(AccessFlags::PRIVATE, "gone", "J")
            .method(AccessFlags::PUBLIC, "<init>", "()V", |code| {
                code.aload(0);
                code.invoke(MethodCall::InvokeSpecial, "java/lang/Object", "<init>", "()V")?;
                code.aload(0);
                code.op(op::LCONST_0);
                code.field(FieldAccess::PutField, "x/C", "gone", "J")?;
                code.return_void();
                Ok(())
            })
            .into_class()
            .unwrap();

        let registry = UnwantedRegistry::new();
        let mut state = WorkingState::new("x/C", &registry);
        state.mark_field(FieldElement::declared("gone", "J"));
        let mut plan = RewritePlan::default();
        plan.record(FieldPatch {
            method: MethodElement::new("<init>", "()V"),
            offset: 6,
            kind: FieldAccess::PutField,
            descriptor: "J".to_string(),
        });

        let annotations = sets();
        ClassRewriter::new(&annotations, &registry)
            .rewrite(&mut class, &state, &plan)
            .unwrap();
        assert!(class.fields.is_empty());
        let code = code_of(&class, "<init>");
        let opcodes: Vec<u8> = instructions(&code.code)
            .unwrap()
            .iter()
            .map(|insn| insn.opcode)
            .collect();
        assert_eq!(
            opcodes,
            vec![
                op::ALOAD_0,
                op::INVOKESPECIAL,
                op::ALOAD_0,
                op::LCONST_0,
                op::POP2,
                op::POP,
                op::NOP,
                op::RETURN
            ]
        );
    }

    #[test]
    fn test_patch_mismatch_is_an_error() {
        let mut class = ClassBuilder::new("x/C")
            .method(AccessFlags::PUBLIC, "<init>", "()V", |code| {
                code.return_void();
                Ok(())
            })
            .into_class()
            .unwrap();
        let registry = UnwantedRegistry::new();
        let state = WorkingState::new("x/C", &registry);
        let mut plan = RewritePlan::default();
        plan.record(FieldPatch {
            method: MethodElement::new("<init>", "()V"),
            offset: 0,
            kind: FieldAccess::GetStatic,
            descriptor: "I".to_string(),
        });

        let annotations = sets();
        let result =
            ClassRewriter::new(&annotations, &registry).rewrite(&mut class, &state, &plan);
        assert!(matches!(result, Err(Error::InstructionMismatch { offset: 0, .. })));
    }

    #[test]
    fn test_inner_classes_forget_deleted() {
        let mut class = ClassBuilder::new("x/Outer")
            .inner_class("x/Outer$Gone", Some("x/Outer"), Some("Gone"), 0x9)
            .inner_class("x/Outer$Kept", Some("x/Outer"), Some("Kept"), 0x9)
            .into_class()
            .unwrap();
        let registry = UnwantedRegistry::new();
        registry.add_class("x/Outer$Gone");
        let state = WorkingState::new("x/Outer", &registry);

        let annotations = sets();
        assert!(ClassRewriter::new(&annotations, &registry)
            .rewrite(&mut class, &state, &RewritePlan::default())
            .unwrap()
            .changed);
        let attribute = class.attribute(INNER_CLASSES).unwrap().unwrap();
        let entries = parse_inner_classes(&attribute.info).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            class
                .constant_pool
                .class_name(entries[0].inner_class_info_index)
                .unwrap(),
            "x/Outer$Kept"
        );
    }
}
