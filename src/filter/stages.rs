//! The stages consuming a class's event stream.
//!
//! Each stage implements [`FilterStage`] and reacts to the events it cares about by
//! updating the shared [`StageContext`]. Stages never touch the class file: everything they
//! decide is recorded in the [`WorkingState`] or in the [`RewritePlan`] and applied
//! afterwards by the [`crate::filter::rewrite::ClassRewriter`].
//!
//! | Stage              | Responsibility                                               |
//! |--------------------|--------------------------------------------------------------|
//! | [`AnnotationStage`] | Delete and stub markings, annotations-holder inference      |
//! | [`NestingStage`]    | Nested classes follow their outer class or enclosing method |
//! | [`ReferenceStage`]  | Cascading deletion and constructor field-access patching    |

use crate::{
    classfile::{access::AccessFlags, constantpool::MemberRef},
    config::{AnnotationRole, AnnotationSets},
    elements::{FieldElement, MethodElement},
    filter::{
        events::{AnnotationTarget, ClassEvent, InsnRef, MemberDecl},
        rewrite::{FieldPatch, RewritePlan},
        state::WorkingState,
    },
    registry::UnwantedRegistry,
    Result,
};

/// Everything a stage may read or update while consuming events.
pub struct StageContext<'r> {
    /// Working state of the class being visited
    pub state: &'r mut WorkingState,
    /// Cross-class registry of deletions, receiving this class's findings
    pub registry: &'r UnwantedRegistry,
    /// Registry state that lookups of other classes read. Equal to `registry` unless the
    /// pass runs in parallel.
    pub view: &'r UnwantedRegistry,
    /// Configured annotation roles
    pub annotations: &'r AnnotationSets,
    /// Edits to apply after the walk
    pub plan: &'r mut RewritePlan,
}

/// A consumer of class events.
pub trait FilterStage {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    /// React to one event.
    ///
    /// # Errors
    /// Returns an error if the event reveals an inconsistency the stage cannot handle.
    fn on_event(&mut self, event: &ClassEvent<'_>, ctx: &mut StageContext<'_>) -> Result<()>;
}

/// The default stage pipeline, in the order events are offered to them.
#[must_use]
pub fn default_stages() -> Vec<Box<dyn FilterStage + Send>> {
    vec![
        Box::new(AnnotationStage),
        Box::new(NestingStage),
        Box::new(ReferenceStage),
    ]
}

/// Marks classes, fields and methods according to their annotations.
pub struct AnnotationStage;

impl AnnotationStage {
    fn on_delete(target: &AnnotationTarget<'_>, ctx: &mut StageContext<'_>) {
        match target {
            AnnotationTarget::Class => {
                log::debug!("{}: class is annotated for deletion", ctx.state.class_name());
                ctx.state.mark_class_unwanted();
                ctx.registry.add_class(ctx.state.class_name());
            }
            AnnotationTarget::Field(decl) => {
                ctx.state
                    .mark_field(FieldElement::declared(decl.name, decl.descriptor));
            }
            AnnotationTarget::Method(decl) => {
                let method = MethodElement::declared(decl.name, decl.descriptor, decl.access);
                if method.is_annotations_holder() {
                    ctx.state.mark_field(FieldElement::inferred(
                        method.visible_name(),
                        method.extension(),
                    ));
                }
                ctx.state.mark_method_deleted(method);
            }
        }
    }

    fn on_stub(target: &AnnotationTarget<'_>, ctx: &mut StageContext<'_>) {
        let AnnotationTarget::Method(decl) = target else {
            log::debug!(
                "{}: stub annotation ignored outside a method",
                ctx.state.class_name()
            );
            return;
        };

        if decl.access.has_no_body() || decl.access.contains(AccessFlags::SYNTHETIC) {
            log::debug!(
                "{}: cannot stub {}{} without a user-written body",
                ctx.state.class_name(),
                decl.name,
                decl.descriptor
            );
        } else if decl.name == "<init>" {
            log::warn!(
                "{}: constructor {}{} cannot be stubbed, leaving it unchanged",
                ctx.state.class_name(),
                decl.name,
                decl.descriptor
            );
        } else {
            ctx.state.mark_method_stubbed(MethodElement::declared(
                decl.name,
                decl.descriptor,
                decl.access,
            ));
        }
    }
}

impl FilterStage for AnnotationStage {
    fn name(&self) -> &'static str {
        "annotations"
    }

    fn on_event(&mut self, event: &ClassEvent<'_>, ctx: &mut StageContext<'_>) -> Result<()> {
        match event {
            ClassEvent::FieldDecl(decl) => ctx.state.confirm_field(decl.name, decl.descriptor),
            ClassEvent::MethodDecl(decl) => ctx.state.confirm_method(decl.name, decl.descriptor),
            ClassEvent::Annotation { target, descriptor } => {
                match ctx.annotations.role_of(descriptor) {
                    Some(AnnotationRole::Delete) => Self::on_delete(target, ctx),
                    Some(AnnotationRole::Stub) => Self::on_stub(target, ctx),
                    Some(AnnotationRole::Strip) | None => {}
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Propagates deletion between nested classes and their outer class.
///
/// Deleting a class deletes every class nested in it, whatever their own annotations say.
pub struct NestingStage;

impl NestingStage {
    fn drop_class(reason: &str, ctx: &mut StageContext<'_>) {
        if !ctx.state.is_class_unwanted() {
            log::debug!("{}: deleted because {}", ctx.state.class_name(), reason);
        }
        ctx.state.mark_class_unwanted();
        ctx.registry.add_class(ctx.state.class_name());
    }
}

impl FilterStage for NestingStage {
    fn name(&self) -> &'static str {
        "nesting"
    }

    fn on_event(&mut self, event: &ClassEvent<'_>, ctx: &mut StageContext<'_>) -> Result<()> {
        match event {
            ClassEvent::ClassHeader { name, .. } => {
                if ctx.view.contains_class(name) {
                    ctx.state.mark_class_unwanted();
                }
            }
            ClassEvent::OuterMethod { owner, method } => {
                if ctx.view.contains_class(owner) {
                    Self::drop_class(&format!("enclosing class {owner} is deleted"), ctx);
                } else if let Some((name, descriptor)) = method {
                    if ctx.view.contains_method(owner, name, descriptor) {
                        Self::drop_class(
                            &format!("enclosing method {owner}.{name}{descriptor} is deleted"),
                            ctx,
                        );
                    }
                }
            }
            ClassEvent::InnerClass { inner, outer } => {
                let this = ctx.state.class_name().to_string();
                if *inner == this {
                    if let Some(outer) = outer {
                        if ctx.view.contains_class(outer) {
                            Self::drop_class(&format!("outer class {outer} is deleted"), ctx);
                        }
                    }
                } else if *outer == Some(this.as_str())
                    && ctx.state.is_class_unwanted()
                    && ctx.registry.add_class(inner)
                {
                    log::debug!("{}: nested class {} deleted with it", this, inner);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Deletes methods whose bodies reference deleted elements.
///
/// Constructors reading or writing a deleted field of their own class are patched instead,
/// and methods marked for stubbing are exempt because their body is replaced anyway.
pub struct ReferenceStage;

impl ReferenceStage {
    fn is_method_unwanted(target: &MemberRef<'_>, ctx: &StageContext<'_>) -> bool {
        ctx.view.contains_class(target.owner)
            || ctx
                .view
                .contains_method(target.owner, target.name, target.descriptor)
            || (target.owner == ctx.state.class_name()
                && ctx.state.is_method_deleted(target.name, target.descriptor))
    }

    fn delete(method: &MemberDecl<'_>, target: &MemberRef<'_>, ctx: &mut StageContext<'_>) {
        if ctx.state.mark_method_deleted(MethodElement::declared(
            method.name,
            method.descriptor,
            method.access,
        )) {
            log::debug!(
                "{}: deleting {}{}, it references {}.{}{}",
                ctx.state.class_name(),
                method.name,
                method.descriptor,
                target.owner,
                target.name,
                target.descriptor
            );
        }
    }
}

impl FilterStage for ReferenceStage {
    fn name(&self) -> &'static str {
        "references"
    }

    fn on_event(&mut self, event: &ClassEvent<'_>, ctx: &mut StageContext<'_>) -> Result<()> {
        let ClassEvent::Instruction {
            method,
            offset,
            insn,
        } = event
        else {
            return Ok(());
        };

        if ctx.state.is_method_deleted(method.name, method.descriptor)
            || ctx.state.is_method_stubbed(method.name, method.descriptor)
        {
            return Ok(());
        }

        match insn {
            InsnRef::Invoke { target, .. } => {
                if Self::is_method_unwanted(target, ctx) {
                    Self::delete(method, target, ctx);
                }
            }
            InsnRef::Field { kind, target } => {
                if ctx.view.contains_class(target.owner) {
                    Self::delete(method, target, ctx);
                } else if target.owner == ctx.state.class_name()
                    && ctx.state.is_field_unwanted(target.name)
                {
                    if method.name == "<init>" || method.name == "<clinit>" {
                        ctx.plan.record(FieldPatch {
                            method: MethodElement::new(method.name, method.descriptor),
                            offset: *offset,
                            kind: *kind,
                            descriptor: target.descriptor.to_string(),
                        });
                    } else {
                        Self::delete(method, target, ctx);
                    }
                }
            }
            InsnRef::Dynamic { handles } => {
                if let Some(target) = handles
                    .iter()
                    .find(|handle| Self::is_method_unwanted(handle, ctx))
                {
                    Self::delete(method, target, ctx);
                }
            }
        }
        Ok(())
    }
}

/// Offer every event to every stage, in order.
///
/// # Errors
/// Returns the first error raised by a stage.
pub fn run_stages(
    stages: &mut [Box<dyn FilterStage + Send>],
    events: &[ClassEvent<'_>],
    ctx: &mut StageContext<'_>,
) -> Result<()> {
    for event in events {
        for stage in stages.iter_mut() {
            stage.on_event(event, ctx).map_err(|error| {
                log::debug!("stage {} failed: {}", stage.name(), error);
                error
            })?;
        }
    }
    Ok(())
}
