//! Flattening a class into a stream of events.
//!
//! [`class_events`] walks a parsed [`ClassFile`] once and emits a [`ClassEvent`] for every
//! declaration, annotation and relevant instruction, in a fixed order:
//!
//! 1. [`ClassEvent::ClassHeader`]
//! 2. [`ClassEvent::OuterMethod`], if the class has an `EnclosingMethod` attribute
//! 3. class annotations
//! 4. one [`ClassEvent::InnerClass`] per `InnerClasses` record
//! 5. per field: [`ClassEvent::FieldDecl`] followed by its annotations
//! 6. per method: [`ClassEvent::MethodDecl`], its annotations, then its instructions
//! 7. [`ClassEvent::ClassEnd`]
//!
//! Class annotations precede the nesting records so a class deleted by annotation already
//! knows it when it meets its nested classes, and member annotations precede the member's
//! instructions so a method marked for stubbing is known before its body is inspected.

use crate::{
    classfile::{
        access::AccessFlags,
        attributes::{
            parse_bootstrap_methods, parse_enclosing_method, parse_inner_classes, Attribute,
            BootstrapMethod, BOOTSTRAP_METHODS, CODE, ENCLOSING_METHOD, INNER_CLASSES,
        },
        code::CodeAttribute,
        constantpool::{Constant, MemberRef},
        opcodes::{instructions, op, FieldAccess, MethodCall},
        ClassFile, MemberInfo,
    },
    Result,
};

/// The declaration an annotation is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationTarget<'a> {
    /// The class itself
    Class,
    /// A field
    Field(MemberDecl<'a>),
    /// A method
    Method(MemberDecl<'a>),
}

/// Name, descriptor and flags of a field or method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberDecl<'a> {
    /// Member name
    pub name: &'a str,
    /// Member descriptor
    pub descriptor: &'a str,
    /// Access flags
    pub access: AccessFlags,
}

/// An instruction the filter cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsnRef<'a> {
    /// `invokevirtual`, `invokespecial`, `invokestatic` or `invokeinterface`
    Invoke {
        /// The invocation kind
        kind: MethodCall,
        /// The called method
        target: MemberRef<'a>,
    },
    /// `getfield`, `putfield`, `getstatic` or `putstatic`
    Field {
        /// The access kind
        kind: FieldAccess,
        /// The accessed field
        target: MemberRef<'a>,
    },
    /// `invokedynamic`, with every method handle among its bootstrap method and arguments
    Dynamic {
        /// Methods reachable through the call site's bootstrap method handles
        handles: Vec<MemberRef<'a>>,
    },
}

/// One step of the walk over a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassEvent<'a> {
    /// Start of the class
    ClassHeader {
        /// Internal name of the class
        name: &'a str,
        /// Class access flags
        access: AccessFlags,
    },
    /// The method or class enclosing a local or anonymous class
    OuterMethod {
        /// Internal name of the enclosing class
        owner: &'a str,
        /// Enclosing method name and descriptor, if any
        method: Option<(&'a str, &'a str)>,
    },
    /// An annotation on the class or one of its members
    Annotation {
        /// What the annotation is placed on
        target: AnnotationTarget<'a>,
        /// Field descriptor of the annotation type
        descriptor: &'a str,
    },
    /// An `InnerClasses` record
    InnerClass {
        /// Internal name of the nested class
        inner: &'a str,
        /// Internal name of the declaring class, if any
        outer: Option<&'a str>,
    },
    /// A field declaration
    FieldDecl(MemberDecl<'a>),
    /// A method declaration
    MethodDecl(MemberDecl<'a>),
    /// An instruction inside the body of `method`
    Instruction {
        /// The method containing the instruction
        method: MemberDecl<'a>,
        /// Byte offset of the instruction
        offset: usize,
        /// The decoded instruction
        insn: InsnRef<'a>,
    },
    /// End of the class
    ClassEnd,
}

fn member_decl<'a>(class: &'a ClassFile, member: &MemberInfo) -> Result<MemberDecl<'a>> {
    Ok(MemberDecl {
        name: class.member_name(member)?,
        descriptor: class.member_descriptor(member)?,
        access: member.access,
    })
}

fn annotation_events<'a>(
    class: &'a ClassFile,
    attributes: &[Attribute],
    target: AnnotationTarget<'a>,
    events: &mut Vec<ClassEvent<'a>>,
) -> Result<()> {
    for annotation in class.annotations_of(attributes)? {
        events.push(ClassEvent::Annotation {
            target,
            descriptor: class.constant_pool.utf8(annotation.type_index)?,
        });
    }
    Ok(())
}

fn dynamic_handles<'a>(
    class: &'a ClassFile,
    bootstrap: &[BootstrapMethod],
    cp_index: u16,
) -> Result<Vec<MemberRef<'a>>> {
    let pool = &class.constant_pool;
    let bootstrap_index = match pool.get(cp_index)? {
        Constant::InvokeDynamic {
            bootstrap_index, ..
        } => usize::from(*bootstrap_index),
        other => {
            return Err(malformed_error!(
                "invokedynamic operand has tag {}",
                other.tag()
            ))
        }
    };
    let Some(entry) = bootstrap.get(bootstrap_index) else {
        return Err(malformed_error!(
            "invokedynamic refers to missing bootstrap method {}",
            bootstrap_index
        ));
    };

    let mut handles = Vec::new();
    for index in std::iter::once(&entry.method_ref).chain(entry.arguments.iter()) {
        if let Some(member) = pool.method_handle(*index)? {
            handles.push(member);
        }
    }
    Ok(handles)
}

fn instruction_events<'a>(
    class: &'a ClassFile,
    method: MemberDecl<'a>,
    code: &CodeAttribute,
    bootstrap: &[BootstrapMethod],
    events: &mut Vec<ClassEvent<'a>>,
) -> Result<()> {
    for insn in instructions(&code.code)? {
        let decoded = if let Some(kind) = MethodCall::from_repr(insn.opcode) {
            InsnRef::Invoke {
                kind,
                target: class.constant_pool.member_ref(insn.cp_index()?)?,
            }
        } else if let Some(kind) = FieldAccess::from_repr(insn.opcode) {
            InsnRef::Field {
                kind,
                target: class.constant_pool.member_ref(insn.cp_index()?)?,
            }
        } else if insn.opcode == op::INVOKEDYNAMIC {
            InsnRef::Dynamic {
                handles: dynamic_handles(class, bootstrap, insn.cp_index()?)?,
            }
        } else {
            continue;
        };

        events.push(ClassEvent::Instruction {
            method,
            offset: insn.offset,
            insn: decoded,
        });
    }
    Ok(())
}

/// Flatten `class` into its event stream.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if an attribute, annotation or method body cannot be
/// decoded.
pub fn class_events(class: &ClassFile) -> Result<Vec<ClassEvent<'_>>> {
    let pool = &class.constant_pool;
    let mut events = vec![ClassEvent::ClassHeader {
        name: class.name()?,
        access: class.access,
    }];

    if let Some(attribute) = class.attribute(ENCLOSING_METHOD)? {
        let enclosing = parse_enclosing_method(&attribute.info)?;
        let method = if enclosing.method_index == 0 {
            None
        } else {
            Some(pool.name_and_type(enclosing.method_index)?)
        };
        events.push(ClassEvent::OuterMethod {
            owner: pool.class_name(enclosing.class_index)?,
            method,
        });
    }

    annotation_events(class, &class.attributes, AnnotationTarget::Class, &mut events)?;

    if let Some(attribute) = class.attribute(INNER_CLASSES)? {
        for entry in parse_inner_classes(&attribute.info)? {
            events.push(ClassEvent::InnerClass {
                inner: pool.class_name(entry.inner_class_info_index)?,
                outer: pool.optional_class_name(entry.outer_class_info_index)?,
            });
        }
    }

    for field in &class.fields {
        let decl = member_decl(class, field)?;
        events.push(ClassEvent::FieldDecl(decl));
        annotation_events(class, &field.attributes, AnnotationTarget::Field(decl), &mut events)?;
    }

    let bootstrap = match class.attribute(BOOTSTRAP_METHODS)? {
        Some(attribute) => parse_bootstrap_methods(&attribute.info)?,
        None => Vec::new(),
    };

    for method in &class.methods {
        let decl = member_decl(class, method)?;
        events.push(ClassEvent::MethodDecl(decl));
        annotation_events(class, &method.attributes, AnnotationTarget::Method(decl), &mut events)?;

        if let Some(attribute) = Attribute::find(&method.attributes, pool, CODE)? {
            let code = CodeAttribute::parse(&attribute.info)?;
            instruction_events(class, decl, &code, &bootstrap, &mut events)?;
        }
    }

    events.push(ClassEvent::ClassEnd);
    Ok(events)
}
