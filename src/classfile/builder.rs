//! Assembling class files from scratch.
//!
//! [`ClassBuilder`] produces small but complete class files: fields, methods with real
//! bytecode, runtime annotations, nesting attributes, bootstrap methods and an optional
//! `@kotlin.Metadata` annotation. It backs the test-suites, the benchmarks and the fuzz
//! seed corpus, and is handy for reproducing filter behaviour on hand-written classes.
//!
//! Builder methods consume and return the builder. The first error raised while
//! assembling is kept and reported by [`ClassBuilder::build`].
//!
//! # Examples
//!
//! ```rust
//! use jarfilter::classfile::{access::AccessFlags, builder::ClassBuilder, opcodes::MethodCall};
//!
//! let bytes = ClassBuilder::new("com/example/Foo")
//!     .method_annotated(
//!         AccessFlags::PUBLIC,
//!         "bar",
//!         "()V",
//!         &["Lcom/example/Delete;"],
//!         |code| {
//!             code.return_void();
//!             Ok(())
//!         },
//!     )
//!     .method(AccessFlags::PUBLIC, "baz", "()V", |code| {
//!         code.aload(0);
//!         code.invoke(MethodCall::InvokeVirtual, "com/example/Foo", "bar", "()V")?;
//!         code.return_void();
//!         Ok(())
//!     })
//!     .build()?;
//! assert_eq!(&bytes[..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
//! # Ok::<(), jarfilter::Error>(())
//! ```

use crate::{
    classfile::{
        access::AccessFlags,
        annotations::{write_annotations, Annotation, ElementValue},
        attributes::{
            write_bootstrap_methods, write_inner_classes, Attribute, BootstrapMethod,
            InnerClassEntry, BOOTSTRAP_METHODS, CODE, ENCLOSING_METHOD, INNER_CLASSES,
            RUNTIME_VISIBLE_ANNOTATIONS,
        },
        code::CodeAttribute,
        constantpool::{Constant, ConstantPool},
        descriptor::parameter_slots,
        opcodes::{op, FieldAccess, MethodCall},
        ClassFile, MemberInfo,
    },
    kotlin::KOTLIN_METADATA_DESC,
    Error, Result,
};

/// Method handle kind `REF_invokeStatic`.
const REF_INVOKE_STATIC: u8 = 6;

/// Incrementally assembled method body.
pub struct CodeBuilder<'a> {
    pool: &'a mut ConstantPool,
    bootstrap: &'a mut Vec<BootstrapMethod>,
    code: Vec<u8>,
    max_stack: u16,
    extra_locals: u16,
}

impl CodeBuilder<'_> {
    /// Append a single-byte instruction.
    pub fn op(&mut self, opcode: u8) {
        self.code.push(opcode);
    }

    /// `aload` of a local slot.
    pub fn aload(&mut self, slot: u8) {
        if slot <= 3 {
            self.code.push(op::ALOAD_0 + slot);
        } else {
            self.code.extend_from_slice(&[op::ALOAD, slot]);
        }
    }

    /// Push a small integer constant.
    pub fn iconst(&mut self, value: i8) {
        match value {
            -1..=5 => self.code.push((i16::from(op::ICONST_0) + i16::from(value)) as u8),
            _ => self.code.extend_from_slice(&[op::BIPUSH, value as u8]),
        }
    }

    /// Push a string constant.
    ///
    /// # Errors
    /// Returns an error if the constant pool is full.
    pub fn ldc_string(&mut self, value: &str) -> Result<()> {
        let index = self.pool.add_string(value)?;
        self.push_ldc(index);
        Ok(())
    }

    fn push_ldc(&mut self, index: u16) {
        match u8::try_from(index) {
            Ok(short) => self.code.extend_from_slice(&[op::LDC, short]),
            Err(_) => {
                self.code.push(op::LDC_W);
                self.code.extend_from_slice(&index.to_be_bytes());
            }
        }
    }

    /// Call a method.
    ///
    /// # Errors
    /// Returns an error if the constant pool is full or the descriptor is invalid.
    pub fn invoke(
        &mut self,
        kind: MethodCall,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<()> {
        let class_index = self.pool.add_class(owner)?;
        let name_and_type_index = self.pool.add_name_and_type(name, descriptor)?;
        let index = if kind == MethodCall::InvokeInterface {
            self.pool.find_or_add(Constant::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            })?
        } else {
            self.pool.find_or_add(Constant::MethodRef {
                class_index,
                name_and_type_index,
            })?
        };

        self.code.push(kind as u8);
        self.code.extend_from_slice(&index.to_be_bytes());
        if kind == MethodCall::InvokeInterface {
            let count = parameter_slots(descriptor)?.saturating_add(1);
            self.code.extend_from_slice(&[count.min(255) as u8, 0]);
        }
        Ok(())
    }

    /// Read or write a field.
    ///
    /// # Errors
    /// Returns an error if the constant pool is full.
    pub fn field(
        &mut self,
        kind: FieldAccess,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<()> {
        let index = self.pool.add_field_ref(owner, name, descriptor)?;
        self.code.push(kind.opcode());
        self.code.extend_from_slice(&index.to_be_bytes());
        Ok(())
    }

    /// Allocate an instance of `class`.
    ///
    /// # Errors
    /// Returns an error if the constant pool is full.
    pub fn new_object(&mut self, class: &str) -> Result<()> {
        let index = self.pool.add_class(class)?;
        self.code.push(op::NEW);
        self.code.extend_from_slice(&index.to_be_bytes());
        Ok(())
    }

    /// `invokedynamic` through a static bootstrap method whose static arguments are
    /// handles to `targets`, each given as `(owner, name, descriptor)`.
    ///
    /// # Errors
    /// Returns an error if the constant pool is full.
    pub fn invokedynamic(
        &mut self,
        bootstrap: (&str, &str, &str),
        targets: &[(&str, &str, &str)],
        name: &str,
        descriptor: &str,
    ) -> Result<()> {
        let bootstrap_ref = self
            .pool
            .add_method_ref(bootstrap.0, bootstrap.1, bootstrap.2)?;
        let method_ref = self.pool.find_or_add(Constant::MethodHandle {
            kind: REF_INVOKE_STATIC,
            reference_index: bootstrap_ref,
        })?;

        let mut arguments = Vec::with_capacity(targets.len());
        for (owner, target_name, target_descriptor) in targets {
            let target = self
                .pool
                .add_method_ref(owner, target_name, target_descriptor)?;
            arguments.push(self.pool.find_or_add(Constant::MethodHandle {
                kind: REF_INVOKE_STATIC,
                reference_index: target,
            })?);
        }

        let entry = BootstrapMethod {
            method_ref,
            arguments,
        };
        let bootstrap_index = match self.bootstrap.iter().position(|known| *known == entry) {
            Some(index) => index,
            None => {
                self.bootstrap.push(entry);
                self.bootstrap.len() - 1
            }
        };
        let Ok(bootstrap_index) = u16::try_from(bootstrap_index) else {
            return Err(malformed_error!("Too many bootstrap methods"));
        };

        let name_and_type_index = self.pool.add_name_and_type(name, descriptor)?;
        let index = self.pool.find_or_add(Constant::InvokeDynamic {
            bootstrap_index,
            name_and_type_index,
        })?;
        self.code.push(op::INVOKEDYNAMIC);
        self.code.extend_from_slice(&index.to_be_bytes());
        self.code.extend_from_slice(&[0, 0]);
        Ok(())
    }

    /// `return` from a void method.
    pub fn return_void(&mut self) {
        self.code.push(op::RETURN);
    }

    /// Override the default operand stack size of 4.
    pub fn max_stack(&mut self, max_stack: u16) {
        self.max_stack = max_stack;
    }

    /// Reserve local variable slots beyond `this` and the parameters.
    pub fn extra_locals(&mut self, slots: u16) {
        self.extra_locals = slots;
    }
}

/// Builder for class files.
pub struct ClassBuilder {
    name: String,
    super_name: Option<String>,
    access: AccessFlags,
    pool: ConstantPool,
    fields: Vec<MemberInfo>,
    methods: Vec<MemberInfo>,
    class_annotations: Vec<Annotation>,
    inner_classes: Vec<(String, Option<String>, Option<String>, u16)>,
    enclosing: Option<(String, Option<(String, String)>)>,
    bootstrap: Vec<BootstrapMethod>,
    error: Option<Error>,
}

impl ClassBuilder {
    /// Start a public class extending `java/lang/Object`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        ClassBuilder {
            name: name.to_string(),
            super_name: Some("java/lang/Object".to_string()),
            access: AccessFlags::from_raw(0x0021),
            pool: ConstantPool::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            class_annotations: Vec::new(),
            inner_classes: Vec::new(),
            enclosing: None,
            bootstrap: Vec::new(),
            error: None,
        }
    }

    /// Replace the class access flags.
    #[must_use]
    pub fn access(mut self, access: AccessFlags) -> Self {
        self.access = access;
        self
    }

    /// Replace the superclass.
    #[must_use]
    pub fn super_class(mut self, super_name: &str) -> Self {
        self.super_name = Some(super_name.to_string());
        self
    }

    fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                if self.error.is_none() {
                    self.error = Some(error);
                }
                None
            }
        }
    }

    fn marker_annotations(&mut self, descriptors: &[&str]) -> Result<Vec<Annotation>> {
        descriptors
            .iter()
            .map(|descriptor| {
                Ok(Annotation {
                    type_index: self.pool.add_utf8(descriptor)?,
                    elements: Vec::new(),
                })
            })
            .collect()
    }

    fn annotation_attributes(&mut self, annotations: &[Annotation]) -> Result<Vec<Attribute>> {
        if annotations.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Attribute {
            name_index: self.pool.add_utf8(RUNTIME_VISIBLE_ANNOTATIONS)?,
            info: write_annotations(annotations)?,
        }])
    }

    /// Annotate the class with marker annotations.
    #[must_use]
    pub fn class_annotation(mut self, descriptor: &str) -> Self {
        let annotations = self.marker_annotations(&[descriptor]);
        if let Some(annotations) = self.record(annotations) {
            self.class_annotations.extend(annotations);
        }
        self
    }

    /// Attach a `@kotlin.Metadata` annotation with the given kind and data arrays.
    #[must_use]
    pub fn kotlin_metadata(mut self, kind: i32, d1: &[String], d2: &[String]) -> Self {
        let annotation = self.metadata_annotation(kind, d1, d2);
        if let Some(annotation) = self.record(annotation) {
            self.class_annotations.push(annotation);
        }
        self
    }

    fn metadata_annotation(&mut self, kind: i32, d1: &[String], d2: &[String]) -> Result<Annotation> {
        fn strings(pool: &mut ConstantPool, values: &[String]) -> Result<ElementValue> {
            let mut elements = Vec::with_capacity(values.len());
            for value in values {
                elements.push(ElementValue::Const {
                    tag: b's',
                    index: pool.add_utf8(value)?,
                });
            }
            Ok(ElementValue::Array(elements))
        }

        let mut version = Vec::new();
        for part in [1, 9, 0] {
            version.push(ElementValue::Const {
                tag: b'I',
                index: self.pool.find_or_add(Constant::Integer(part))?,
            });
        }

        Ok(Annotation {
            type_index: self.pool.add_utf8(KOTLIN_METADATA_DESC)?,
            elements: vec![
                (
                    self.pool.add_utf8("mv")?,
                    ElementValue::Array(version),
                ),
                (
                    self.pool.add_utf8("k")?,
                    ElementValue::Const {
                        tag: b'I',
                        index: self.pool.find_or_add(Constant::Integer(kind))?,
                    },
                ),
                (self.pool.add_utf8("d1")?, strings(&mut self.pool, d1)?),
                (self.pool.add_utf8("d2")?, strings(&mut self.pool, d2)?),
            ],
        })
    }

    /// Declare a field without annotations.
    #[must_use]
    pub fn field(self, access: AccessFlags, name: &str, descriptor: &str) -> Self {
        self.field_annotated(access, name, descriptor, &[])
    }

    /// Declare a field carrying marker annotations.
    #[must_use]
    pub fn field_annotated(
        mut self,
        access: AccessFlags,
        name: &str,
        descriptor: &str,
        annotations: &[&str],
    ) -> Self {
        let member = self.member(access, name, descriptor, annotations, None);
        if let Some(member) = self.record(member) {
            self.fields.push(member);
        }
        self
    }

    /// Declare a method with a body.
    #[must_use]
    pub fn method<F>(self, access: AccessFlags, name: &str, descriptor: &str, body: F) -> Self
    where
        F: FnOnce(&mut CodeBuilder<'_>) -> Result<()>,
    {
        self.method_annotated(access, name, descriptor, &[], body)
    }

    /// Declare a method with a body and marker annotations.
    #[must_use]
    pub fn method_annotated<F>(
        mut self,
        access: AccessFlags,
        name: &str,
        descriptor: &str,
        annotations: &[&str],
        body: F,
    ) -> Self
    where
        F: FnOnce(&mut CodeBuilder<'_>) -> Result<()>,
    {
        let code = self.assemble(access, descriptor, body);
        let member = code.and_then(|code| self.member(access, name, descriptor, annotations, Some(code)));
        if let Some(member) = self.record(member) {
            self.methods.push(member);
        }
        self
    }

    /// Declare an abstract or native method, which has no `Code` attribute.
    #[must_use]
    pub fn method_without_body(
        mut self,
        access: AccessFlags,
        name: &str,
        descriptor: &str,
        annotations: &[&str],
    ) -> Self {
        let member = self.member(access, name, descriptor, annotations, None);
        if let Some(member) = self.record(member) {
            self.methods.push(member);
        }
        self
    }

    /// Record an `InnerClasses` entry.
    #[must_use]
    pub fn inner_class(
        mut self,
        inner: &str,
        outer: Option<&str>,
        simple_name: Option<&str>,
        access: u16,
    ) -> Self {
        self.inner_classes.push((
            inner.to_string(),
            outer.map(str::to_string),
            simple_name.map(str::to_string),
            access,
        ));
        self
    }

    /// Set the `EnclosingMethod` attribute.
    #[must_use]
    pub fn enclosing_method(mut self, owner: &str, method: Option<(&str, &str)>) -> Self {
        self.enclosing = Some((
            owner.to_string(),
            method.map(|(name, descriptor)| (name.to_string(), descriptor.to_string())),
        ));
        self
    }

    fn assemble<F>(&mut self, access: AccessFlags, descriptor: &str, body: F) -> Result<CodeAttribute>
    where
        F: FnOnce(&mut CodeBuilder<'_>) -> Result<()>,
    {
        let mut builder = CodeBuilder {
            pool: &mut self.pool,
            bootstrap: &mut self.bootstrap,
            code: Vec::new(),
            max_stack: 4,
            extra_locals: 0,
        };
        body(&mut builder)?;

        let receiver = u16::from(!access.contains(AccessFlags::STATIC));
        let max_locals = parameter_slots(descriptor)?
            .saturating_add(receiver)
            .saturating_add(builder.extra_locals);
        Ok(CodeAttribute {
            max_stack: builder.max_stack,
            max_locals,
            code: builder.code,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        })
    }

    fn member(
        &mut self,
        access: AccessFlags,
        name: &str,
        descriptor: &str,
        annotations: &[&str],
        code: Option<CodeAttribute>,
    ) -> Result<MemberInfo> {
        let name_index = self.pool.add_utf8(name)?;
        let descriptor_index = self.pool.add_utf8(descriptor)?;
        let mut attributes = Vec::new();
        if let Some(code) = code {
            attributes.push(Attribute {
                name_index: self.pool.add_utf8(CODE)?,
                info: code.to_bytes()?,
            });
        }
        let annotations = self.marker_annotations(annotations)?;
        attributes.extend(self.annotation_attributes(&annotations)?);

        Ok(MemberInfo {
            access,
            name_index,
            descriptor_index,
            attributes,
        })
    }

    /// Assemble the class and encode it.
    ///
    /// # Errors
    /// Returns the first error raised by any builder step.
    pub fn build(self) -> Result<Vec<u8>> {
        self.into_class()?.to_bytes()
    }

    /// Assemble the class without encoding it.
    ///
    /// # Errors
    /// Returns the first error raised by any builder step.
    pub fn into_class(mut self) -> Result<ClassFile> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        let this_class = self.pool.add_class(&self.name)?;
        let super_class = match &self.super_name {
            Some(super_name) => self.pool.add_class(super_name)?,
            None => 0,
        };

        let mut attributes = Vec::new();
        let class_annotations = std::mem::take(&mut self.class_annotations);
        attributes.extend(self.annotation_attributes(&class_annotations)?);

        if !self.inner_classes.is_empty() {
            let mut entries = Vec::with_capacity(self.inner_classes.len());
            for (inner, outer, simple_name, access) in &self.inner_classes {
                entries.push(InnerClassEntry {
                    inner_class_info_index: self.pool.add_class(inner)?,
                    outer_class_info_index: match outer {
                        Some(outer) => self.pool.add_class(outer)?,
                        None => 0,
                    },
                    inner_name_index: match simple_name {
                        Some(simple_name) => self.pool.add_utf8(simple_name)?,
                        None => 0,
                    },
                    inner_class_access_flags: *access,
                });
            }
            attributes.push(Attribute {
                name_index: self.pool.add_utf8(INNER_CLASSES)?,
                info: write_inner_classes(&entries)?,
            });
        }

        if let Some((owner, method)) = &self.enclosing {
            let class_index = self.pool.add_class(owner)?;
            let method_index = match method {
                Some((name, descriptor)) => self.pool.add_name_and_type(name, descriptor)?,
                None => 0,
            };
            let mut info = class_index.to_be_bytes().to_vec();
            info.extend_from_slice(&method_index.to_be_bytes());
            attributes.push(Attribute {
                name_index: self.pool.add_utf8(ENCLOSING_METHOD)?,
                info,
            });
        }

        if !self.bootstrap.is_empty() {
            attributes.push(Attribute {
                name_index: self.pool.add_utf8(BOOTSTRAP_METHODS)?,
                info: write_bootstrap_methods(&self.bootstrap)?,
            });
        }

        Ok(ClassFile {
            minor_version: 0,
            major_version: 52,
            constant_pool: self.pool,
            access: self.access,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: self.fields,
            methods: self.methods,
            attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{attributes::parse_inner_classes, opcodes::instructions};

    #[test]
    fn test_builder_methods_and_annotations() {
        let class = ClassBuilder::new("x/Y")
            .class_annotation("Lx/Marker;")
            .method_annotated(AccessFlags::STATIC, "f", "(JI)I", &["Lx/Stub;"], |code| {
                code.iconst(7);
                code.op(op::IRETURN);
                Ok(())
            })
            .into_class()
            .unwrap();

        let method = &class.methods[0];
        let code_attr = Attribute::find(&method.attributes, &class.constant_pool, CODE)
            .unwrap()
            .unwrap();
        let code = CodeAttribute::parse(&code_attr.info).unwrap();
        assert_eq!(code.max_locals, 3);
        assert_eq!(code.code, vec![op::BIPUSH, 7, op::IRETURN]);

        let annotations = class.annotations_of(&method.attributes).unwrap();
        assert_eq!(annotations[0].descriptor(&class.constant_pool).unwrap(), "Lx/Stub;");
        let class_annotations = class.annotations_of(&class.attributes).unwrap();
        assert_eq!(class_annotations.len(), 1);
    }

    #[test]
    fn test_builder_inner_classes_and_indy() {
        let class = ClassBuilder::new("x/Y")
            .inner_class("x/Y$Z", Some("x/Y"), Some("Z"), 0x19)
            .method(AccessFlags::PUBLIC, "g", "()V", |code| {
                code.invokedynamic(
                    ("java/lang/invoke/LambdaMetafactory", "metafactory", "()V"),
                    &[("x/Y", "lambda$g$0", "()V")],
                    "run",
                    "()Ljava/lang/Runnable;",
                )?;
                code.op(op::POP);
                code.return_void();
                Ok(())
            })
            .into_class()
            .unwrap();

        let inner = class.attribute(INNER_CLASSES).unwrap().unwrap();
        let entries = parse_inner_classes(&inner.info).unwrap();
        assert_eq!(class.constant_pool.class_name(entries[0].inner_class_info_index).unwrap(), "x/Y$Z");
        assert!(class.attribute(BOOTSTRAP_METHODS).unwrap().is_some());

        let code_attr = Attribute::find(&class.methods[0].attributes, &class.constant_pool, CODE)
            .unwrap()
            .unwrap();
        let code = CodeAttribute::parse(&code_attr.info).unwrap();
        assert_eq!(instructions(&code.code).unwrap().len(), 3);
    }

    #[test]
    fn test_builder_reports_first_error() {
        let result = ClassBuilder::new("x/Y")
            .method(AccessFlags::PUBLIC, "bad", "(", |_| Ok(()))
            .build();
        assert!(result.is_err());
    }
}
