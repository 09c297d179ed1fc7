//! Integration tests for filtering whole archives.
//!
//! Every test assembles its classes with the [`ClassBuilder`], packs them into an
//! in-memory archive and runs the [`JarFilter`] over it.

mod common;

use common::{
    entry, field_names, jar, method_code, method_signatures, unjar, DELETE, STRIP, STUB,
};
use jarfilter::{
    classfile::{
        opcodes::{op, FieldAccess, MethodCall},
        ClassFile,
    },
    kotlin::{
        document::{encode_document, MetadataDocument},
        fields,
        protobuf::RawMessage,
        strings::StringTableTypes,
        KotlinMetadata, MetadataKind,
    },
    prelude::*,
};

fn config() -> FilterConfig {
    FilterConfig::new()
        .with_delete(["test.DeleteMe"])
        .with_stub(["test.StubMeOut"])
        .with_strip(["test.StripMe"])
}

fn void_body(code: &mut jarfilter::classfile::builder::CodeBuilder<'_>) -> Result<()> {
    code.return_void();
    Ok(())
}

fn library_class() -> Result<Vec<u8>> {
    ClassBuilder::new("test/A")
        .method_annotated(AccessFlags::PUBLIC | AccessFlags::STATIC, "bar", "()V", &[DELETE], void_body)
        .method(AccessFlags::PUBLIC | AccessFlags::STATIC, "baz", "()V", void_body)
        .build()
}

fn caller_class() -> Result<Vec<u8>> {
    ClassBuilder::new("test/B")
        .method(AccessFlags::PUBLIC | AccessFlags::STATIC, "qux", "()V", |code| {
            code.invoke(MethodCall::InvokeStatic, "test/A", "bar", "()V")?;
            code.return_void();
            Ok(())
        })
        .method(AccessFlags::PUBLIC | AccessFlags::STATIC, "keep", "()V", |code| {
            code.invoke(MethodCall::InvokeStatic, "test/A", "baz", "()V")?;
            code.return_void();
            Ok(())
        })
        .build()
}

/// The caller comes first in the archive, so its deletion can only be discovered on the
/// pass after the library method disappears, and the third pass confirms convergence.
#[test]
fn test_cascading_deletion_across_classes() -> Result<()> {
    let input = jar(&[
        ("test/B.class", caller_class()?),
        ("test/A.class", library_class()?),
    ])?;

    let (output, report) = JarFilter::new(config())?.filter_bytes(&input)?;
    assert_eq!(report.passes, 3);
    assert!(report.converged);
    assert_eq!(report.deleted_methods, 2);
    assert!(report.modified_classes.contains("test/A"));
    assert!(report.modified_classes.contains("test/B"));

    let entries = unjar(&output)?;
    let a = entry(&entries, "test/A.class").unwrap();
    let b = entry(&entries, "test/B.class").unwrap();
    assert_eq!(method_signatures(a)?, vec!["baz()V"]);
    assert_eq!(method_signatures(b)?, vec!["keep()V"]);
    Ok(())
}

#[test]
fn test_cascading_deletion_parallel() -> Result<()> {
    let input = jar(&[
        ("test/B.class", caller_class()?),
        ("test/A.class", library_class()?),
    ])?;

    let sequential = JarFilter::new(config())?.filter_bytes(&input)?;
    let parallel = JarFilter::new(config().with_parallel(true))?.filter_bytes(&input)?;
    assert_eq!(unjar(&sequential.0)?, unjar(&parallel.0)?);
    assert_eq!(sequential.1.deleted_methods, parallel.1.deleted_methods);
    Ok(())
}

/// With the library first, a sequential pass deletes the caller right away. Parallel classes
/// only see deletions of earlier passes, so the caller waits for the second pass.
#[test]
fn test_parallel_passes_see_only_earlier_passes() -> Result<()> {
    let input = jar(&[
        ("test/A.class", library_class()?),
        ("test/B.class", caller_class()?),
    ])?;

    let (sequential, sequential_report) = JarFilter::new(config())?.filter_bytes(&input)?;
    assert_eq!(sequential_report.passes, 2);

    let filter = JarFilter::new(config().with_parallel(true))?;
    let (parallel, parallel_report) = filter.filter_bytes(&input)?;
    assert_eq!(parallel_report.passes, 3);
    assert!(parallel_report.converged);
    assert_eq!(parallel_report.deleted_methods, sequential_report.deleted_methods);
    assert_eq!(unjar(&parallel)?, unjar(&sequential)?);

    for _ in 0..4 {
        let (again, report) = filter.filter_bytes(&input)?;
        assert_eq!(again, parallel);
        assert_eq!(report, parallel_report);
    }
    Ok(())
}

#[test]
fn test_filtering_is_idempotent() -> Result<()> {
    let input = jar(&[
        ("META-INF/", Vec::new()),
        ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\r\n".to_vec()),
        ("test/B.class", caller_class()?),
        ("test/A.class", library_class()?),
    ])?;
    let filter = JarFilter::new(config())?;

    let (first, _) = filter.filter_bytes(&input)?;
    let (second, report) = filter.filter_bytes(&first)?;

    assert_eq!(report.passes, 1);
    assert!(report.converged);
    assert!(report.modified_classes.is_empty());
    assert!(report.deleted_classes.is_empty());
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_untouched_entries_round_trip() -> Result<()> {
    let plain = ClassBuilder::new("test/Plain")
        .field(AccessFlags::PRIVATE, "value", "J")
        .method(AccessFlags::PUBLIC, "run", "()V", void_body)
        .build()?;
    let resource = b"key=value\n".to_vec();
    // Module descriptors are never parsed.
    let module_info = b"not a class".to_vec();

    let input = jar(&[
        ("test/Plain.class", plain.clone()),
        ("test/messages.properties", resource.clone()),
        ("module-info.class", module_info.clone()),
    ])?;
    let (output, report) = JarFilter::new(config())?.filter_bytes(&input)?;

    assert_eq!(report.passes, 1);
    let entries = unjar(&output)?;
    assert_eq!(entries.len(), 3);
    assert_eq!(entry(&entries, "test/Plain.class"), Some(plain.as_slice()));
    assert_eq!(entry(&entries, "test/messages.properties"), Some(resource.as_slice()));
    assert_eq!(entry(&entries, "module-info.class"), Some(module_info.as_slice()));
    Ok(())
}

#[test]
fn test_deleted_class_and_its_users() -> Result<()> {
    let gone = ClassBuilder::new("test/Gone")
        .class_annotation(DELETE)
        .method(AccessFlags::PUBLIC | AccessFlags::STATIC, "make", "()V", void_body)
        .build()?;
    let user = ClassBuilder::new("test/User")
        .method(AccessFlags::PUBLIC | AccessFlags::STATIC, "use", "()V", |code| {
            code.invoke(MethodCall::InvokeStatic, "test/Gone", "make", "()V")?;
            code.return_void();
            Ok(())
        })
        .method(AccessFlags::PUBLIC | AccessFlags::STATIC, "other", "()V", void_body)
        .build()?;

    let input = jar(&[("test/User.class", user), ("test/Gone.class", gone)])?;
    let (output, report) = JarFilter::new(config())?.filter_bytes(&input)?;

    assert_eq!(report.deleted_classes, vec!["test/Gone".to_string()]);
    let entries = unjar(&output)?;
    assert!(entry(&entries, "test/Gone.class").is_none());
    let user = entry(&entries, "test/User.class").unwrap();
    assert_eq!(method_signatures(user)?, vec!["other()V"]);
    Ok(())
}

#[test]
fn test_constructor_field_initialiser_is_patched() -> Result<()> {
    let class = ClassBuilder::new("test/Counter")
        .field_annotated(AccessFlags::PRIVATE, "count", "I", &[DELETE])
        .method(AccessFlags::PUBLIC, "<init>", "()V", |code| {
            code.aload(0);
            code.invoke(MethodCall::InvokeSpecial, "java/lang/Object", "<init>", "()V")?;
            code.aload(0);
            code.iconst(1);
            code.field(FieldAccess::PutField, "test/Counter", "count", "I")?;
            code.return_void();
            Ok(())
        })
        .method(AccessFlags::PUBLIC, "getCount", "()I", |code| {
            code.aload(0);
            code.field(FieldAccess::GetField, "test/Counter", "count", "I")?;
            code.op(op::IRETURN);
            Ok(())
        })
        .build()?;
    let before = method_code(&class, "<init>")?.unwrap();

    let input = jar(&[("test/Counter.class", class)])?;
    let (output, _) = JarFilter::new(config())?.filter_bytes(&input)?;
    let entries = unjar(&output)?;
    let counter = entry(&entries, "test/Counter.class").unwrap();

    assert!(field_names(counter)?.is_empty());
    assert_eq!(method_signatures(counter)?, vec!["<init>()V"]);

    let after = method_code(counter, "<init>")?.unwrap();
    assert_eq!(after.code.len(), before.code.len());
    // aload_0, invokespecial #n, aload_0, iconst_1 are untouched
    assert_eq!(after.code[..6], before.code[..6]);
    assert_eq!(after.code[6..9], [op::POP, op::POP, op::NOP]);
    assert_eq!(after.code[9], op::RETURN);
    Ok(())
}

#[test]
fn test_stubbed_method_body() -> Result<()> {
    let class = ClassBuilder::new("test/Service")
        .method_annotated(AccessFlags::PUBLIC, "compute", "(I)I", &[STUB, STRIP], |code| {
            code.iconst(2);
            code.op(op::IRETURN);
            Ok(())
        })
        .method_annotated(AccessFlags::PUBLIC, "log", "()V", &[STUB], |code| {
            code.aload(0);
            code.op(op::POP);
            code.return_void();
            Ok(())
        })
        .build()?;

    let input = jar(&[("test/Service.class", class)])?;
    let (output, report) = JarFilter::new(config())?.filter_bytes(&input)?;
    assert_eq!(report.stubbed_methods, 2);

    let entries = unjar(&output)?;
    let service = entry(&entries, "test/Service.class").unwrap();
    assert_eq!(method_signatures(service)?, vec!["compute(I)I", "log()V"]);

    let log = method_code(service, "log")?.unwrap();
    assert_eq!(log.code, vec![op::RETURN]);

    let compute = method_code(service, "compute")?.unwrap();
    assert_eq!(compute.code[0], op::NEW);
    assert_eq!(*compute.code.last().unwrap(), op::ATHROW);
    assert_eq!(compute.max_locals, 2);

    let parsed = ClassFile::parse(service)?;
    for method in &parsed.methods {
        assert!(parsed.annotations_of(&method.attributes)?.is_empty());
    }
    Ok(())
}

// --- Kotlin metadata ---------------------------------------------------------------------

const STRINGS: [&str; 8] = ["count", "I", "getCount", "()I", "setCount", "(I)V", "work", "()V"];

fn index(value: &str) -> i32 {
    STRINGS.iter().position(|s| *s == value).unwrap() as i32
}

fn signature(name: &str, desc: &str) -> RawMessage {
    RawMessage::new()
        .with_int32(fields::SIGNATURE_NAME, index(name))
        .with_int32(fields::SIGNATURE_DESC, index(desc))
}

fn kotlin_class(annotations: &[&str]) -> Result<Vec<u8>> {
    let property_signature = RawMessage::new()
        .with_message(fields::PROPERTY_SIGNATURE_FIELD, &signature("count", "I"))
        .with_message(fields::PROPERTY_SIGNATURE_GETTER, &signature("getCount", "()I"))
        .with_message(fields::PROPERTY_SIGNATURE_SETTER, &signature("setCount", "(I)V"));
    let property = RawMessage::new()
        .with_int32(fields::PROPERTY_NAME, index("count"))
        .with_message(fields::JVM_SIGNATURE, &property_signature);
    let function = RawMessage::new()
        .with_int32(fields::FUNCTION_NAME, index("work"))
        .with_message(fields::JVM_SIGNATURE, &signature("work", "()V"));
    let message = RawMessage::new()
        .with_message(fields::CLASS_PROPERTY, &property)
        .with_message(fields::CLASS_FUNCTION, &function);

    let d1 = encode_document(&StringTableTypes::default(), &message);
    let d2: Vec<String> = STRINGS.iter().map(|s| s.to_string()).collect();

    ClassBuilder::new("test/Holder")
        .kotlin_metadata(MetadataKind::Class as i32, &d1, &d2)
        .field(AccessFlags::PRIVATE, "count", "I")
        .method_annotated(AccessFlags::PUBLIC, "getCount", "()I", &[DELETE], |code| {
            code.aload(0);
            code.field(FieldAccess::GetField, "test/Holder", "count", "I")?;
            code.op(op::IRETURN);
            Ok(())
        })
        .method_annotated(AccessFlags::PUBLIC, "work", "()V", annotations, void_body)
        .build()
}

fn metadata_of(class: &[u8]) -> Result<RawMessage> {
    let class = ClassFile::parse(class)?;
    let metadata = KotlinMetadata::read(&class)?.unwrap();
    Ok(MetadataDocument::decode(&metadata.d1, &metadata.d2)?.message)
}

#[test]
fn test_metadata_follows_bytecode() -> Result<()> {
    let input = jar(&[("test/Holder.class", kotlin_class(&[])?)])?;
    let (output, report) = JarFilter::new(config())?.filter_bytes(&input)?;
    assert!(report.converged);

    let entries = unjar(&output)?;
    let holder = entry(&entries, "test/Holder.class").unwrap();
    assert_eq!(method_signatures(holder)?, vec!["work()V"]);
    // The backing field goes together with its property.
    assert!(field_names(holder)?.is_empty());

    let message = metadata_of(holder)?;
    assert!(message.messages(fields::CLASS_PROPERTY)?.is_empty());
    assert_eq!(message.messages(fields::CLASS_FUNCTION)?.len(), 1);
    Ok(())
}

/// The setter named by the metadata never existed; inferring it must not leave a
/// permanent deletion behind.
#[test]
fn test_inferred_members_expire() -> Result<()> {
    let input = jar(&[("test/Holder.class", kotlin_class(&[])?)])?;
    let (_, report) = JarFilter::new(config())?.filter_bytes(&input)?;
    assert_eq!(report.deleted_methods, 1);
    Ok(())
}

#[test]
fn test_deletion_wins_over_stub_in_metadata() -> Result<()> {
    let input = jar(&[("test/Holder.class", kotlin_class(&[STUB, DELETE])?)])?;
    let (output, report) = JarFilter::new(config())?.filter_bytes(&input)?;
    assert_eq!(report.stubbed_methods, 0);

    let entries = unjar(&output)?;
    let holder = entry(&entries, "test/Holder.class").unwrap();
    assert!(method_signatures(holder)?.is_empty());

    let message = metadata_of(holder)?;
    assert!(message.messages(fields::CLASS_FUNCTION)?.is_empty());
    assert!(message.messages(fields::CLASS_PROPERTY)?.is_empty());
    Ok(())
}

#[test]
fn test_overlapping_annotations_are_rejected() {
    let config = FilterConfig::new()
        .with_delete(["test.Mark"])
        .with_strip(["test/Mark"]);
    assert!(matches!(JarFilter::new(config), Err(Error::Config(_))));
}
