//! Integration tests for repairing metadata of already filtered archives.

mod common;

use common::{entry, jar, method_signatures, unjar};
use jarfilter::{
    classfile::ClassFile,
    kotlin::{
        document::{encode_document, MetadataDocument},
        fields,
        protobuf::RawMessage,
        strings::StringTableTypes,
        KotlinMetadata, MetadataKind,
    },
    prelude::*,
};

const STRINGS: [&str; 5] = ["area", "gone", "()V", "Inner", "Lost"];

fn function(name: i32) -> RawMessage {
    let signature = RawMessage::new()
        .with_int32(fields::SIGNATURE_NAME, name)
        .with_int32(fields::SIGNATURE_DESC, 2);
    RawMessage::new()
        .with_int32(fields::FUNCTION_NAME, name)
        .with_message(fields::JVM_SIGNATURE, &signature)
}

/// `test/Shape` whose metadata still describes `gone()` and a nested class `Lost`.
fn stale_shape() -> Result<Vec<u8>> {
    let mut message = RawMessage::new()
        .with_message(fields::CLASS_FUNCTION, &function(0))
        .with_message(fields::CLASS_FUNCTION, &function(1));
    message.set_int32s(fields::CLASS_NESTED_CLASS_NAME, &[3, 4]);

    let d1 = encode_document(&StringTableTypes::default(), &message);
    let d2: Vec<String> = STRINGS.iter().map(|s| s.to_string()).collect();

    ClassBuilder::new("test/Shape")
        .kotlin_metadata(MetadataKind::Class as i32, &d1, &d2)
        .inner_class("test/Shape$Inner", Some("test/Shape"), Some("Inner"), 0x0019)
        .method(AccessFlags::PUBLIC, "area", "()V", |code| {
            code.return_void();
            Ok(())
        })
        .build()
}

fn inner() -> Result<Vec<u8>> {
    ClassBuilder::new("test/Shape$Inner")
        .inner_class("test/Shape$Inner", Some("test/Shape"), Some("Inner"), 0x0019)
        .build()
}

fn metadata_of(class: &[u8]) -> Result<RawMessage> {
    let class = ClassFile::parse(class)?;
    let metadata = KotlinMetadata::read(&class)?.unwrap();
    Ok(MetadataDocument::decode(&metadata.d1, &metadata.d2)?.message)
}

#[test]
fn test_stale_declarations_are_removed() -> Result<()> {
    let notes = b"notes".to_vec();
    let input = jar(&[
        ("test/Shape.class", stale_shape()?),
        ("test/Shape$Inner.class", inner()?),
        ("notes.txt", notes.clone()),
    ])?;

    let (output, report) = MetaFixer::new(ArchiveOptions::new()).fix_bytes(&input)?;
    assert_eq!(report.fixed_classes.len(), 1);
    assert_eq!(report.removed_count(), 2);
    assert!(report.fixed_classes.contains_key("test/Shape"));

    let entries = unjar(&output)?;
    assert_eq!(entry(&entries, "notes.txt"), Some(notes.as_slice()));

    let shape = entry(&entries, "test/Shape.class").unwrap();
    // Bytecode is never touched.
    assert_eq!(method_signatures(shape)?, vec!["area()V"]);

    let message = metadata_of(shape)?;
    let functions = message.messages(fields::CLASS_FUNCTION)?;
    assert_eq!(functions.len(), 1);
    assert_eq!(functions[0].int32(fields::FUNCTION_NAME)?, Some(0));
    assert_eq!(message.int32s(fields::CLASS_NESTED_CLASS_NAME)?, vec![3]);
    Ok(())
}

/// `Shape$Inner.class` was removed by hand; the `InnerClasses` record in `Shape` remains.
#[test]
fn test_nested_class_without_class_file_is_removed() -> Result<()> {
    let input = jar(&[("test/Shape.class", stale_shape()?)])?;

    let (output, report) = MetaFixer::new(ArchiveOptions::new()).fix_bytes(&input)?;
    assert_eq!(report.removed_count(), 3);

    let entries = unjar(&output)?;
    let message = metadata_of(entry(&entries, "test/Shape.class").unwrap())?;
    assert!(message.int32s(fields::CLASS_NESTED_CLASS_NAME)?.is_empty());
    assert_eq!(message.messages(fields::CLASS_FUNCTION)?.len(), 1);
    Ok(())
}

#[test]
fn test_consistent_archive_is_unchanged() -> Result<()> {
    let input = jar(&[
        ("test/Shape$Inner.class", inner()?),
        ("test/Plain.class", ClassBuilder::new("test/Plain").build()?),
    ])?;
    let fixer = MetaFixer::new(ArchiveOptions::new());

    let (output, report) = fixer.fix_bytes(&input)?;
    assert!(report.fixed_classes.is_empty());
    assert_eq!(unjar(&output)?, unjar(&input)?);
    Ok(())
}

#[test]
fn test_repair_is_idempotent() -> Result<()> {
    let input = jar(&[
        ("test/Shape.class", stale_shape()?),
        ("test/Shape$Inner.class", inner()?),
    ])?;
    let fixer = MetaFixer::new(ArchiveOptions::new());

    let (first, _) = fixer.fix_bytes(&input)?;
    let (second, report) = fixer.fix_bytes(&first)?;
    assert!(report.fixed_classes.is_empty());
    assert_eq!(first, second);
    Ok(())
}
