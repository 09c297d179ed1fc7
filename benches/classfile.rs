//! Benchmarks for class file processing.
//!
//! Measures the hot paths of a filter run on synthetic classes:
//! - Decoding and encoding a class file
//! - Filtering a class with deleted, stubbed and calling methods
//! - Decoding Kotlin metadata

extern crate jarfilter;

use criterion::{criterion_group, criterion_main, Criterion};
use jarfilter::{
    classfile::{access::AccessFlags, builder::ClassBuilder, opcodes::{op, MethodCall}},
    kotlin::{
        document::{encode_document, MetadataDocument},
        fields,
        protobuf::RawMessage,
        strings::StringTableTypes,
    },
    AnnotationSets, ClassFile, ClassFilter, UnwantedRegistry,
};
use std::hint::black_box;

/// A class with `count` plain methods, every tenth deleted and every tenth stubbed, and a
/// caller of each deleted method.
fn sample_class(count: usize) -> Vec<u8> {
    let mut builder = ClassBuilder::new("bench/Sample").field(AccessFlags::PRIVATE, "value", "I");
    for i in 0..count {
        let name = format!("method{i}");
        let marks: &[&str] = match i % 10 {
            0 => &["Lbench/Delete;"],
            5 => &["Lbench/Stub;"],
            _ => &[],
        };
        builder = builder.method_annotated(AccessFlags::PUBLIC, &name, "()I", marks, |code| {
            code.iconst(1);
            code.op(op::IRETURN);
            Ok(())
        });
        if i % 10 == 0 {
            let callee = name.clone();
            builder = builder.method(AccessFlags::PUBLIC, &format!("caller{i}"), "()V", |code| {
                code.aload(0);
                code.invoke(MethodCall::InvokeVirtual, "bench/Sample", &callee, "()I")?;
                code.op(op::POP);
                code.return_void();
                Ok(())
            });
        }
    }
    builder.build().unwrap()
}

fn bench_parse(c: &mut Criterion) {
    let data = sample_class(200);

    c.bench_function("classfile_parse", |b| {
        b.iter(|| {
            let class = ClassFile::parse(black_box(&data)).unwrap();
            black_box(class)
        });
    });
}

fn bench_roundtrip(c: &mut Criterion) {
    let class = ClassFile::parse(&sample_class(200)).unwrap();

    c.bench_function("classfile_to_bytes", |b| {
        b.iter(|| {
            let bytes = black_box(&class).to_bytes().unwrap();
            black_box(bytes)
        });
    });
}

fn bench_filter(c: &mut Criterion) {
    let data = sample_class(200);
    let annotations = AnnotationSets::new()
        .with_delete(["bench.Delete"])
        .with_stub(["bench.Stub"]);

    c.bench_function("class_filter", |b| {
        b.iter(|| {
            let registry = UnwantedRegistry::new();
            let outcome = ClassFilter::new(&annotations, &registry)
                .filter(black_box(&data))
                .unwrap();
            black_box(outcome)
        });
    });
}

fn bench_metadata_decode(c: &mut Criterion) {
    let d2: Vec<String> = (0..100).flat_map(|i| [format!("fun{i}"), "()V".to_string()]).collect();
    let mut message = RawMessage::new();
    for i in 0..100 {
        let signature = RawMessage::new()
            .with_int32(fields::SIGNATURE_NAME, i * 2)
            .with_int32(fields::SIGNATURE_DESC, i * 2 + 1);
        let function = RawMessage::new()
            .with_int32(fields::FUNCTION_NAME, i * 2)
            .with_message(fields::JVM_SIGNATURE, &signature);
        message.push_message(fields::CLASS_FUNCTION, &function);
    }
    let d1 = encode_document(&StringTableTypes::default(), &message);

    c.bench_function("metadata_decode", |b| {
        b.iter(|| {
            let document = MetadataDocument::decode(black_box(&d1), black_box(&d2)).unwrap();
            black_box(document)
        });
    });
}

criterion_group!(
    benches,
    bench_parse,
    bench_roundtrip,
    bench_filter,
    bench_metadata_decode
);
criterion_main!(benches);
