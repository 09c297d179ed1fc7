#![no_main]

use jarfilter::{AnnotationSets, ClassFile, ClassFilter, UnwantedRegistry};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if ClassFile::parse(data).is_err() {
        return;
    }

    let annotations = AnnotationSets::new()
        .with_delete(["fuzz.Delete"])
        .with_stub(["fuzz.Stub"])
        .with_strip(["fuzz.Strip"]);
    let registry = UnwantedRegistry::new();
    let _ = ClassFilter::new(&annotations, &registry).filter(data);
});
