#![no_main]

use jarfilter::kotlin::document::MetadataDocument;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // First byte splits the input into the d1 payload and the string table.
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let split = usize::from(split).min(rest.len());
    let (d1, d2) = rest.split_at(split);

    let d1 = vec![String::from_utf8_lossy(d1).into_owned()];
    let d2: Vec<String> = String::from_utf8_lossy(d2)
        .split('\n')
        .map(str::to_string)
        .collect();

    if let Ok(document) = MetadataDocument::decode(&d1, &d2) {
        let _ = document.encode();
    }
});
