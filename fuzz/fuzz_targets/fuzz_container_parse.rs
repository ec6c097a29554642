#![no_main]

use libfuzzer_sys::fuzz_target;
use mobi_forge::ContainerReader;

fuzz_target!(|data: &[u8]| {
    // Skip inputs too small for the PalmDB header
    if data.len() < 78 {
        return;
    }

    // Parsing should never panic
    let reader = match ContainerReader::from_bytes(data.to_vec()) {
        Ok(r) => r,
        Err(_) => return, // Expected for invalid data
    };

    // Walk every record - should never panic
    for index in 0..reader.record_count() {
        let _ = reader.record(index);
    }

    let _ = reader.title();
    let _ = reader.text();
    let _ = reader.images();
    let _ = reader.cover_image();
    let _ = reader.has_eof_marker();
    let _ = reader.field("author");
});
