#![no_main]

use libfuzzer_sys::fuzz_target;
use mobi_forge::palmdoc::{compress, decompress, MAX_CHUNK_SIZE};

fuzz_target!(|data: &[u8]| {
    // Arbitrary streams may be rejected, but never panic
    let _ = decompress(data);

    let input = &data[..data.len().min(MAX_CHUNK_SIZE)];
    let compressed = compress(input);
    let restored = decompress(&compressed).expect("encoder output must decode");
    assert_eq!(restored, input);
});
