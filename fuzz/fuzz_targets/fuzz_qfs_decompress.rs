#![no_main]
use libfuzzer_sys::fuzz_target;
use sc4_dbpf::core::compression::{compress, decompress, declared_size};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as a stored payload
    if let Ok(size) = declared_size(data) {
        let _ = decompress(data, size.min(1 << 20));
    }

    // Arbitrary bytes as plain data must survive a round trip
    let packed = compress(data);
    assert_eq!(decompress(&packed, data.len()).unwrap(), data);
});
