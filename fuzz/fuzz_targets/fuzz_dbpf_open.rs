#![no_main]
use libfuzzer_sys::fuzz_target;
use sc4_dbpf::core::subfile::DIRECTORY_TGI;
use sc4_dbpf::Dbpf;

fuzz_target!(|data: &[u8]| {
    let mut dbpf = match Dbpf::from_bytes(data) {
        Ok(dbpf) => dbpf,
        Err(_) => return,
    };

    for entry in dbpf.entries_mut() {
        if entry.tgi() != DIRECTORY_TGI {
            let _ = entry.read();
        }
    }

    // Anything that loads must save and load again
    if let Ok(bytes) = dbpf.to_bytes() {
        assert!(Dbpf::from_bytes(&bytes).is_ok());
    }
});
