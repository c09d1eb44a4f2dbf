#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding must not panic on any input.
    if let Ok(decoded) = covtrend::decode::decode([data]) {
        for id in decoded.tree.walk() {
            let _ = decoded.tree.path(id);
        }
    }
});
