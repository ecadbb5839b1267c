#![no_main]

use dexcomp_dex::parse;
use dexcomp_pool::ItemPool;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // must provide at least 8 bytes
    if data.len() < 8 {
        return;
    }

    let pool = ItemPool::new();
    let _ = parse(data, &pool);
});
