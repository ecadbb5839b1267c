#![no_main]

use dexcomp_dex::parse;
use dexcomp_pool::ItemPool;
use libfuzzer_sys::fuzz_target;

// Feeds whatever code items a parsed dex yields straight into the IR
// builder, so a malformed-but-parseable code item can't panic the
// builder even if it can't produce a sensible program.
fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }

    let pool = ItemPool::new();
    let Ok(parsed) = parse(data, &pool) else { return };

    for class in &parsed.classes {
        for method in class.all_methods() {
            let Some(code) = method.code.as_ref().and_then(|c| c.as_dex()) else { continue };
            let is_static = method.access_flags.is_static();
            let _ = dexcomp_ir::build_from_dex_code(&method.reference, code, is_static, &parsed.tables);
        }
    }
});
