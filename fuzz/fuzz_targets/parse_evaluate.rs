#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(parsed) = abacus::parse(s) {
            let context = abacus::EvaluationContext::new()
                .with("$1", 1)
                .with("$2", "text");
            let _ = abacus::evaluate(&parsed, &context, &abacus::NumericPolicy::default());
        }
    }
});
