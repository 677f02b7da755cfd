#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = binsai_config::load_toml(data) {
        if cfg.validate().is_ok() {
            // A valid config must survive a write/read cycle.
            let text = binsai_config::to_toml(&cfg).expect("serialize valid config");
            let back = binsai_config::load_toml(&text).expect("reparse serialized config");
            assert!(back.validate().is_ok());
        }
    }
});
