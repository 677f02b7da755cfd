#![no_main]
use libfuzzer_sys::fuzz_target;

// Input is `key=value`, as typed at `binsai config set`.
fuzz_target!(|data: &str| {
    let Some((key, value)) = data.split_once('=') else {
        return;
    };
    let mut cfg = binsai_config::Config::default();
    if binsai_config::store::set_from_str(&mut cfg, key, value).is_ok() {
        let _ = cfg.validate();
    }
});
