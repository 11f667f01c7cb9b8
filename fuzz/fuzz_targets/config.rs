#![no_main]

use lanshield_core::config::LanshieldConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // 파싱과 검증 모두 Ok 또는 Err만 반환해야 한다
    if let Ok(config) = LanshieldConfig::parse(text) {
        let _ = config.validate();
    }
});
