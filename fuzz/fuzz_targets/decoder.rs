#![no_main]

use lanshield_packet_engine::decode;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // 패닉 없이 None 또는 이벤트를 반환해야 한다
    if let Some(event) = decode(data) {
        assert!(data.len() >= 14, "frames shorter than an ethernet header are discarded");
        assert_eq!(event.size, data.len());
    }
});
