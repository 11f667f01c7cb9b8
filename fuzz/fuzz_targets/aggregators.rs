#![no_main]

use arbitrary::Arbitrary;
use chrono::{DateTime, Duration, Utc};
use libfuzzer_sys::fuzz_target;

use lanshield_core::config::{BandwidthConfig, TelemetryConfig};
use lanshield_packet_engine::PacketDecoder;
use lanshield_telemetry::{BandwidthAggregator, TrafficTelemetry};

/// 퍼저용 구조적 입력: 프레임과 프레임 사이 경과 시간(초)
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    frames: Vec<(Vec<u8>, u16)>,
}

fuzz_target!(|input: FuzzInput| {
    let decoder = PacketDecoder::new();
    let Ok(telemetry) = TrafficTelemetry::new(TelemetryConfig::default()) else {
        return;
    };
    let bandwidth = BandwidthAggregator::new(BandwidthConfig::default());

    let mut now = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default();
    for (frame, gap) in input.frames.iter().take(256) {
        now += Duration::seconds(i64::from(*gap));
        let Some(event) = decoder.decode_at(frame, now) else {
            continue;
        };
        telemetry.record_packet(&event);
        bandwidth.record_packet(&event);
        telemetry.tick(now);
    }

    let _ = bandwidth.evaluate(now);
    telemetry.cleanup(now);
    bandwidth.cleanup(now);

    let health = telemetry.network_health_at(now);
    assert!(health.score <= 100);
    let total: f64 = telemetry.protocol_breakdown().iter().map(|p| p.percentage).sum();
    assert!(total <= 100.0 + 1e-6);
});
