//! 디스패처 제출 벤치마크
//!
//! 매번 새 키로 수락되는 경로와 같은 키로 억제되는 경로를 나눠 측정합니다.

use std::sync::atomic::{AtomicU64, Ordering};

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use lanshield_alert_dispatcher::AlertDispatcher;
use lanshield_core::config::DispatcherConfig;
use lanshield_core::types::{Alert, AlertType, MacAddr, Severity};

fn alert_for(n: u64) -> Alert {
    let b = n.to_be_bytes();
    Alert::new(AlertType::PortScan, Severity::High, "Port scan", "probe")
        .with_source_mac(MacAddr::new([0x02, b[3], b[4], b[5], b[6], b[7]]))
}

fn bench_submit(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatcher_submit");
    group.throughput(Throughput::Elements(1));

    let dispatcher = AlertDispatcher::new(DispatcherConfig::default()).unwrap();
    dispatcher.subscribe("sink", |alert| {
        black_box(alert);
    });
    let counter = AtomicU64::new(0);
    group.bench_function("accepted", |b| {
        b.iter(|| {
            let n = counter.fetch_add(1, Ordering::Relaxed);
            dispatcher.submit(black_box(alert_for(n)))
        })
    });

    let dispatcher = AlertDispatcher::new(DispatcherConfig::default()).unwrap();
    dispatcher.submit(alert_for(0));
    group.bench_function("suppressed", |b| {
        b.iter(|| dispatcher.submit(black_box(alert_for(0))))
    });

    group.finish();
}

criterion_group!(benches, bench_submit);
criterion_main!(benches);
