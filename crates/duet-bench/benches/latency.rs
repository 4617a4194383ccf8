//! Latency benchmarks for Duet.
//!
//! These benchmarks focus on single-operation latency on the hot paths.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use duet_core::{Outbox, Payload, RoomRegistry};
use duet_protocol::{codec, RejectReason, ServerFrame};
use std::sync::Arc;
use std::time::Instant;

/// Benchmark one message from sender to the peer's outbox receiver.
fn bench_pair_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("pair_latency");

    group.bench_function("envelope_and_deliver", |b| {
        b.iter_custom(|iters| {
            let registry = RoomRegistry::new();
            let (a, _rx_a) = Outbox::channel();
            let (peer, mut rx_b) = Outbox::channel();
            let ha = registry.admit("pair", a).unwrap();
            registry.admit("pair", peer).unwrap();

            let start = Instant::now();
            for _ in 0..iters {
                let envelope: Payload = Arc::from(codec::relay_envelope(r#"{"text":"hi"}"#).unwrap());
                for outbox in registry.peers_of(&ha) {
                    outbox.deliver(Arc::clone(&envelope));
                }
                let _ = rx_b.try_recv();
            }
            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmark refusing a third member.
fn bench_room_full(c: &mut Criterion) {
    let registry = RoomRegistry::new();
    let (a, _rx_a) = Outbox::channel();
    let (b, _rx_b) = Outbox::channel();
    let (extra, _rx_c) = Outbox::channel();
    registry.admit("full", a).unwrap();
    registry.admit("full", b).unwrap();

    c.bench_function("admit_room_full", |bench| {
        bench.iter(|| registry.admit(black_box("full"), extra.clone()).is_err())
    });
}

/// Benchmark building rejection frames.
fn bench_rejection_frame(c: &mut Criterion) {
    c.bench_function("encode_rejection", |b| {
        b.iter(|| codec::encode(&ServerFrame::rejection(black_box(RejectReason::RoomFull))))
    });
}

criterion_group!(
    benches,
    bench_pair_latency,
    bench_room_full,
    bench_rejection_frame,
);
criterion_main!(benches);
