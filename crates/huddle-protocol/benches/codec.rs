//! Codec benchmarks for huddle-protocol.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use huddle_protocol::{codec, BusEvent, ChatMessage, ServerEvent};

fn bench_encode_message(c: &mut Criterion) {
    let event = ServerEvent::message(ChatMessage::new("bob", "x".repeat(64)));

    let mut group = c.benchmark_group("encode_server");
    group.throughput(Throughput::Bytes(64));
    group.bench_function("message_64B", |b| {
        b.iter(|| codec::encode_server(black_box(&event)))
    });
    group.finish();
}

fn bench_encode_roster(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_roster");
    for size in [10usize, 100, 1000] {
        let event = ServerEvent::roster((0..size).map(|i| format!("User-{i:08x}")));
        group.bench_with_input(BenchmarkId::from_parameter(size), &event, |b, event| {
            b.iter(|| codec::encode_server(black_box(event)))
        });
    }
    group.finish();
}

fn bench_bus_roundtrip(c: &mut Criterion) {
    let event = BusEvent::message("bob", "x".repeat(256));

    c.bench_function("bus_roundtrip_256B", |b| {
        b.iter(|| {
            let encoded = codec::encode_bus(black_box(&event)).unwrap();
            codec::decode_bus(black_box(&encoded)).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_encode_message,
    bench_encode_roster,
    bench_bus_roundtrip
);
criterion_main!(benches);
