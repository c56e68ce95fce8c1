//! Codec and channel expansion benchmarks for bayeux-protocol.

use bayeux_protocol::{channel, codec, Message};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use serde_json::json;

fn sample_batch(n: usize) -> Vec<Message> {
    (0..n)
        .map(|i| {
            Message::publish("/chat/lobby", json!({"user": "bench", "seq": i}))
                .with_client_id("client-1")
                .with_id(i.to_string())
        })
        .collect()
}

fn bench_encode_batch(c: &mut Criterion) {
    let batch = sample_batch(16);

    c.bench_function("encode_batch_16", |b| {
        b.iter(|| codec::encode(black_box(&batch)))
    });
}

fn bench_decode_batch(c: &mut Criterion) {
    let encoded = codec::encode(&sample_batch(16)).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("batch_16", |b| b.iter(|| codec::decode(black_box(&encoded))));
    group.finish();
}

fn bench_expand(c: &mut Criterion) {
    c.bench_function("expand_depth_4", |b| {
        b.iter(|| channel::expand(black_box("/a/b/c/d")))
    });
}

criterion_group!(benches, bench_encode_batch, bench_decode_batch, bench_expand);
criterion_main!(benches);
