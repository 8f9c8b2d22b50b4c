use criterion::{black_box, criterion_group, criterion_main, Criterion};
use swarm_checkpoint::{Checkpoint, CheckpointStore, InMemoryCheckpointStore};

fn sample(step: u64) -> Checkpoint {
    Checkpoint::new(
        "bench-thread",
        "bench-run",
        format!("chk-{step}"),
        step,
        vec![("a".to_string(), "json/v1".to_string(), b"1".to_vec())],
    )
}

fn checkpoint_encode_benchmark(c: &mut Criterion) {
    let checkpoint = sample(0);
    c.bench_function("checkpoint encode", |b| {
        b.iter(|| black_box(checkpoint.encode().unwrap()));
    });
}

fn checkpoint_decode_benchmark(c: &mut Criterion) {
    let encoded = sample(0).encode().unwrap();
    c.bench_function("checkpoint decode", |b| {
        b.iter(|| black_box(Checkpoint::decode(&encoded).unwrap()));
    });
}

fn checkpoint_save_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("checkpoint save", |b| {
        b.to_async(&runtime).iter(|| async {
            let store = InMemoryCheckpointStore::new();
            store.save(black_box(sample(0))).await.unwrap();
        });
    });
}

fn checkpoint_load_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("checkpoint load", |b| {
        b.to_async(&runtime).iter(|| async {
            let store = InMemoryCheckpointStore::new();
            store.save(sample(0)).await.unwrap();
            store.load_latest(black_box("bench-thread")).await.unwrap();
        });
    });
}

criterion_group!(
    benches,
    checkpoint_encode_benchmark,
    checkpoint_decode_benchmark,
    checkpoint_save_benchmark,
    checkpoint_load_benchmark
);
criterion_main!(benches);
