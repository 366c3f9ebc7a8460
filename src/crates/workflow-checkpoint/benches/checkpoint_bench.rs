use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::HashMap;
use workflow_checkpoint::{CheckpointMetadata, CheckpointStorage, InMemoryCheckpointStorage, WorkflowCheckpoint};

fn checkpoint_save_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("checkpoint save", |b| {
        b.to_async(&runtime).iter(|| async {
            let storage = InMemoryCheckpointStorage::new();
            let checkpoint = WorkflowCheckpoint::new(
                "bench-workflow",
                HashMap::new(),
                HashMap::new(),
                HashMap::new(),
                0,
                100,
                CheckpointMetadata::initial(),
            );

            storage.save_checkpoint(black_box(checkpoint)).await.unwrap();
        });
    });
}

fn checkpoint_load_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("checkpoint load", |b| {
        b.to_async(&runtime).iter(|| async {
            let storage = InMemoryCheckpointStorage::new();
            let checkpoint = WorkflowCheckpoint::new(
                "bench-workflow",
                HashMap::new(),
                HashMap::new(),
                HashMap::new(),
                0,
                100,
                CheckpointMetadata::initial(),
            );

            let id = storage.save_checkpoint(checkpoint).await.unwrap();
            storage.load_checkpoint(black_box(&id)).await.unwrap();
        });
    });
}

criterion_group!(benches, checkpoint_save_benchmark, checkpoint_load_benchmark);
criterion_main!(benches);
