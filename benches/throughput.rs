use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use boostlog::{
    client::ChannelMetadata,
    core::store::OperationStore,
    operation::{RunOutcome, TargetSnapshot},
    types::{OperationId, TargetKind},
};

fn snapshot() -> TargetSnapshot {
    TargetSnapshot::Channel(ChannelMetadata {
        name: "bench".into(),
        follower_count: 0,
    })
}

fn bench_record_attempts(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_record_attempts");
    for total in [100usize, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(total), &total, |b, &total| {
            b.iter(|| {
                let mut store = OperationStore::new();
                let id = OperationId::new();
                store
                    .create(id, TargetKind::Channel, "ID".into(), total, snapshot(), 0)
                    .expect("create");
                store.mark_processing(id).expect("processing");
                for i in 0..total {
                    if i % 7 == 0 {
                        store
                            .record_failure(id, format!("+{i}"), "rejected".into())
                            .expect("failure");
                    } else {
                        store.record_success(id, format!("+{i}")).expect("success");
                    }
                }
                store.finish(id, RunOutcome::Completed, None, 1).expect("finish");
            });
        });
    }
    group.finish();
}

fn bench_summaries_and_eviction(c: &mut Criterion) {
    c.bench_function("store_summaries_evict_5k", |b| {
        b.iter(|| {
            let mut store = OperationStore::new();
            for i in 0..5_000u64 {
                let id = OperationId::new();
                store
                    .create(id, TargetKind::Channel, "ID".into(), 1, snapshot(), i)
                    .expect("create");
                store.mark_processing(id).expect("processing");
                store.record_success(id, "+1".into()).expect("success");
                store.finish(id, RunOutcome::Completed, None, i).expect("finish");
            }
            let rows = store.summaries();
            assert_eq!(rows.len(), 5_000);
            store.evict_older_than(1_000, 5_000);
        });
    });
}

criterion_group!(benches, bench_record_attempts, bench_summaries_and_eviction);
criterion_main!(benches);
