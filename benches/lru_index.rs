use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use imagecache::policy::LruIndex;

fn bench_mark_most_recently_used(c: &mut Criterion) {
    c.bench_function("lru_index_mark_mru", |b| {
        b.iter_batched(
            || LruIndex::new_prepopulated(1024),
            |index| {
                for i in 0..4096usize {
                    index.mark_most_recently_used(std::hint::black_box((i * 7) % 1024));
                }
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_evict_cycle(c: &mut Criterion) {
    c.bench_function("lru_index_evict_cycle", |b| {
        b.iter_batched(
            || LruIndex::new_prepopulated(1024),
            |index| {
                for _ in 0..4096usize {
                    if let Ok(slot) = index.least_recently_used() {
                        index.mark_most_recently_used(std::hint::black_box(slot));
                    }
                }
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_snapshot_json(c: &mut Criterion) {
    let index = LruIndex::new_prepopulated(1024);
    for i in (0..1024usize).rev() {
        index.mark_most_recently_used(i);
    }
    c.bench_function("lru_index_snapshot_json", |b| {
        b.iter(|| {
            let json = index.snapshot().to_json().unwrap();
            std::hint::black_box(json);
        })
    });
}

criterion_group!(
    benches,
    bench_mark_most_recently_used,
    bench_evict_cycle,
    bench_snapshot_json
);
criterion_main!(benches);
