use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dnsbalancer::base::fastrand::{fastrange, FastRand};
use std::sync::Arc;

/// Index selection cost: multiply-high vs modulo, and the shared generator.
fn bench_index_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_selection");
    let rnd = FastRand::new(42);

    group.bench_function("fastrange_n7", |b| {
        b.iter(|| black_box(fastrange(black_box(rnd.next_u64()), black_box(7))))
    });

    group.bench_function("modulo_n7", |b| {
        b.iter(|| black_box(black_box(rnd.next_u64()) as usize % black_box(7)))
    });

    group.bench_function("fastrand_index", |b| b.iter(|| black_box(rnd.index(black_box(16)))));

    group.finish();
}

/// Contended draws from one generator across threads.
fn bench_contended(c: &mut Criterion) {
    let rnd = Arc::new(FastRand::new(7));

    c.bench_function("fastrand_4_threads_1000_draws", |b| {
        b.iter(|| {
            std::thread::scope(|s| {
                for _ in 0..4 {
                    let rnd = Arc::clone(&rnd);
                    s.spawn(move || {
                        for _ in 0..1000 {
                            black_box(rnd.index(8));
                        }
                    });
                }
            });
        })
    });
}

criterion_group!(benches, bench_index_selection, bench_contended);
criterion_main!(benches);
