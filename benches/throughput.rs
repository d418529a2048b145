/// Update throughput of the three estimator variants.
///
/// The slow variant pays O(c) per token, the naive and fast variants only
/// for the samplers actually due; these benchmarks make that gap visible
/// across stream skews.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use stream_entropy::stream::zipf_stream;
use stream_entropy::{Estimator, NaiveEstimator, SlowEstimator};

const LENGTH: usize = 100_000;
const RANGE: u32 = 99_999;
const C: usize = 500;
const K: usize = 70;
const SEED: u64 = 44_545;

fn bench_variants(c: &mut Criterion) {
    let tokens = zipf_stream(LENGTH, RANGE, 1.5, SEED).unwrap();

    let mut group = c.benchmark_group("variant_throughput");
    group.throughput(Throughput::Elements(LENGTH as u64));
    // The slow variant pays c random draws per token; keep iterations low.
    group.sample_size(10);

    group.bench_function("fast", |b| {
        b.iter(|| {
            let mut est = Estimator::new(C, K, SEED).unwrap();
            for &t in &tokens {
                est.update(t);
            }
            black_box(est.finalize());
        });
    });

    group.bench_function("naive", |b| {
        b.iter(|| {
            let mut est = NaiveEstimator::new(C, K, SEED).unwrap();
            for &t in &tokens {
                est.update(t);
            }
            black_box(est.finalize());
        });
    });

    group.bench_function("slow", |b| {
        b.iter(|| {
            let mut est = SlowEstimator::new(C, K, SEED).unwrap();
            for &t in &tokens {
                est.update(t);
            }
            black_box(est.finalize());
        });
    });

    group.finish();
}

fn bench_fast_across_skews(c: &mut Criterion) {
    let mut group = c.benchmark_group("fast_across_skews");
    group.throughput(Throughput::Elements(LENGTH as u64));
    group.sample_size(20);

    for zipf in [1.001, 1.5, 2.0, 3.0] {
        let tokens = zipf_stream(LENGTH, RANGE, zipf, SEED).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(zipf), &tokens, |b, tokens| {
            b.iter(|| {
                let mut est = Estimator::new(C, K, SEED).unwrap();
                for &t in tokens {
                    est.update(t);
                }
                black_box(est.finalize());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_variants, bench_fast_across_skews);
criterion_main!(benches);
