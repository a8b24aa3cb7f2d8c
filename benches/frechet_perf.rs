use criterion::{criterion_group, criterion_main, Criterion};
extern crate fidcore as fc;
use fc::{estimate, frechet_between, FrechetOptions, StreamingMoments};
use ndarray::{s, Array2};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

fn features(rows: usize, dim: usize, seed: u64) -> Array2<f64> {
    let mut rng = Pcg64::seed_from_u64(seed);
    Array2::from_shape_simple_fn((rows, dim), || rng.gen::<f64>())
}

fn bench_moments(c: &mut Criterion) {
    let f = features(4096, 64, 1);
    c.bench_function("estimate_4096x64", |b| {
        b.iter(|| estimate(f.view(), None).unwrap())
    });
    c.bench_function("streaming_4096x64", |b| {
        b.iter(|| {
            let mut acc = StreamingMoments::new();
            for start in (0..4096).step_by(64) {
                acc.push_batch(f.slice(s![start..start + 64, ..])).unwrap();
            }
            acc.finish().unwrap()
        })
    });
}

fn bench_frechet(c: &mut Criterion) {
    let a = estimate(features(2048, 64, 1).view(), None).unwrap();
    let b = estimate(features(2048, 64, 2).view(), None).unwrap();
    c.bench_function("frechet_64d", |bench| {
        bench.iter(|| frechet_between(&a, &b, FrechetOptions::default()).unwrap())
    });
}

criterion_group!(benches, bench_moments, bench_frechet);
criterion_main!(benches);
