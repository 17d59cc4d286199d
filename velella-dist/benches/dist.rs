use criterion::{black_box, criterion_group, criterion_main, Criterion};
use velella_core::Xorshift64;
use velella_dist::{Distribution, FiniteDistribution, NormalDistribution};

fn random_weights(n: usize, seed: u64) -> Vec<f64> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            (state >> 11) as f64 / (1u64 << 53) as f64
        })
        .collect()
}

fn bench_finite_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("finite_sample");

    let weights = random_weights(1_000, 42);
    let total: f64 = weights.iter().sum();
    let probs: Vec<f64> = weights.iter().map(|w| w / total).collect();
    let dist = FiniteDistribution::from_probabilities(&probs).unwrap();

    group.bench_function("1k_categories", |b| {
        let mut rng = Xorshift64::new(7);
        b.iter(|| black_box(&dist).sample(&mut rng))
    });

    group.finish();
}

fn bench_finite_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("finite_fit");

    let weights = random_weights(10_000, 137);
    let total: f64 = weights.iter().sum();
    let observations: Vec<(usize, f64)> = weights
        .iter()
        .enumerate()
        .map(|(k, w)| (k % 100, w / total))
        .collect();

    group.bench_function("10k_obs_100_categories", |b| {
        let mut dist = FiniteDistribution::uniform(100).unwrap();
        b.iter(|| dist.fit(black_box(&observations), 0.5))
    });

    group.finish();
}

fn bench_normal_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("normal_sample");

    let dist = NormalDistribution::new(0.0, 2.5).unwrap();
    group.bench_function("box_muller", |b| {
        let mut rng = Xorshift64::new(99);
        b.iter(|| black_box(&dist).sample(&mut rng))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_finite_sample,
    bench_finite_fit,
    bench_normal_sample
);
criterion_main!(benches);
