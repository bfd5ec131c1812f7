use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use cyclemux::{ArmPolicy, CyclicTrend, DecisionEngine, EngineConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::hint::black_box;

fn trends(n_arms: usize, len: usize) -> Vec<CyclicTrend> {
    (0..n_arms)
        .map(|a| {
            // Deterministic, phase-shifted sawtooth per arm.
            let p = (0..len)
                .map(|i| ((i + a * 3) % len) as f64 / len as f64)
                .collect();
            CyclicTrend::from_probabilities(p, len).expect("probabilities in range")
        })
        .collect()
}

fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_step");
    for &n_arms in &[2usize, 5, 10] {
        let ts = trends(n_arms, 50);
        group.bench_with_input(BenchmarkId::new("step_observe", n_arms), &n_arms, |b, &n| {
            let cfg = EngineConfig::uniform(n, ArmPolicy::default()).with_budget(u64::MAX);
            let mut engine = DecisionEngine::new(&ts, cfg).expect("valid config");
            let mut rng = StdRng::seed_from_u64(123);
            b.iter(|| {
                let d = engine.step(&mut rng).expect("budget left");
                let obs = engine
                    .observe(d.arm, d.batch_size, d.step % 2 == 0)
                    .expect("pending decision");
                black_box(obs);
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_engine);
criterion_main!(benches);
