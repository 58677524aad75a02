// ─────────────────────────────────────────────────────────────────────
// Extreme Deconvolution — Fitting Engine Benchmarks
// ─────────────────────────────────────────────────────────────────────
//! Criterion benchmarks for the fitting hot path: a single accumulating
//! E-step over a mid-sized dataset, and a complete small fit including
//! workspace setup and convergence.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use deconv_em::{projected_estep, DeconvEngine, EmWorkspace};
use deconv_math::SimpleRng;
use deconv_types::{Component, Dataset, FitConfig, Mixture, NoiseCovar};

// ── Helpers ──────────────────────────────────────────────────────────

/// n noisy 2D samples around three separated centers, identity
/// projection, diagonal measurement noise.
fn planar_dataset(n: usize) -> Dataset {
    let centers = [(-4.0, 0.0), (0.0, 3.0), (4.0, -1.0)];
    let mut rng = SimpleRng::new(20_260_501);
    let mut y = Vec::with_capacity(n * 2);
    for i in 0..n {
        let (cx, cy) = centers[i % 3];
        y.push(cx + rng.next_normal());
        y.push(cy + rng.next_normal());
    }
    Dataset::new(2, y, NoiseCovar::Diagonal(vec![0.05; n * 2]))
        .expect("benchmark dataset is well-formed")
}

fn three_component_guess() -> Mixture {
    let third = 1.0 / 3.0;
    Mixture::new(
        2,
        vec![
            Component::spherical(third, vec![-3.0, 0.5], 2.0),
            Component::spherical(third, vec![0.5, 2.0], 2.0),
            Component::spherical(third, vec![3.0, -0.5], 2.0),
        ],
    )
}

// ── E-step ───────────────────────────────────────────────────────────

fn bench_estep_n1000_k3(c: &mut Criterion) {
    let data = planar_dataset(1000);
    let mix = three_component_guess();
    let mut ws = EmWorkspace::new(data.len(), mix.k(), data.dx(), data.dy(), false);
    c.bench_function("estep_n1000_k3_d2", |b| {
        b.iter(|| projected_estep(black_box(&data), black_box(&mix), &mut ws, true))
    });
}

fn bench_estep_likelihood_only(c: &mut Criterion) {
    let data = planar_dataset(1000);
    let mix = three_component_guess();
    let mut ws = EmWorkspace::new(data.len(), mix.k(), data.dx(), data.dy(), false);
    c.bench_function("estep_likelihood_only_n1000_k3_d2", |b| {
        b.iter(|| projected_estep(black_box(&data), black_box(&mix), &mut ws, false))
    });
}

// ── Full fit ─────────────────────────────────────────────────────────

fn bench_full_fit_n200_k3(c: &mut Criterion) {
    let data = planar_dataset(200);
    let mix = three_component_guess();
    let cfg = FitConfig {
        tol: 1e-6,
        max_iter: 200,
        ..FitConfig::default()
    };
    c.bench_function("full_fit_n200_k3_d2", |b| {
        b.iter(|| {
            let mut eng =
                DeconvEngine::new(cfg.clone()).expect("benchmark config is valid");
            eng.fit_cloned(black_box(&data), black_box(&mix))
        })
    });
}

// ── Groups ───────────────────────────────────────────────────────────

criterion_group!(
    benches,
    bench_estep_n1000_k3,
    bench_estep_likelihood_only,
    bench_full_fit_n200_k3,
);
criterion_main!(benches);
