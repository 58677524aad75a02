// ─────────────────────────────────────────────────────────────────────
// Extreme Deconvolution — Numerics Kernel Benchmarks
// ─────────────────────────────────────────────────────────────────────
//! Criterion benchmarks for the kernel calls on the E-step hot path:
//! log-sum-exp rows, Cholesky inverse + log-determinant, and the Jacobi
//! eigensolver used by split construction.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use deconv_math::{jacobi_eigen_symmetric, logsumexp, spd_inverse_logdet};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_spd(n: usize) -> Vec<f64> {
    // Diagonally dominant symmetric matrix
    let mut a = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            a[i * n + j] = 0.3 / (1.0 + (i as f64 - j as f64).abs());
        }
        a[i * n + i] = 2.0 + i as f64 * 0.1;
    }
    a
}

// ── logsumexp ────────────────────────────────────────────────────────

fn bench_logsumexp_k3(c: &mut Criterion) {
    let row = vec![-1.2, -0.4, -3.8];
    c.bench_function("logsumexp_k3", |b| b.iter(|| logsumexp(black_box(&row))));
}

fn bench_logsumexp_k64(c: &mut Criterion) {
    let row: Vec<f64> = (0..64).map(|i| -(i as f64) * 0.37).collect();
    c.bench_function("logsumexp_k64", |b| b.iter(|| logsumexp(black_box(&row))));
}

// ── Cholesky ─────────────────────────────────────────────────────────

fn bench_spd_inverse_logdet_3x3(c: &mut Criterion) {
    let a = make_spd(3);
    let mut l = vec![0.0; 9];
    let mut inv = vec![0.0; 9];
    c.bench_function("spd_inverse_logdet_3x3", |b| {
        b.iter(|| spd_inverse_logdet(black_box(&a), 3, &mut l, &mut inv))
    });
}

fn bench_spd_inverse_logdet_8x8(c: &mut Criterion) {
    let a = make_spd(8);
    let mut l = vec![0.0; 64];
    let mut inv = vec![0.0; 64];
    c.bench_function("spd_inverse_logdet_8x8", |b| {
        b.iter(|| spd_inverse_logdet(black_box(&a), 8, &mut l, &mut inv))
    });
}

// ── Jacobi ───────────────────────────────────────────────────────────

fn bench_jacobi_4x4(c: &mut Criterion) {
    let a = make_spd(4);
    let mut eigvals = vec![0.0; 4];
    let mut eigvecs = vec![0.0; 16];
    c.bench_function("jacobi_eigen_4x4", |b| {
        b.iter(|| {
            let mut scratch = a.clone();
            jacobi_eigen_symmetric(black_box(&mut scratch), 4, &mut eigvals, &mut eigvecs)
        })
    });
}

// ── Groups ───────────────────────────────────────────────────────────

criterion_group!(
    benches,
    bench_logsumexp_k3,
    bench_logsumexp_k64,
    bench_spd_inverse_logdet_3x3,
    bench_spd_inverse_logdet_8x8,
    bench_jacobi_4x4,
);
criterion_main!(benches);
