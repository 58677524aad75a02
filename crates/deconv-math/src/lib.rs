// ─────────────────────────────────────────────────────────────────────
// Extreme Deconvolution — Numerics Kernel
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Numerics kernel for the projected-EM mixture engine: stable
//! log-domain arithmetic, Cholesky factorization of small symmetric
//! positive-definite matrices, a cyclic Jacobi eigensolver, and a
//! seedable RNG for reproducible split perturbations.
//!
//! Everything operates on flat row-major `&[f64]` slices (`a[i*n + j]`)
//! and is free of heap allocation on the hot path.

pub mod linalg;
pub mod logspace;
pub mod rng;

pub use linalg::{
    all_finite, cholesky_factor, cholesky_invert, cholesky_logdet, cholesky_solve,
    jacobi_eigen_symmetric, mat_mul, mat_mul_nt, mat_vec, spd_inverse_logdet, symmetrize,
};
pub use logspace::logsumexp;
pub use rng::SimpleRng;
