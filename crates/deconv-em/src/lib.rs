// ─────────────────────────────────────────────────────────────────────
// Extreme Deconvolution — Fitting Engine
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Projected-EM fitting engine for Gaussian mixtures under per-sample
//! projection and measurement noise.
//!
//! Layered bottom-up:
//!   - [`workspace`]: preallocated per-fit buffers, no allocation in
//!     the iteration loop
//!   - [`estep`]: responsibilities, conditional latent moments, and the
//!     weighted average log-likelihood in one pass
//!   - [`mstep`]: closed-form parameter updates with fix masks,
//!     amplitude renormalization, and covariance regularization
//!   - [`driver`]: the convergence loop with its objective trace
//!   - [`splitmerge`]: the post-convergence split-and-merge search
//!   - [`engine`]: validation, dispatch, and reporting around the above
//!   - [`diaglog`]: best-effort per-iteration log files

pub mod diaglog;
pub mod driver;
pub mod engine;
pub mod estep;
pub mod mstep;
pub mod splitmerge;
pub mod workspace;

pub use diaglog::DiagnosticLog;
pub use driver::{run_em, EmOutcome, EmStepLog};
pub use engine::DeconvEngine;
pub use estep::projected_estep;
pub use mstep::regularized_mstep;
pub use splitmerge::{split_merge_search, SnmRecord};
pub use workspace::{EmWorkspace, Moments};
