// ─────────────────────────────────────────────────────────────────────
// Extreme Deconvolution — Core Types
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Type definitions, configuration, and error hierarchy for the
//! extreme-deconvolution engine: Gaussian mixtures fitted to noisy,
//! projected samples.

pub mod config;
pub mod error;
pub mod model;

pub use config::FitConfig;
pub use error::{DeconvError, DeconvResult};
pub use model::{
    Component, Dataset, FitReport, FitStatus, FixMasks, Mixture, NoiseCovar, NoiseView,
};
