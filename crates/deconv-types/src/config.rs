// ─────────────────────────────────────────────────────────────────────
// Extreme Deconvolution — Fit Configuration
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use crate::error::{DeconvError, DeconvResult};

/// Runtime configuration for a single `fit` call.
///
/// Per-component fix masks accept three lengths: empty (all free), one
/// (broadcast to every component), or exactly K.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Convergence threshold on the change in average log-likelihood.
    /// Default: 1e-6.
    pub tol: f64,

    /// Iteration cap for each EM run. `0` evaluates the objective once
    /// and returns without touching the mixture.
    /// Default: 10^9 (practically unbounded).
    pub max_iter: u64,

    /// Covariance regularization weight (≥ 0). `0` is plain maximum
    /// likelihood; larger values blend each covariance toward the
    /// identity target to keep near-empty components positive-definite.
    /// Default: 0.0.
    pub w: f64,

    /// Split-and-merge candidate budget after base-EM convergence.
    /// Default: 0 (disabled).
    pub split_merge_depth: usize,

    /// Use the full candidate budget K(K-1)(K-2)/2 instead of
    /// `split_merge_depth`.
    /// Default: false.
    pub use_maximum_depth: bool,

    /// Evaluate the current mixture's objective and stop; the mixture
    /// is never mutated.
    /// Default: false.
    pub likelihood_only: bool,

    /// Seed for the split-perturbation RNG; the same seed reproduces
    /// the same split-and-merge trajectory.
    /// Default: 42.
    pub seed: u64,

    /// Per-component amplitude fix mask.
    /// Default: empty (all amplitudes free).
    pub fix_amp: Vec<bool>,

    /// Per-component mean fix mask.
    /// Default: empty (all means free).
    pub fix_mean: Vec<bool>,

    /// Per-component covariance fix mask.
    /// Default: empty (all covariances free).
    pub fix_covar: Vec<bool>,

    /// Basename for the two diagnostic log files
    /// (`<basename>_loglike.log`, `<basename>_snm.log`).
    /// Default: None (no diagnostics written).
    pub diagnostic_log_basename: Option<String>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            tol: 1e-6,
            max_iter: 1_000_000_000,
            w: 0.0,
            split_merge_depth: 0,
            use_maximum_depth: false,
            likelihood_only: false,
            seed: 42,
            fix_amp: Vec::new(),
            fix_mean: Vec::new(),
            fix_covar: Vec::new(),
            diagnostic_log_basename: None,
        }
    }
}

impl FitConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> DeconvResult<()> {
        if !(self.tol > 0.0 && self.tol.is_finite()) {
            return Err(DeconvError::Config(format!(
                "tol must be finite and > 0, got {}",
                self.tol
            )));
        }
        if !(self.w >= 0.0 && self.w.is_finite()) {
            return Err(DeconvError::Config(format!(
                "w must be finite and >= 0, got {}",
                self.w
            )));
        }
        Ok(())
    }

    /// Load from JSON string.
    pub fn from_json(json: &str) -> DeconvResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| DeconvError::Config(format!("JSON parse error: {e}")))
    }
}
