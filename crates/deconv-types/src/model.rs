// ─────────────────────────────────────────────────────────────────────
// Extreme Deconvolution — Mixture and Sample Model
// ─────────────────────────────────────────────────────────────────────
//! Caller-facing value types: the Gaussian mixture being fitted, the
//! sample set it is fitted to, fix masks, and the fit report.
//!
//! All matrices are flat row-major `Vec<f64>` (`a[i*cols + j]`). The
//! mixture lives in latent dimension `dx`; each sample is observed in
//! dimension `dy` through an optional per-sample projection.

use serde::{Deserialize, Serialize};

use crate::error::{DeconvError, DeconvResult};

// ── Mixture ──────────────────────────────────────────────────────────

/// One Gaussian component: amplitude, mean (dx), covariance (dx×dx).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub alpha: f64,
    pub mean: Vec<f64>,
    pub covar: Vec<f64>,
}

impl Component {
    pub fn new(alpha: f64, mean: Vec<f64>, covar: Vec<f64>) -> Self {
        Self { alpha, mean, covar }
    }

    /// Component with isotropic covariance `var·I`.
    pub fn spherical(alpha: f64, mean: Vec<f64>, var: f64) -> Self {
        let d = mean.len();
        let mut covar = vec![0.0; d * d];
        for i in 0..d {
            covar[i * d + i] = var;
        }
        Self { alpha, mean, covar }
    }
}

/// A K-component Gaussian mixture in latent dimension `dim`.
///
/// The caller owns the instance; `fit` mutates it in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mixture {
    pub dim: usize,
    pub components: Vec<Component>,
}

impl Mixture {
    pub fn new(dim: usize, components: Vec<Component>) -> Self {
        Self { dim, components }
    }

    /// Number of components K.
    pub fn k(&self) -> usize {
        self.components.len()
    }

    /// Structural and value checks: shapes, finiteness, non-negative
    /// amplitudes summing to 1. Positive-definiteness of each
    /// covariance is verified separately at fit setup, where the
    /// Cholesky kernel is available.
    pub fn validate(&self) -> DeconvResult<()> {
        if self.dim == 0 {
            return Err(DeconvError::ShapeMismatch("mixture dim must be > 0".into()));
        }
        if self.components.is_empty() {
            return Err(DeconvError::ShapeMismatch(
                "mixture must have at least one component".into(),
            ));
        }
        let d = self.dim;
        let mut amp_sum = 0.0;
        for (j, c) in self.components.iter().enumerate() {
            if c.mean.len() != d {
                return Err(DeconvError::ShapeMismatch(format!(
                    "component {j}: mean has length {}, expected {d}",
                    c.mean.len()
                )));
            }
            if c.covar.len() != d * d {
                return Err(DeconvError::ShapeMismatch(format!(
                    "component {j}: covar has length {}, expected {}",
                    c.covar.len(),
                    d * d
                )));
            }
            if !(c.alpha >= 0.0 && c.alpha.is_finite()) {
                return Err(DeconvError::NonFiniteValue(format!(
                    "component {j}: amplitude {} is negative or non-finite",
                    c.alpha
                )));
            }
            if !c.mean.iter().all(|v| v.is_finite()) || !c.covar.iter().all(|v| v.is_finite()) {
                return Err(DeconvError::NonFiniteValue(format!(
                    "component {j}: non-finite mean or covariance entry"
                )));
            }
            amp_sum += c.alpha;
        }
        if (amp_sum - 1.0).abs() > 1e-8 {
            return Err(DeconvError::Config(format!(
                "amplitudes must sum to 1, got {amp_sum}"
            )));
        }
        Ok(())
    }
}

// ── Dataset ──────────────────────────────────────────────────────────

/// Observation noise covariances for the whole sample set.
///
/// `Diagonal` stores one dy-vector of variances per sample (n×dy);
/// `Dense` stores one full symmetric dy×dy matrix per sample (n×dy×dy).
#[derive(Debug, Clone)]
pub enum NoiseCovar {
    Diagonal(Vec<f64>),
    Dense(Vec<f64>),
}

/// Per-sample borrowed view of the observation noise.
#[derive(Debug, Clone, Copy)]
pub enum NoiseView<'a> {
    /// dy variances (diagonal entries only).
    Diagonal(&'a [f64]),
    /// Full dy×dy matrix.
    Dense(&'a [f64]),
}

/// The fixed in-memory sample set: observations, noise, optional
/// per-sample projections, optional log-weights.
#[derive(Debug, Clone)]
pub struct Dataset {
    n: usize,
    dy: usize,
    dx: usize,
    y: Vec<f64>,
    noise: NoiseCovar,
    projections: Option<Vec<f64>>,
    log_weights: Option<Vec<f64>>,
    total_weight: f64,
}

impl Dataset {
    /// Build a dataset with implicit identity projections (`dx == dy`)
    /// and unit weights. `y` is n×dy row-major.
    pub fn new(dy: usize, y: Vec<f64>, noise: NoiseCovar) -> DeconvResult<Self> {
        if dy == 0 {
            return Err(DeconvError::ShapeMismatch("dy must be > 0".into()));
        }
        if y.is_empty() || y.len() % dy != 0 {
            return Err(DeconvError::ShapeMismatch(format!(
                "observation buffer length {} is not a positive multiple of dy = {dy}",
                y.len()
            )));
        }
        let n = y.len() / dy;
        if !y.iter().all(|v| v.is_finite()) {
            return Err(DeconvError::NonFiniteValue(
                "observation buffer contains NaN or Inf".into(),
            ));
        }
        match &noise {
            NoiseCovar::Diagonal(d) => {
                if d.len() != n * dy {
                    return Err(DeconvError::ShapeMismatch(format!(
                        "diagonal noise length {} does not match n*dy = {}",
                        d.len(),
                        n * dy
                    )));
                }
                if !d.iter().all(|v| v.is_finite() && *v >= 0.0) {
                    return Err(DeconvError::NonFiniteValue(
                        "diagonal noise entries must be finite and >= 0".into(),
                    ));
                }
            }
            NoiseCovar::Dense(m) => {
                if m.len() != n * dy * dy {
                    return Err(DeconvError::ShapeMismatch(format!(
                        "dense noise length {} does not match n*dy*dy = {}",
                        m.len(),
                        n * dy * dy
                    )));
                }
                if !m.iter().all(|v| v.is_finite()) {
                    return Err(DeconvError::NonFiniteValue(
                        "dense noise contains NaN or Inf".into(),
                    ));
                }
            }
        }
        Ok(Self {
            n,
            dy,
            dx: dy,
            y,
            noise,
            projections: None,
            log_weights: None,
            total_weight: n as f64,
        })
    }

    /// Attach per-sample projection matrices (n×dy×dx row-major) mapping
    /// latent dimension `dx` into observation space.
    pub fn with_projections(mut self, dx: usize, projections: Vec<f64>) -> DeconvResult<Self> {
        if dx == 0 {
            return Err(DeconvError::ShapeMismatch("dx must be > 0".into()));
        }
        if projections.len() != self.n * self.dy * dx {
            return Err(DeconvError::ShapeMismatch(format!(
                "projection buffer length {} does not match n*dy*dx = {}",
                projections.len(),
                self.n * self.dy * dx
            )));
        }
        if !projections.iter().all(|v| v.is_finite()) {
            return Err(DeconvError::NonFiniteValue(
                "projection buffer contains NaN or Inf".into(),
            ));
        }
        self.dx = dx;
        self.projections = Some(projections);
        Ok(self)
    }

    /// Attach per-sample log-weights (length n); weight_i = exp(ℓ_i).
    pub fn with_log_weights(mut self, log_weights: Vec<f64>) -> DeconvResult<Self> {
        if log_weights.len() != self.n {
            return Err(DeconvError::ShapeMismatch(format!(
                "log-weight length {} does not match n = {}",
                log_weights.len(),
                self.n
            )));
        }
        // -inf (weight zero) is allowed; NaN and +inf are not
        if log_weights.iter().any(|v| v.is_nan() || *v == f64::INFINITY) {
            return Err(DeconvError::NonFiniteValue(
                "log-weights contain NaN or +Inf".into(),
            ));
        }
        let total: f64 = log_weights.iter().map(|lw| lw.exp()).sum();
        if !(total > 0.0 && total.is_finite()) {
            return Err(DeconvError::NonFiniteValue(format!(
                "total sample weight must be finite and > 0, got {total}"
            )));
        }
        self.total_weight = total;
        self.log_weights = Some(log_weights);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Observation dimension dy.
    pub fn dy(&self) -> usize {
        self.dy
    }

    /// Latent dimension dx (equals dy without projections).
    pub fn dx(&self) -> usize {
        self.dx
    }

    /// Σ_i exp(ℓ_i), the normalizer of the average log-likelihood.
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn y(&self, i: usize) -> &[f64] {
        &self.y[i * self.dy..(i + 1) * self.dy]
    }

    pub fn noise(&self, i: usize) -> NoiseView<'_> {
        match &self.noise {
            NoiseCovar::Diagonal(d) => NoiseView::Diagonal(&d[i * self.dy..(i + 1) * self.dy]),
            NoiseCovar::Dense(m) => {
                let s = self.dy * self.dy;
                NoiseView::Dense(&m[i * s..(i + 1) * s])
            }
        }
    }

    /// Sample i's projection matrix (dy×dx), or `None` for identity.
    pub fn projection(&self, i: usize) -> Option<&[f64]> {
        let s = self.dy * self.dx;
        self.projections.as_ref().map(|p| &p[i * s..(i + 1) * s])
    }

    pub fn log_weight(&self, i: usize) -> f64 {
        self.log_weights.as_ref().map_or(0.0, |lw| lw[i])
    }
}

// ── Fix masks ────────────────────────────────────────────────────────

/// Per-component parameter-fix flags, one triple per component.
///
/// The engine works on its own copy; freezing a starved component never
/// touches the masks the caller configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixMasks {
    pub amp: Vec<bool>,
    pub mean: Vec<bool>,
    pub covar: Vec<bool>,
}

impl FixMasks {
    pub fn all_free(k: usize) -> Self {
        Self {
            amp: vec![false; k],
            mean: vec![false; k],
            covar: vec![false; k],
        }
    }

    /// Expand caller masks to length K. Accepted input lengths per mask:
    /// 0 (all free), 1 (broadcast), or K.
    pub fn broadcast(amp: &[bool], mean: &[bool], covar: &[bool], k: usize) -> DeconvResult<Self> {
        let expand = |name: &str, m: &[bool]| -> DeconvResult<Vec<bool>> {
            match m.len() {
                0 => Ok(vec![false; k]),
                1 => Ok(vec![m[0]; k]),
                len if len == k => Ok(m.to_vec()),
                len => Err(DeconvError::ShapeMismatch(format!(
                    "{name} mask has length {len}, expected 0, 1, or K = {k}"
                ))),
            }
        };
        Ok(Self {
            amp: expand("fix_amp", amp)?,
            mean: expand("fix_mean", mean)?,
            covar: expand("fix_covar", covar)?,
        })
    }

    pub fn k(&self) -> usize {
        self.amp.len()
    }

    /// Any of the three flags set for component j.
    pub fn any_fixed(&self, j: usize) -> bool {
        self.amp[j] || self.mean[j] || self.covar[j]
    }

    /// All three flags set for component j.
    pub fn fully_fixed(&self, j: usize) -> bool {
        self.amp[j] && self.mean[j] && self.covar[j]
    }

    /// Fix every parameter of component j.
    pub fn freeze(&mut self, j: usize) {
        self.amp[j] = true;
        self.mean[j] = true;
        self.covar[j] = true;
    }
}

// ── Status and report ────────────────────────────────────────────────

/// Convergence-loop state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitStatus {
    Init,
    Iterating,
    Converged,
    MaxIterReached,
    Failed,
}

/// Terminal summary of a `fit` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitReport {
    /// Weighted average log-likelihood of the final mixture.
    pub avg_log_likelihood: f64,
    /// `Converged` or `MaxIterReached`; failures surface as errors.
    pub status: FitStatus,
    /// Base-EM iterations executed.
    pub iterations: u64,
    /// Split-merge candidates accepted.
    pub split_merge_accepted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Mixture ─────────────────────────────────────────────────────

    fn unit_mixture() -> Mixture {
        Mixture::new(2, vec![Component::spherical(1.0, vec![0.0, 0.0], 1.0)])
    }

    #[test]
    fn test_spherical_component() {
        let c = Component::spherical(0.5, vec![1.0, 2.0, 3.0], 2.5);
        assert_eq!(c.covar.len(), 9);
        assert_eq!(c.covar[0], 2.5);
        assert_eq!(c.covar[4], 2.5);
        assert_eq!(c.covar[8], 2.5);
        assert_eq!(c.covar[1], 0.0);
    }

    #[test]
    fn test_mixture_validate_ok() {
        assert!(unit_mixture().validate().is_ok());
    }

    #[test]
    fn test_mixture_validate_amp_sum() {
        let mut m = unit_mixture();
        m.components[0].alpha = 0.7;
        assert!(matches!(m.validate(), Err(DeconvError::Config(_))));
    }

    #[test]
    fn test_mixture_validate_mean_len() {
        let mut m = unit_mixture();
        m.components[0].mean = vec![0.0];
        assert!(matches!(m.validate(), Err(DeconvError::ShapeMismatch(_))));
    }

    #[test]
    fn test_mixture_validate_nan_covar() {
        let mut m = unit_mixture();
        m.components[0].covar[0] = f64::NAN;
        assert!(matches!(m.validate(), Err(DeconvError::NonFiniteValue(_))));
    }

    // ── Dataset ─────────────────────────────────────────────────────

    #[test]
    fn test_dataset_accessors() {
        let y = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]; // 3 samples, dy = 2
        let noise = NoiseCovar::Diagonal(vec![0.1; 6]);
        let ds = Dataset::new(2, y, noise).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.dy(), 2);
        assert_eq!(ds.dx(), 2, "identity projection keeps dx == dy");
        assert_eq!(ds.y(1), &[3.0, 4.0]);
        assert!(ds.projection(0).is_none());
        assert_eq!(ds.log_weight(2), 0.0);
        assert!((ds.total_weight() - 3.0).abs() < 1e-12);
        match ds.noise(2) {
            NoiseView::Diagonal(d) => assert_eq!(d, &[0.1, 0.1]),
            NoiseView::Dense(_) => panic!("expected diagonal view"),
        }
    }

    #[test]
    fn test_dataset_dense_noise_view() {
        let y = vec![0.0, 0.0, 0.0, 0.0];
        let noise = NoiseCovar::Dense(vec![1.0, 0.2, 0.2, 1.0, 2.0, 0.0, 0.0, 2.0]);
        let ds = Dataset::new(2, y, noise).unwrap();
        match ds.noise(1) {
            NoiseView::Dense(m) => assert_eq!(m, &[2.0, 0.0, 0.0, 2.0]),
            NoiseView::Diagonal(_) => panic!("expected dense view"),
        }
    }

    #[test]
    fn test_dataset_length_mismatch() {
        let y = vec![0.0; 5]; // not a multiple of dy = 2
        assert!(Dataset::new(2, y, NoiseCovar::Diagonal(vec![0.0; 4])).is_err());
        let y = vec![0.0; 4];
        assert!(Dataset::new(2, y, NoiseCovar::Diagonal(vec![0.0; 3])).is_err());
    }

    #[test]
    fn test_dataset_negative_noise_rejected() {
        let y = vec![0.0; 2];
        let err = Dataset::new(2, y, NoiseCovar::Diagonal(vec![-1.0, 0.0]));
        assert!(matches!(err, Err(DeconvError::NonFiniteValue(_))));
    }

    #[test]
    fn test_dataset_projections() {
        let y = vec![0.5, -0.5]; // 2 samples observed in 1D
        let ds = Dataset::new(1, y, NoiseCovar::Diagonal(vec![0.0, 0.0]))
            .unwrap()
            .with_projections(2, vec![1.0, 0.0, 0.0, 1.0])
            .unwrap();
        assert_eq!(ds.dx(), 2);
        assert_eq!(ds.projection(1).unwrap(), &[0.0, 1.0]);
    }

    #[test]
    fn test_dataset_projection_length_mismatch() {
        let y = vec![0.5, -0.5];
        let r = Dataset::new(1, y, NoiseCovar::Diagonal(vec![0.0, 0.0]))
            .unwrap()
            .with_projections(2, vec![1.0, 0.0, 0.0]);
        assert!(r.is_err());
    }

    #[test]
    fn test_dataset_log_weights() {
        let y = vec![0.0, 0.0];
        let ds = Dataset::new(1, y, NoiseCovar::Diagonal(vec![0.0, 0.0]))
            .unwrap()
            .with_log_weights(vec![0.0, 2.0_f64.ln()])
            .unwrap();
        assert!((ds.total_weight() - 3.0).abs() < 1e-12);
        assert!((ds.log_weight(1) - 2.0_f64.ln()).abs() < 1e-15);
    }

    #[test]
    fn test_dataset_all_zero_weights_rejected() {
        let y = vec![0.0, 0.0];
        let r = Dataset::new(1, y, NoiseCovar::Diagonal(vec![0.0, 0.0]))
            .unwrap()
            .with_log_weights(vec![f64::NEG_INFINITY, f64::NEG_INFINITY]);
        assert!(r.is_err());
    }

    // ── Masks ───────────────────────────────────────────────────────

    #[test]
    fn test_masks_broadcast_scalar() {
        let m = FixMasks::broadcast(&[true], &[], &[false], 3).unwrap();
        assert_eq!(m.amp, vec![true, true, true]);
        assert_eq!(m.mean, vec![false, false, false]);
        assert_eq!(m.covar, vec![false, false, false]);
    }

    #[test]
    fn test_masks_broadcast_exact() {
        let m = FixMasks::broadcast(&[true, false], &[false, true], &[false, false], 2).unwrap();
        assert!(m.any_fixed(0));
        assert!(m.any_fixed(1));
        assert!(!m.fully_fixed(0));
    }

    #[test]
    fn test_masks_broadcast_bad_length() {
        assert!(FixMasks::broadcast(&[true, false], &[], &[], 3).is_err());
    }

    #[test]
    fn test_masks_freeze() {
        let mut m = FixMasks::all_free(2);
        m.freeze(1);
        assert!(!m.any_fixed(0));
        assert!(m.fully_fixed(1));
    }
}
