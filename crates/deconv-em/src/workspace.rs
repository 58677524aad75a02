// ─────────────────────────────────────────────────────────────────────
// Extreme Deconvolution — E-Step Workspace
// ─────────────────────────────────────────────────────────────────────
//! Pre-allocated scratch for the per-sample, per-component E-step work.
//! One workspace serves an entire fit, including every split-merge
//! candidate evaluation, so the hot loop never allocates.

/// Per-component sufficient-statistic accumulators for one E-step pass.
#[derive(Debug, Clone)]
pub struct Moments {
    /// Posterior mass per component, Σ_i q_ik (length K).
    pub qsum: Vec<f64>,
    /// Σ_i q_ik · b_ik (K × dx).
    pub mean_acc: Vec<f64>,
    /// Σ_i q_ik · (B_ik + b_ik b_ikᵀ) (K × dx × dx).
    pub sec_acc: Vec<f64>,
}

impl Moments {
    fn new(k: usize, dx: usize) -> Self {
        Self {
            qsum: vec![0.0; k],
            mean_acc: vec![0.0; k * dx],
            sec_acc: vec![0.0; k * dx * dx],
        }
    }

    pub fn reset(&mut self) {
        self.qsum.fill(0.0);
        self.mean_acc.fill(0.0);
        self.sec_acc.fill(0.0);
    }
}

/// Scratch buffers sized once per fit.
///
/// Matrix buffers are flat row-major. `logq` holds the log-domain
/// responsibility matrix of the most recent E-step pass; `logcomp`
/// additionally holds per-component log-densities when a split-merge
/// search will need them for ranking.
#[derive(Debug, Clone)]
pub struct EmWorkspace {
    pub k: usize,
    pub dx: usize,
    pub dy: usize,

    /// ln π_k cache, refreshed each pass (length K).
    pub lnalpha: Vec<f64>,
    /// Per-sample log joint row, ln π_k + ln N_k (length K).
    pub row: Vec<f64>,
    /// Projected covariance T = A Σ Aᵀ + R (dy × dy).
    pub t: Vec<f64>,
    /// Cholesky scratch for T (dy × dy).
    pub tchol: Vec<f64>,
    /// T⁻¹ (dy × dy).
    pub tinv: Vec<f64>,
    /// A·Σ (dy × dx).
    pub av: Vec<f64>,
    /// Σ·Aᵀ (dx × dy).
    pub vat: Vec<f64>,
    /// Σ·Aᵀ·T⁻¹, the latent gain (dx × dy).
    pub gain: Vec<f64>,
    /// Projected mean A·μ (dy).
    pub proj_mean: Vec<f64>,
    /// Residual y − A·μ (dy).
    pub delta: Vec<f64>,
    /// Conditional latent means b_ik for the current sample (K × dx).
    pub bs: Vec<f64>,
    /// Conditional latent covariances B_ik for the current sample
    /// (K × dx × dx).
    pub bmats: Vec<f64>,
    /// Log responsibilities of the latest pass (n × K).
    pub logq: Vec<f64>,
    /// Per-component log-densities of the latest pass (n × K), kept
    /// only when a split-merge search was requested.
    pub logcomp: Option<Vec<f64>>,
    pub moments: Moments,
}

impl EmWorkspace {
    pub fn new(n: usize, k: usize, dx: usize, dy: usize, want_split_merge: bool) -> Self {
        Self {
            k,
            dx,
            dy,
            lnalpha: vec![0.0; k],
            row: vec![0.0; k],
            t: vec![0.0; dy * dy],
            tchol: vec![0.0; dy * dy],
            tinv: vec![0.0; dy * dy],
            av: vec![0.0; dy * dx],
            vat: vec![0.0; dx * dy],
            gain: vec![0.0; dx * dy],
            proj_mean: vec![0.0; dy],
            delta: vec![0.0; dy],
            bs: vec![0.0; k * dx],
            bmats: vec![0.0; k * dx * dx],
            logq: vec![0.0; n * k],
            logcomp: if want_split_merge {
                Some(vec![0.0; n * k])
            } else {
                None
            },
            moments: Moments::new(k, dx),
        }
    }
}
