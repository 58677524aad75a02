// ─────────────────────────────────────────────────────────────────────
// Extreme Deconvolution — Fitting Engine (Orchestrator)
// ─────────────────────────────────────────────────────────────────────
//! The caller-facing fit sequence:
//!   1. Validate mixture, dataset shapes, and fix masks
//!   2. Verify every initial covariance is positive-definite
//!   3. Open diagnostic logs (best effort)
//!   4. Dispatch: likelihood-only / single-pass / full EM
//!   5. Split-and-merge search when requested and K ≥ 3
//!   6. Report

use deconv_math::{cholesky_factor, SimpleRng};
use deconv_types::{
    Dataset, DeconvError, DeconvResult, FitConfig, FitReport, FitStatus, FixMasks, Mixture,
};

use crate::diaglog::DiagnosticLog;
use crate::driver::{run_em, EmStepLog};
use crate::estep::projected_estep;
use crate::splitmerge::{split_merge_search, SnmRecord};
use crate::workspace::EmWorkspace;

/// Projected-EM deconvolution engine.
///
/// Owns the configuration, the split-perturbation RNG, and the
/// in-memory observability logs. One engine can run several fits; the
/// RNG stream continues across them, so reproducing a run means
/// reproducing the engine construction and call sequence.
pub struct DeconvEngine {
    pub cfg: FitConfig,
    rng: SimpleRng,
    status: FitStatus,
    pub step_log: Vec<EmStepLog>,
    pub snm_log: Vec<SnmRecord>,
}

impl DeconvEngine {
    /// Engine with an RNG seeded from `cfg.seed`.
    pub fn new(cfg: FitConfig) -> DeconvResult<Self> {
        cfg.validate()?;
        let rng = SimpleRng::new(cfg.seed);
        Ok(Self {
            cfg,
            rng,
            status: FitStatus::Init,
            step_log: Vec::new(),
            snm_log: Vec::new(),
        })
    }

    /// Engine with a caller-built RNG (ignores `cfg.seed`).
    pub fn with_rng(cfg: FitConfig, rng: SimpleRng) -> DeconvResult<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            rng,
            status: FitStatus::Init,
            step_log: Vec::new(),
            snm_log: Vec::new(),
        })
    }

    pub fn status(&self) -> FitStatus {
        self.status
    }

    // ------------------------------------------------------------------
    // Fitting
    // ------------------------------------------------------------------

    /// Fit `mix` to `data` in place.
    ///
    /// All validation happens before the mixture is touched, so on a
    /// validation error the caller's mixture is exactly as passed.
    /// Numerical failures mid-run surface as errors with the engine
    /// status set to `Failed`.
    pub fn fit(&mut self, data: &Dataset, mix: &mut Mixture) -> DeconvResult<FitReport> {
        match self.fit_inner(data, mix) {
            Ok(report) => Ok(report),
            Err(e) => {
                self.status = FitStatus::Failed;
                log::error!("fit failed: {e}");
                Err(e)
            }
        }
    }

    /// Pure variant of `fit`: the input mixture is left untouched and
    /// the fitted clone is returned alongside the report.
    pub fn fit_cloned(
        &mut self,
        data: &Dataset,
        mix: &Mixture,
    ) -> DeconvResult<(Mixture, FitReport)> {
        let mut fitted = mix.clone();
        let report = self.fit(data, &mut fitted)?;
        Ok((fitted, report))
    }

    fn fit_inner(&mut self, data: &Dataset, mix: &mut Mixture) -> DeconvResult<FitReport> {
        mix.validate()?;
        if mix.dim != data.dx() {
            return Err(DeconvError::ShapeMismatch(format!(
                "mixture dimension {} does not match dataset latent dimension {}",
                mix.dim,
                data.dx()
            )));
        }
        let dx = mix.dim;
        let k = mix.k();
        let mut chol_scratch = vec![0.0; dx * dx];
        for (j, c) in mix.components.iter().enumerate() {
            if !cholesky_factor(&c.covar, dx, &mut chol_scratch) {
                return Err(DeconvError::SingularCovariance(format!(
                    "initial covariance of component {j} is not positive-definite"
                )));
            }
        }
        let mut masks =
            FixMasks::broadcast(&self.cfg.fix_amp, &self.cfg.fix_mean, &self.cfg.fix_covar, k)?;

        self.status = FitStatus::Iterating;
        self.step_log.clear();
        self.snm_log.clear();

        if self.cfg.likelihood_only {
            let mut ws = EmWorkspace::new(data.len(), k, data.dx(), data.dy(), false);
            let obj = projected_estep(data, mix, &mut ws, false)?;
            if !obj.is_finite() {
                return Err(DeconvError::NonFiniteValue(format!(
                    "average log-likelihood is {obj}"
                )));
            }
            self.status = FitStatus::Converged;
            return Ok(FitReport {
                avg_log_likelihood: obj,
                status: FitStatus::Converged,
                iterations: 0,
                split_merge_accepted: 0,
            });
        }

        let want_snm = self.cfg.split_merge_depth > 0 || self.cfg.use_maximum_depth;
        let user_masks = masks.clone();
        let mut ws = EmWorkspace::new(data.len(), k, data.dx(), data.dy(), want_snm);
        let mut diag = self
            .cfg
            .diagnostic_log_basename
            .as_deref()
            .map(DiagnosticLog::open);

        let outcome = run_em(
            data,
            mix,
            &mut masks,
            self.cfg.tol,
            self.cfg.max_iter,
            self.cfg.w,
            &mut ws,
            diag.as_mut(),
            Some(&mut self.step_log),
        )?;
        self.status = outcome.status;

        let mut final_obj = outcome.avg_log_likelihood;
        let mut accepted = 0;
        if want_snm && outcome.status == FitStatus::Converged {
            if k < 3 {
                log::info!("split-and-merge needs at least three components; skipping (K = {k})");
            } else {
                let (obj, acc) = split_merge_search(
                    data,
                    mix,
                    &user_masks,
                    &self.cfg,
                    final_obj,
                    &mut ws,
                    &mut self.rng,
                    diag.as_mut(),
                    &mut self.snm_log,
                )?;
                final_obj = obj;
                accepted = acc;
            }
        }

        Ok(FitReport {
            avg_log_likelihood: final_obj,
            status: self.status,
            iterations: outcome.iterations,
            split_merge_accepted: accepted,
        })
    }
}
