// ─────────────────────────────────────────────────────────────────────
// Extreme Deconvolution — Convergence Loop
// ─────────────────────────────────────────────────────────────────────
//! The EM driver: alternate expectation and maximization passes until
//! the objective stops improving, the iteration cap is hit, or a
//! numerical failure aborts the run.

use serde::{Deserialize, Serialize};

use deconv_math::all_finite;
use deconv_types::{Dataset, DeconvError, DeconvResult, FitStatus, FixMasks, Mixture};

use crate::diaglog::DiagnosticLog;
use crate::estep::projected_estep;
use crate::mstep::regularized_mstep;
use crate::workspace::EmWorkspace;

/// One entry of the in-memory iteration log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmStepLog {
    pub iteration: u64,
    pub avg_log_likelihood: f64,
    /// Objective change from the previous pass (0 on the first).
    pub delta: f64,
}

/// Terminal state of one EM run.
#[derive(Debug, Clone, Copy)]
pub struct EmOutcome {
    pub avg_log_likelihood: f64,
    pub status: FitStatus,
    pub iterations: u64,
}

/// Run EM to convergence on `mix`.
///
/// `masks` is the working copy; starved components get frozen into it.
/// Per pass: E-step, objective finiteness check, drop check (only
/// meaningful at `w = 0`, where EM guarantees monotone ascent),
/// convergence check against `tol`, diagnostic record, iteration cap,
/// M-step, parameter finiteness check. `max_iter = 0` performs exactly
/// one E-step and reports `MaxIterReached` with the mixture untouched.
#[allow(clippy::too_many_arguments)]
pub fn run_em(
    data: &Dataset,
    mix: &mut Mixture,
    masks: &mut FixMasks,
    tol: f64,
    max_iter: u64,
    w: f64,
    ws: &mut EmWorkspace,
    mut diag: Option<&mut DiagnosticLog>,
    mut step_log: Option<&mut Vec<EmStepLog>>,
) -> DeconvResult<EmOutcome> {
    let mut prev: Option<f64> = None;
    let mut iterations: u64 = 0;

    loop {
        let obj = projected_estep(data, mix, ws, true)?;
        if !obj.is_finite() {
            return Err(DeconvError::NonFiniteValue(format!(
                "average log-likelihood is {obj} at iteration {iterations}"
            )));
        }

        let (converged, delta) = ascent_check(prev, obj, tol, w, iterations)?;

        if let Some(d) = diag.as_deref_mut() {
            d.loglike_line(iterations, obj);
        }
        if let Some(sl) = step_log.as_deref_mut() {
            sl.push(EmStepLog {
                iteration: iterations,
                avg_log_likelihood: obj,
                delta,
            });
        }

        if converged {
            return Ok(EmOutcome {
                avg_log_likelihood: obj,
                status: FitStatus::Converged,
                iterations,
            });
        }
        if iterations >= max_iter {
            return Ok(EmOutcome {
                avg_log_likelihood: obj,
                status: FitStatus::MaxIterReached,
                iterations,
            });
        }

        prev = Some(obj);
        iterations += 1;
        regularized_mstep(mix, &ws.moments, masks, w, data.total_weight());

        for (j, c) in mix.components.iter().enumerate() {
            if !c.alpha.is_finite() || !all_finite(&c.mean) || !all_finite(&c.covar) {
                return Err(DeconvError::NonFiniteValue(format!(
                    "component {j} parameters became non-finite after M-step {iterations}"
                )));
            }
        }
    }
}

/// Ascent bookkeeping for one pass: the objective change against the
/// previous pass and whether it is below `tol`.
///
/// At `w = 0` the M-step is an exact maximum-likelihood update and EM
/// ascends monotonically, so a drop beyond `10 · tol` of roundoff slack
/// is reported as `LikelihoodDrop`; with `w > 0` the maximized
/// objective differs from the reported one and the guard is suspended.
/// The first pass has no predecessor and reports a zero delta.
fn ascent_check(
    prev: Option<f64>,
    obj: f64,
    tol: f64,
    w: f64,
    iterations: u64,
) -> DeconvResult<(bool, f64)> {
    let p = match prev {
        Some(p) => p,
        None => return Ok((false, 0.0)),
    };
    let delta = obj - p;
    if w == 0.0 && obj < p - 10.0 * tol {
        return Err(DeconvError::LikelihoodDrop(format!(
            "average log-likelihood fell from {p} to {obj} at iteration {iterations}"
        )));
    }
    Ok((delta < tol, delta))
}
