// ─────────────────────────────────────────────────────────────────────
// Extreme Deconvolution — Projected E-Step
// ─────────────────────────────────────────────────────────────────────
//! The expectation pass: per-sample marginal log-densities under each
//! component after projection and noise convolution, log-domain
//! responsibilities, and (optionally) the conditional latent moments
//! folded into the M-step accumulators.

use deconv_math::{logsumexp, mat_mul, mat_mul_nt, mat_vec, spd_inverse_logdet};
use deconv_types::{Dataset, DeconvError, DeconvResult, Mixture, NoiseView};

use crate::workspace::EmWorkspace;

const LN_2PI: f64 = 1.837_877_066_409_345_3;

/// One expectation pass over the dataset.
///
/// Returns the weighted average log-likelihood
/// `Σ_i w_i·ln p(y_i) / Σ_i w_i`, accumulated left to right so the
/// result is bit-reproducible for a given dataset and mixture. Writes
/// the log-responsibility matrix (and per-component log-densities when
/// the workspace carries that buffer); with `accumulate` set it also
/// fills the per-component moment accumulators consumed by the M-step.
///
/// Samples with weight zero contribute to nothing.
pub fn projected_estep(
    data: &Dataset,
    mix: &Mixture,
    ws: &mut EmWorkspace,
    accumulate: bool,
) -> DeconvResult<f64> {
    let n = data.len();
    let k = mix.k();
    let dx = data.dx();
    let dy = data.dy();

    for (j, c) in mix.components.iter().enumerate() {
        ws.lnalpha[j] = c.alpha.ln();
    }
    if accumulate {
        ws.moments.reset();
    }

    let mut obj_acc = 0.0;
    for i in 0..n {
        let y = data.y(i);
        let proj = data.projection(i);
        let lw = data.log_weight(i);
        let wi = lw.exp();

        for (j, c) in mix.components.iter().enumerate() {
            // T = A Σ Aᵀ + R and the projected mean; identity
            // projections skip the A products entirely.
            match proj {
                Some(a) => {
                    mat_mul(a, &c.covar, dy, dx, dx, &mut ws.av);
                    mat_mul_nt(&ws.av, a, dy, dx, dy, &mut ws.t);
                    mat_vec(a, &c.mean, dy, dx, &mut ws.proj_mean);
                }
                None => {
                    ws.t.copy_from_slice(&c.covar);
                    ws.proj_mean.copy_from_slice(&c.mean);
                }
            }
            match data.noise(i) {
                NoiseView::Diagonal(d) => {
                    for r in 0..dy {
                        ws.t[r * dy + r] += d[r];
                    }
                }
                NoiseView::Dense(m) => {
                    for (tv, mv) in ws.t.iter_mut().zip(m) {
                        *tv += *mv;
                    }
                }
            }
            for r in 0..dy {
                ws.delta[r] = y[r] - ws.proj_mean[r];
            }

            let logdet = spd_inverse_logdet(&ws.t, dy, &mut ws.tchol, &mut ws.tinv).ok_or_else(
                || {
                    DeconvError::SingularCovariance(format!(
                        "projected covariance T is not positive-definite \
                         (sample {i}, component {j})"
                    ))
                },
            )?;

            let mut quad = 0.0;
            for r in 0..dy {
                let mut s = 0.0;
                for c2 in 0..dy {
                    s += ws.tinv[r * dy + c2] * ws.delta[c2];
                }
                quad += ws.delta[r] * s;
            }
            let log_norm = -0.5 * (dy as f64 * LN_2PI + logdet + quad);
            ws.row[j] = ws.lnalpha[j] + log_norm;
            if let Some(lc) = ws.logcomp.as_mut() {
                lc[i * k + j] = log_norm;
            }

            if accumulate && wi > 0.0 {
                // Latent gain Σ Aᵀ T⁻¹; Σ T⁻¹ on the identity path.
                match proj {
                    Some(a) => {
                        mat_mul_nt(&c.covar, a, dx, dx, dy, &mut ws.vat);
                        mat_mul(&ws.vat, &ws.tinv, dx, dy, dy, &mut ws.gain);
                    }
                    None => {
                        mat_mul(&c.covar, &ws.tinv, dx, dx, dx, &mut ws.gain);
                    }
                }
                // b = μ + gain·δ
                let b = &mut ws.bs[j * dx..(j + 1) * dx];
                mat_vec(&ws.gain, &ws.delta, dx, dy, b);
                for (bv, mv) in b.iter_mut().zip(&c.mean) {
                    *bv += *mv;
                }
                // B = Σ − gain·(A Σ)
                let bm = &mut ws.bmats[j * dx * dx..(j + 1) * dx * dx];
                match proj {
                    Some(_) => mat_mul(&ws.gain, &ws.av, dx, dy, dx, bm),
                    None => mat_mul(&ws.gain, &c.covar, dx, dx, dx, bm),
                }
                for (bv, sv) in bm.iter_mut().zip(&c.covar) {
                    *bv = *sv - *bv;
                }
            }
        }

        let marginal = logsumexp(&ws.row);
        if wi > 0.0 {
            obj_acc += wi * marginal;
        }
        for j in 0..k {
            ws.logq[i * k + j] = ws.row[j] - marginal;
        }

        if accumulate && wi > 0.0 {
            for j in 0..k {
                let q = (ws.logq[i * k + j] + lw).exp();
                if q == 0.0 {
                    continue;
                }
                ws.moments.qsum[j] += q;
                let b = &ws.bs[j * dx..(j + 1) * dx];
                let macc = &mut ws.moments.mean_acc[j * dx..(j + 1) * dx];
                for a in 0..dx {
                    macc[a] += q * b[a];
                }
                let bm = &ws.bmats[j * dx * dx..(j + 1) * dx * dx];
                let sacc = &mut ws.moments.sec_acc[j * dx * dx..(j + 1) * dx * dx];
                for a in 0..dx {
                    for b2 in 0..dx {
                        sacc[a * dx + b2] += q * (bm[a * dx + b2] + b[a] * b[b2]);
                    }
                }
            }
        }
    }

    Ok(obj_acc / data.total_weight())
}
