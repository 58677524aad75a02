// ─────────────────────────────────────────────────────────────────────
// Extreme Deconvolution — Regularized M-Step
// ─────────────────────────────────────────────────────────────────────
//! The maximization pass: amplitudes, means, and covariances from the
//! accumulated conditional moments, honoring per-component fix flags
//! and the optional covariance regularization.

use deconv_math::symmetrize;
use deconv_types::{FixMasks, Mixture};

use crate::workspace::Moments;

/// One maximization pass over the mixture.
///
/// Components whose posterior mass is effectively zero are frozen in
/// the working masks (all three flags) and their parameters left
/// untouched. Free amplitudes are renormalized against fixed ones so
/// the mixture keeps summing to 1. The covariance update blends the
/// maximum-likelihood estimate toward `w·I`; at `w = 0` it is the exact
/// maximum-likelihood update.
pub fn regularized_mstep(
    mix: &mut Mixture,
    moments: &Moments,
    masks: &mut FixMasks,
    w: f64,
    total_weight: f64,
) {
    let k = mix.k();
    let dx = mix.dim;

    for j in 0..k {
        if moments.qsum[j] <= f64::MIN_POSITIVE && !masks.fully_fixed(j) {
            log::warn!("component {j} received no posterior mass; freezing its parameters");
            masks.freeze(j);
        }
    }

    for j in 0..k {
        if !masks.amp[j] {
            mix.components[j].alpha = moments.qsum[j] / total_weight;
        }
    }
    if masks.amp.iter().any(|&f| f) {
        let fixed_mass: f64 = (0..k)
            .filter(|&j| masks.amp[j])
            .map(|j| mix.components[j].alpha)
            .sum();
        let free_mass: f64 = (0..k)
            .filter(|&j| !masks.amp[j])
            .map(|j| mix.components[j].alpha)
            .sum();
        if free_mass > 0.0 {
            let scale = (1.0 - fixed_mass) / free_mass;
            for j in 0..k {
                if !masks.amp[j] {
                    mix.components[j].alpha *= scale;
                }
            }
        }
    }

    // Means first: the covariance update reads the post-update mean
    // (the old mean when the mean is fixed).
    for j in 0..k {
        let q = moments.qsum[j];
        let c = &mut mix.components[j];
        if !masks.mean[j] {
            let m = &moments.mean_acc[j * dx..(j + 1) * dx];
            for a in 0..dx {
                c.mean[a] = m[a] / q;
            }
        }
        if !masks.covar[j] {
            let m = &moments.mean_acc[j * dx..(j + 1) * dx];
            let s = &moments.sec_acc[j * dx * dx..(j + 1) * dx * dx];
            for a in 0..dx {
                for b in 0..dx {
                    let raw = (s[a * dx + b] - c.mean[a] * m[b] - m[a] * c.mean[b]
                        + q * c.mean[a] * c.mean[b])
                        / q;
                    c.covar[a * dx + b] = if w > 0.0 {
                        let target = if a == b { w } else { 0.0 };
                        (q * raw + target) / (q + w)
                    } else {
                        raw
                    };
                }
            }
            symmetrize(&mut c.covar, dx);
        }
    }
}
