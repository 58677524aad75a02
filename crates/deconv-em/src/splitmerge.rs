// ─────────────────────────────────────────────────────────────────────
// Extreme Deconvolution — Split-and-Merge Search
// ─────────────────────────────────────────────────────────────────────
//! Escape route from poor EM local optima: rank (split, merge-pair)
//! candidate triples from the converged responsibilities, perturb a
//! cloned mixture, re-run EM on the clone, and commit only strict
//! improvements of the objective.

use serde::{Deserialize, Serialize};

use deconv_math::{jacobi_eigen_symmetric, SimpleRng};
use deconv_types::{
    Component, Dataset, DeconvError, DeconvResult, FitConfig, FixMasks, Mixture,
};

use crate::diaglog::DiagnosticLog;
use crate::driver::run_em;
use crate::workspace::EmWorkspace;

/// One accepted split-merge transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnmRecord {
    pub split: usize,
    pub merge_a: usize,
    pub merge_b: usize,
    /// Converged objective after the transition.
    pub avg_log_likelihood: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    split: usize,
    merge_a: usize,
    merge_b: usize,
}

/// Greedy candidate search over split-merge triples.
///
/// Requires the workspace to hold the responsibilities of a converged
/// E-step on `mix` (the base run leaves exactly that behind). Returns
/// the final objective and the number of accepted transitions. The
/// budget counts candidate evaluations; each acceptance re-ranks from
/// the new state, and the search stops when a full pass accepts nothing
/// or the budget runs out. A mixture with fewer than three components
/// admits no candidate triple and comes back unchanged.
#[allow(clippy::too_many_arguments)]
pub fn split_merge_search(
    data: &Dataset,
    mix: &mut Mixture,
    user_masks: &FixMasks,
    cfg: &FitConfig,
    base_obj: f64,
    ws: &mut EmWorkspace,
    rng: &mut SimpleRng,
    mut diag: Option<&mut DiagnosticLog>,
    snm_log: &mut Vec<SnmRecord>,
) -> DeconvResult<(f64, usize)> {
    let k = mix.k();
    if k < 3 {
        return Ok((base_obj, 0));
    }
    let mut budget = if cfg.use_maximum_depth {
        k * (k - 1) * (k - 2) / 2
    } else {
        cfg.split_merge_depth
    };
    let mut best_obj = base_obj;
    let mut accepted = 0usize;

    'rounds: loop {
        let candidates = rank_candidates(data, k, user_masks, ws);
        if candidates.is_empty() {
            break;
        }
        let mut accepted_this_round = false;
        for cand in candidates {
            if budget == 0 {
                break 'rounds;
            }
            budget -= 1;
            match evaluate_candidate(data, mix, user_masks, cfg, cand, ws, rng) {
                Ok((trial, trial_obj)) if trial_obj > best_obj => {
                    *mix = trial;
                    best_obj = trial_obj;
                    accepted += 1;
                    log::info!(
                        "split-merge accepted: split {} merge ({}, {}), \
                         avg log-likelihood {trial_obj}",
                        cand.split,
                        cand.merge_a,
                        cand.merge_b
                    );
                    if let Some(d) = diag.as_deref_mut() {
                        d.snm_line(cand.split, cand.merge_a, cand.merge_b, trial_obj);
                    }
                    snm_log.push(SnmRecord {
                        split: cand.split,
                        merge_a: cand.merge_a,
                        merge_b: cand.merge_b,
                        avg_log_likelihood: trial_obj,
                    });
                    accepted_this_round = true;
                    // The accepted run's last E-step left its
                    // responsibilities in the workspace; re-rank on them.
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!(
                        "split-merge candidate (split {}, merge {}, {}) rejected: {e}",
                        cand.split,
                        cand.merge_a,
                        cand.merge_b
                    );
                }
            }
        }
        if !accepted_this_round {
            break;
        }
    }

    Ok((best_obj, accepted))
}

/// Rank candidate triples from the stored responsibilities.
///
/// Merge pairs are ordered by posterior overlap
/// `J_merge(k,l) = Σ_i w_i q_ik q_il`; within a pair, split targets by
/// the local divergence between the responsibility-weighted empirical
/// density and the component's own density,
/// `J_split(s) = Σ_i f_is (ln f_is − ln p_s(y_i))` with
/// `f_is = w_i q_is / Σ_i w_i q_is`. Components carrying any caller fix
/// flag do not participate.
fn rank_candidates(
    data: &Dataset,
    k: usize,
    user_masks: &FixMasks,
    ws: &EmWorkspace,
) -> Vec<Candidate> {
    let logcomp = match ws.logcomp.as_ref() {
        Some(lc) => lc,
        None => return Vec::new(),
    };
    let free: Vec<usize> = (0..k).filter(|&j| !user_masks.any_fixed(j)).collect();
    if free.len() < 3 {
        return Vec::new();
    }

    let n = data.len();
    let wts: Vec<f64> = (0..n).map(|i| data.log_weight(i).exp()).collect();
    let q: Vec<f64> = ws.logq.iter().map(|lq| lq.exp()).collect();

    let mut jmerge: Vec<(f64, usize, usize)> = Vec::new();
    for (ia, &a) in free.iter().enumerate() {
        for &b in &free[ia + 1..] {
            let mut s = 0.0;
            for i in 0..n {
                if wts[i] > 0.0 {
                    s += wts[i] * q[i * k + a] * q[i * k + b];
                }
            }
            jmerge.push((s, a, b));
        }
    }
    jmerge.sort_by(|x, y| y.0.total_cmp(&x.0));

    let mut jsplit = vec![f64::NEG_INFINITY; k];
    for &s in &free {
        let mut qtot = 0.0;
        for i in 0..n {
            if wts[i] > 0.0 {
                qtot += wts[i] * q[i * k + s];
            }
        }
        if qtot <= 0.0 {
            continue;
        }
        let ln_qtot = qtot.ln();
        let mut kl = 0.0;
        for i in 0..n {
            if wts[i] == 0.0 {
                continue;
            }
            let lf = data.log_weight(i) + ws.logq[i * k + s] - ln_qtot;
            let f = lf.exp();
            if f > 0.0 {
                kl += f * (lf - logcomp[i * k + s]);
            }
        }
        jsplit[s] = kl;
    }

    let mut out = Vec::new();
    for &(_, a, b) in &jmerge {
        let mut splits: Vec<usize> = free
            .iter()
            .copied()
            .filter(|&s| s != a && s != b)
            .collect();
        splits.sort_by(|&x, &y| jsplit[y].total_cmp(&jsplit[x]));
        for s in splits {
            out.push(Candidate {
                split: s,
                merge_a: a,
                merge_b: b,
            });
        }
    }
    out
}

/// Perturb and re-optimize one candidate on a clone of the mixture.
///
/// Partial EM first (everything but the touched triple pinned), then a
/// full EM under the caller's masks. Errors reject the candidate.
fn evaluate_candidate(
    data: &Dataset,
    mix: &Mixture,
    user_masks: &FixMasks,
    cfg: &FitConfig,
    cand: Candidate,
    ws: &mut EmWorkspace,
    rng: &mut SimpleRng,
) -> DeconvResult<(Mixture, f64)> {
    let mut trial = mix.clone();
    splitnmerge_gauss(&mut trial, cand, rng)?;

    let mut partial_masks = user_masks.clone();
    for j in 0..trial.k() {
        if j != cand.split && j != cand.merge_a && j != cand.merge_b {
            partial_masks.freeze(j);
        }
    }
    run_em(
        data,
        &mut trial,
        &mut partial_masks,
        cfg.tol,
        cfg.max_iter,
        cfg.w,
        ws,
        None,
        None,
    )?;

    let mut full_masks = user_masks.clone();
    let out = run_em(
        data,
        &mut trial,
        &mut full_masks,
        cfg.tol,
        cfg.max_iter,
        cfg.w,
        ws,
        None,
        None,
    )?;
    Ok((trial, out.avg_log_likelihood))
}

/// Apply the candidate's perturbation in place: the moment-matched
/// merge lands in slot `merge_a`; the split halves land in slots
/// `split` and `merge_b`.
fn splitnmerge_gauss(mix: &mut Mixture, cand: Candidate, rng: &mut SimpleRng) -> DeconvResult<()> {
    let dx = mix.dim;
    let merged = merged_component(
        &mix.components[cand.merge_a],
        &mix.components[cand.merge_b],
        dx,
    );
    let (half_a, half_b) = split_component(&mix.components[cand.split], dx, rng)?;
    mix.components[cand.merge_a] = merged;
    mix.components[cand.split] = half_a;
    mix.components[cand.merge_b] = half_b;
    Ok(())
}

/// Moment-matched merge of two components: combined amplitude,
/// amplitude-weighted mean, and amplitude-weighted covariance with the
/// mean-spread outer products folded in.
fn merged_component(ca: &Component, cb: &Component, dx: usize) -> Component {
    let alpha = ca.alpha + cb.alpha;
    let (wa, wb) = if alpha > 0.0 {
        (ca.alpha / alpha, cb.alpha / alpha)
    } else {
        (0.5, 0.5)
    };
    let mut mean = vec![0.0; dx];
    for i in 0..dx {
        mean[i] = wa * ca.mean[i] + wb * cb.mean[i];
    }
    let mut covar = vec![0.0; dx * dx];
    for i in 0..dx {
        for j in 0..dx {
            let da = (ca.mean[i] - mean[i]) * (ca.mean[j] - mean[j]);
            let db = (cb.mean[i] - mean[i]) * (cb.mean[j] - mean[j]);
            covar[i * dx + j] =
                wa * (ca.covar[i * dx + j] + da) + wb * (cb.covar[i * dx + j] + db);
        }
    }
    Component { alpha, mean, covar }
}

/// Split one component into two halves: half the amplitude each, means
/// displaced by ±ε along the covariance's principal directions with
/// standard-normal magnitudes, isotropic covariance `det(Σ)^{1/dx}·I`.
fn split_component(
    cs: &Component,
    dx: usize,
    rng: &mut SimpleRng,
) -> DeconvResult<(Component, Component)> {
    let mut scratch = cs.covar.clone();
    let mut eigvals = vec![0.0; dx];
    let mut eigvecs = vec![0.0; dx * dx];
    jacobi_eigen_symmetric(&mut scratch, dx, &mut eigvals, &mut eigvecs);

    let mut log_det = 0.0;
    for &lam in &eigvals {
        if lam <= 0.0 {
            return Err(DeconvError::SingularCovariance(
                "split target covariance is not positive-definite".into(),
            ));
        }
        log_det += lam.ln();
    }
    let iso = (log_det / dx as f64).exp();

    let mut eta = vec![0.0; dx];
    rng.fill_normal(&mut eta);
    let mut eps = vec![0.0; dx];
    for j in 0..dx {
        let scale = 0.5 * eta[j] * eigvals[j].sqrt();
        for i in 0..dx {
            eps[i] += scale * eigvecs[i * dx + j];
        }
    }

    let half_alpha = 0.5 * cs.alpha;
    let mut mean_a = vec![0.0; dx];
    let mut mean_b = vec![0.0; dx];
    for i in 0..dx {
        mean_a[i] = cs.mean[i] + eps[i];
        mean_b[i] = cs.mean[i] - eps[i];
    }
    Ok((
        Component::spherical(half_alpha, mean_a, iso),
        Component::spherical(half_alpha, mean_b, iso),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Perturbation ────────────────────────────────────────────────

    #[test]
    fn test_merged_component_moment_match() {
        let ca = Component::new(0.25, vec![0.0], vec![1.0]);
        let cb = Component::new(0.75, vec![4.0], vec![2.0]);
        let m = merged_component(&ca, &cb, 1);
        assert!((m.alpha - 1.0).abs() < 1e-15);
        assert!((m.mean[0] - 3.0).abs() < 1e-14);
        // 0.25·(1 + 9) + 0.75·(2 + 1) = 2.5 + 2.25
        assert!((m.covar[0] - 4.75).abs() < 1e-13);
    }

    #[test]
    fn test_merged_component_zero_mass_uses_even_weights() {
        let ca = Component::new(0.0, vec![1.0], vec![1.0]);
        let cb = Component::new(0.0, vec![3.0], vec![1.0]);
        let m = merged_component(&ca, &cb, 1);
        assert_eq!(m.alpha, 0.0);
        assert!((m.mean[0] - 2.0).abs() < 1e-14);
    }

    #[test]
    fn test_split_component_geometry() {
        let cs = Component::new(0.6, vec![1.0, -1.0], vec![4.0, 0.0, 0.0, 1.0]);
        let mut rng = SimpleRng::new(7);
        let (a, b) = split_component(&cs, 2, &mut rng).unwrap();
        assert!((a.alpha - 0.3).abs() < 1e-15);
        assert!((b.alpha - 0.3).abs() < 1e-15);
        // Halves sit symmetrically around the original mean
        for i in 0..2 {
            assert!((0.5 * (a.mean[i] + b.mean[i]) - cs.mean[i]).abs() < 1e-12);
        }
        // Isotropic covariance at det(Σ)^{1/2} = 2
        assert!((a.covar[0] - 2.0).abs() < 1e-10);
        assert!((a.covar[3] - 2.0).abs() < 1e-10);
        assert_eq!(a.covar[1], 0.0);
        assert_eq!(b.covar[0], a.covar[0]);
    }

    #[test]
    fn test_split_component_rejects_indefinite() {
        let cs = Component::new(0.5, vec![0.0, 0.0], vec![1.0, 2.0, 2.0, 1.0]);
        let mut rng = SimpleRng::new(7);
        assert!(matches!(
            split_component(&cs, 2, &mut rng),
            Err(DeconvError::SingularCovariance(_))
        ));
    }

    #[test]
    fn test_splitnmerge_slot_layout() {
        let mut mix = Mixture::new(
            1,
            vec![
                Component::new(0.2, vec![-3.0], vec![1.0]),
                Component::new(0.3, vec![0.0], vec![1.0]),
                Component::new(0.5, vec![3.0], vec![1.0]),
            ],
        );
        let mut rng = SimpleRng::new(11);
        let cand = Candidate {
            split: 0,
            merge_a: 1,
            merge_b: 2,
        };
        splitnmerge_gauss(&mut mix, cand, &mut rng).unwrap();
        // Slot 1 holds the merge of old 1 and 2
        assert!((mix.components[1].alpha - 0.8).abs() < 1e-15);
        // Slots 0 and 2 are the halves of old 0
        assert!((mix.components[0].alpha - 0.1).abs() < 1e-15);
        assert!((mix.components[2].alpha - 0.1).abs() < 1e-15);
        let total: f64 = mix.components.iter().map(|c| c.alpha).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    // ── Ranking ─────────────────────────────────────────────────────

    fn ranking_fixture() -> (Dataset, EmWorkspace) {
        use deconv_types::NoiseCovar;
        let data = Dataset::new(1, vec![0.0, 0.0], NoiseCovar::Diagonal(vec![0.1, 0.1])).unwrap();
        let mut ws = EmWorkspace::new(2, 3, 1, 1, true);
        // Sample 0 shared by components 0 and 1; sample 1 mostly too.
        let rows: [[f64; 3]; 2] = [[0.5, 0.5, 0.0], [0.4, 0.4, 0.2]];
        for (i, row) in rows.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                ws.logq[i * 3 + j] = v.ln();
            }
        }
        if let Some(lc) = ws.logcomp.as_mut() {
            lc.fill(-1.0);
        }
        (data, ws)
    }

    #[test]
    fn test_rank_candidates_orders_by_overlap() {
        let (data, ws) = ranking_fixture();
        let masks = FixMasks::all_free(3);
        let cands = rank_candidates(&data, 3, &masks, &ws);
        assert_eq!(cands.len(), 3, "three pairs, one split each");
        // Components 0 and 1 overlap most, leaving 2 as the split
        assert_eq!(
            cands[0],
            Candidate {
                split: 2,
                merge_a: 0,
                merge_b: 1
            }
        );
    }

    #[test]
    fn test_rank_candidates_excludes_fixed_components() {
        let (data, ws) = ranking_fixture();
        let masks = FixMasks::broadcast(&[false, false, true], &[], &[], 3).unwrap();
        assert!(
            rank_candidates(&data, 3, &masks, &ws).is_empty(),
            "fewer than three free components leaves no triple"
        );
    }

    // ── Search ──────────────────────────────────────────────────────

    #[test]
    fn test_search_below_three_components_is_noop() {
        use deconv_types::NoiseCovar;
        let data = Dataset::new(1, vec![0.0, 1.0], NoiseCovar::Diagonal(vec![0.1, 0.1])).unwrap();
        let cfg = FitConfig {
            use_maximum_depth: true,
            ..FitConfig::default()
        };
        let mut rng = SimpleRng::new(3);
        let mut snm_log = Vec::new();
        for k in 1..3usize {
            let comps: Vec<Component> = (0..k)
                .map(|j| Component::new(1.0 / k as f64, vec![j as f64], vec![1.0]))
                .collect();
            let mut mix = Mixture::new(1, comps);
            let masks = FixMasks::all_free(k);
            let mut ws = EmWorkspace::new(2, k, 1, 1, true);
            let before = mix.components[0].mean[0].to_bits();
            let (obj, accepted) = split_merge_search(
                &data, &mut mix, &masks, &cfg, -1.25, &mut ws, &mut rng, None, &mut snm_log,
            )
            .unwrap();
            assert_eq!(obj.to_bits(), (-1.25f64).to_bits());
            assert_eq!(accepted, 0);
            assert_eq!(mix.components[0].mean[0].to_bits(), before);
        }
        assert!(snm_log.is_empty());
    }

    #[test]
    fn test_snm_record_serializes() {
        let r = SnmRecord {
            split: 2,
            merge_a: 0,
            merge_b: 1,
            avg_log_likelihood: -1.5,
        };
        let json = serde_json::to_string(&r).unwrap();
        let back: SnmRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.split, 2);
        assert_eq!(back.merge_b, 1);
    }
}
