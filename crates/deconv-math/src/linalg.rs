// ─────────────────────────────────────────────────────────────────────
// Extreme Deconvolution — Small Dense Linear Algebra
// ─────────────────────────────────────────────────────────────────────
//! Cholesky factorization, triangular solves, symmetric inverse and
//! log-determinant for the small covariance blocks of the E-step, plus
//! a cyclic Jacobi eigensolver for principal covariance directions.
//!
//! All matrices are flat row-major slices. Dimensions here are the
//! observation/latent dimensions of a mixture problem (single digits,
//! occasionally tens), so cache-oblivious O(n³) loops are the right tool
//! and every routine writes into caller-provided buffers.

/// Lower Cholesky factor of a symmetric positive-definite matrix.
///
/// `a` is n×n symmetric; `l` receives the lower-triangular factor with
/// zeroed upper triangle. Returns `false` when a pivot falls below the
/// positive-definiteness tolerance (or is NaN), leaving `l` unspecified.
pub fn cholesky_factor(a: &[f64], n: usize, l: &mut [f64]) -> bool {
    const PIVOT_TOL: f64 = 1e-13;

    for i in 0..n {
        for j in (i + 1)..n {
            l[i * n + j] = 0.0;
        }
    }

    for j in 0..n {
        let mut d = a[j * n + j];
        for k in 0..j {
            d -= l[j * n + k] * l[j * n + k];
        }
        // Relative pivot test; also rejects NaN
        let thresh = PIVOT_TOL * a[j * n + j].abs();
        if !(d > thresh) {
            return false;
        }
        let ljj = d.sqrt();
        l[j * n + j] = ljj;
        for i in (j + 1)..n {
            let mut s = a[i * n + j];
            for k in 0..j {
                s -= l[i * n + k] * l[j * n + k];
            }
            l[i * n + j] = s / ljj;
        }
    }
    true
}

/// Log-determinant of the factored matrix: 2 Σ ln L_ii.
pub fn cholesky_logdet(l: &[f64], n: usize) -> f64 {
    let mut s = 0.0;
    for i in 0..n {
        s += l[i * n + i].ln();
    }
    2.0 * s
}

/// Solve A x = b given the lower factor L (A = L Lᵀ).
///
/// Forward solve L z = b, then backward solve Lᵀ x = z; `x` may not
/// alias `b`.
pub fn cholesky_solve(l: &[f64], n: usize, b: &[f64], x: &mut [f64]) {
    for i in 0..n {
        let mut s = b[i];
        for k in 0..i {
            s -= l[i * n + k] * x[k];
        }
        x[i] = s / l[i * n + i];
    }
    for i in (0..n).rev() {
        let mut s = x[i];
        for k in (i + 1)..n {
            s -= l[k * n + i] * x[k];
        }
        x[i] = s / l[i * n + i];
    }
}

/// Full symmetric inverse from the lower factor L.
///
/// `l` is overwritten with L⁻¹ in the process; `inv` receives
/// A⁻¹ = L⁻ᵀ L⁻¹, exactly symmetric by construction.
pub fn cholesky_invert(l: &mut [f64], n: usize, inv: &mut [f64]) {
    // Invert L in place, column by column
    for j in 0..n {
        l[j * n + j] = 1.0 / l[j * n + j];
        for i in (j + 1)..n {
            let mut s = 0.0;
            for k in j..i {
                s += l[i * n + k] * l[k * n + j];
            }
            l[i * n + j] = -s / l[i * n + i];
        }
    }
    // A⁻¹[i][j] = Σ_{k≥max(i,j)} L⁻¹[k][i] L⁻¹[k][j]
    for i in 0..n {
        for j in i..n {
            let mut s = 0.0;
            for k in j..n {
                s += l[k * n + i] * l[k * n + j];
            }
            inv[i * n + j] = s;
            inv[j * n + i] = s;
        }
    }
}

/// Combined inverse + log-determinant of a symmetric positive-definite
/// matrix, the one kernel call on the E-step hot path.
///
/// `l` is factor scratch (destroyed). Returns `None` when `a` is not
/// positive-definite within tolerance.
pub fn spd_inverse_logdet(a: &[f64], n: usize, l: &mut [f64], inv: &mut [f64]) -> Option<f64> {
    if !cholesky_factor(a, n, l) {
        return None;
    }
    let logdet = cholesky_logdet(l, n);
    cholesky_invert(l, n, inv);
    Some(logdet)
}

/// C = A B with A m×k, B k×n, C m×n.
pub fn mat_mul(a: &[f64], b: &[f64], m: usize, k: usize, n: usize, out: &mut [f64]) {
    for i in 0..m {
        for j in 0..n {
            let mut s = 0.0;
            for p in 0..k {
                s += a[i * k + p] * b[p * n + j];
            }
            out[i * n + j] = s;
        }
    }
}

/// C = A Bᵀ with A m×k, B n×k, C m×n.
pub fn mat_mul_nt(a: &[f64], b: &[f64], m: usize, k: usize, n: usize, out: &mut [f64]) {
    for i in 0..m {
        for j in 0..n {
            let mut s = 0.0;
            for p in 0..k {
                s += a[i * k + p] * b[j * k + p];
            }
            out[i * n + j] = s;
        }
    }
}

/// out = A x with A m×n.
pub fn mat_vec(a: &[f64], x: &[f64], m: usize, n: usize, out: &mut [f64]) {
    for i in 0..m {
        let mut s = 0.0;
        for j in 0..n {
            s += a[i * n + j] * x[j];
        }
        out[i] = s;
    }
}

/// Force exact symmetry: a ← (a + aᵀ)/2.
pub fn symmetrize(a: &mut [f64], n: usize) {
    for i in 0..n {
        for j in (i + 1)..n {
            let v = 0.5 * (a[i * n + j] + a[j * n + i]);
            a[i * n + j] = v;
            a[j * n + i] = v;
        }
    }
}

/// True when every entry is finite (no NaN, no ±Inf).
pub fn all_finite(xs: &[f64]) -> bool {
    xs.iter().all(|v| v.is_finite())
}

/// Cyclic Jacobi eigendecomposition for a symmetric n×n matrix.
///
/// `a` is n×n row-major and is destroyed; its diagonal ends up holding
/// the eigenvalues.
/// `eigvals_out` receives the n eigenvalues (unsorted).
/// `v_out` receives the n×n eigenvector matrix (columns = eigenvectors).
///
/// Covariance blocks here are tiny, so plain cyclic sweeps converge in
/// a handful of passes and no threshold schedule is needed.
pub fn jacobi_eigen_symmetric(a: &mut [f64], n: usize, eigvals_out: &mut [f64], v_out: &mut [f64]) {
    const MAX_SWEEPS: usize = 50;
    const TOL: f64 = 1e-14;

    // Initialize V = I
    for i in 0..n {
        for j in 0..n {
            v_out[i * n + j] = if i == j { 1.0 } else { 0.0 };
        }
    }

    for _sweep in 0..MAX_SWEEPS {
        let mut max_off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                let v = a[p * n + q].abs();
                if v > max_off {
                    max_off = v;
                }
            }
        }
        if max_off < TOL {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[p * n + q];
                if apq == 0.0 {
                    continue;
                }

                let app = a[p * n + p];
                let aqq = a[q * n + q];
                let diff = aqq - app;

                let t = if diff.abs() < 1e-300 {
                    // Equal diagonal elements: rotate by π/4
                    if apq > 0.0 {
                        1.0
                    } else {
                        -1.0
                    }
                } else {
                    let tau = diff / (2.0 * apq);
                    // Smaller root for numerical stability
                    if tau >= 0.0 {
                        1.0 / (tau + (1.0 + tau * tau).sqrt())
                    } else {
                        -1.0 / (-tau + (1.0 + tau * tau).sqrt())
                    }
                };

                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = t * c;
                let tau_rot = s / (1.0 + c); // Rutishauser form

                a[p * n + p] -= t * apq;
                a[q * n + q] += t * apq;
                a[p * n + q] = 0.0;
                a[q * n + p] = 0.0;

                for r in 0..n {
                    if r == p || r == q {
                        continue;
                    }
                    let arp = a[r * n + p];
                    let arq = a[r * n + q];
                    a[r * n + p] = arp - s * (arq + tau_rot * arp);
                    a[p * n + r] = a[r * n + p];
                    a[r * n + q] = arq + s * (arp - tau_rot * arq);
                    a[q * n + r] = a[r * n + q];
                }

                for r in 0..n {
                    let vrp = v_out[r * n + p];
                    let vrq = v_out[r * n + q];
                    v_out[r * n + p] = vrp - s * (vrq + tau_rot * vrp);
                    v_out[r * n + q] = vrq + s * (vrp - tau_rot * vrq);
                }
            }
        }
    }

    for i in 0..n {
        eigvals_out[i] = a[i * n + i];
    }
}
