// ─────────────────────────────────────────────────────────────────────
// Extreme Deconvolution — Diagnostic Logs
// ─────────────────────────────────────────────────────────────────────
//! Append-only text logs of the fit trajectory: one file for the
//! per-iteration objective, one for accepted split-merge transitions.
//! Failures here degrade the diagnostics, never the numerical run: they
//! are reported through `log::warn!` and the offending file handle is
//! dropped.

use std::fs::{File, OpenOptions};
use std::io::Write;

use deconv_types::DeconvError;

/// Best-effort pair of append-mode diagnostic files.
///
/// `open(base)` targets `<base>_loglike.log` and `<base>_snm.log`. A
/// handle that cannot be opened, or that fails a write, is disabled for
/// the rest of the fit.
#[derive(Debug)]
pub struct DiagnosticLog {
    loglike: Option<File>,
    snm: Option<File>,
}

impl DiagnosticLog {
    pub fn open(basename: &str) -> Self {
        Self {
            loglike: Self::open_one(&format!("{basename}_loglike.log")),
            snm: Self::open_one(&format!("{basename}_snm.log")),
        }
    }

    fn open_one(path: &str) -> Option<File> {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => Some(f),
            Err(e) => {
                let err = DeconvError::DiagnosticLog(format!("cannot open {path}: {e}"));
                log::warn!("{err}");
                None
            }
        }
    }

    /// One `iteration <TAB> objective` line per base-EM pass.
    pub fn loglike_line(&mut self, iteration: u64, objective: f64) {
        if let Some(f) = self.loglike.as_mut() {
            if let Err(e) = writeln!(f, "{iteration}\t{objective:.16e}") {
                let err = DeconvError::DiagnosticLog(format!("likelihood log write failed: {e}"));
                log::warn!("{err}");
                self.loglike = None;
            }
        }
    }

    /// One `split <TAB> merge_a <TAB> merge_b <TAB> objective` line per
    /// accepted split-merge transition.
    pub fn snm_line(&mut self, split: usize, merge_a: usize, merge_b: usize, objective: f64) {
        if let Some(f) = self.snm.as_mut() {
            if let Err(e) = writeln!(f, "{split}\t{merge_a}\t{merge_b}\t{objective:.16e}") {
                let err = DeconvError::DiagnosticLog(format!("split-merge log write failed: {e}"));
                log::warn!("{err}");
                self.snm = None;
            }
        }
    }
}
