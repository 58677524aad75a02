// ─────────────────────────────────────────────────────────────────────
// Extreme Deconvolution — Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use thiserror::Error;

/// Root error type for all deconvolution-engine failures.
///
/// `MaxIterReached` is deliberately absent: hitting the iteration cap is
/// a valid terminal status carried by `FitReport`, not a failure.
#[derive(Error, Debug)]
pub enum DeconvError {
    /// Invalid configuration value.
    #[error("config error: {0}")]
    Config(String),

    /// Dimension inconsistency across dataset, mixture, or projections.
    /// Detected before any mutation of the caller's mixture.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A projected or component covariance is not positive-definite
    /// within numerical tolerance.
    #[error("singular covariance: {0}")]
    SingularCovariance(String),

    /// NaN or Inf in a parameter or likelihood value.
    #[error("non-finite value: {0}")]
    NonFiniteValue(String),

    /// The objective decreased beyond floating tolerance during plain
    /// (unregularized) EM, which the update equations rule out.
    #[error("likelihood drop: {0}")]
    LikelihoodDrop(String),

    /// Diagnostic log file could not be opened or written. Never fatal:
    /// the engine downgrades this to a warning and keeps fitting.
    #[error("diagnostic log error: {0}")]
    DiagnosticLog(String),
}

pub type DeconvResult<T> = Result<T, DeconvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = DeconvError::ShapeMismatch("projection is 2x3, mixture dim is 2".into());
        assert_eq!(
            e.to_string(),
            "shape mismatch: projection is 2x3, mixture dim is 2"
        );
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DeconvError>();
    }
}
