use crate::analyzer::AnalyzerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("invalid daemon configuration: {0}")]
    InvalidConfig(String),

    #[error("{op} failed: {source}")]
    Analyzer {
        op: &'static str,
        #[source]
        source: AnalyzerError,
    },

    #[error("{op} failed for {failed} of {attempted} instances: {source}")]
    Apply {
        op: &'static str,
        failed: usize,
        attempted: usize,
        #[source]
        source: AnalyzerError,
    },

    #[error("signal handling failed: {0}")]
    Signal(#[from] std::io::Error),
}

impl DaemonError {
    pub fn analyzer(op: &'static str, source: AnalyzerError) -> Self {
        Self::Analyzer { op, source }
    }

    /// Analyzer failures are transient and retried on the next tick.
    /// Everything else is still non-fatal to the loop but worth attention.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Analyzer { .. })
    }
}
