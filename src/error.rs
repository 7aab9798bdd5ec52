//! Error types for net-exporter

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in net-exporter
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing construction parameters
    #[error("Configuration error: {0}")]
    Config(String),

    /// Service, endpoint or pod lookup failed
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// A single probe target failed
    #[error("Probe of {target} failed: {reason}")]
    Probe { target: String, reason: String },

    /// A probe did not complete in time
    #[error("Probe of {target} timed out after {after:?}")]
    Timeout { target: String, after: Duration },

    /// Histogram sample rejected
    #[error("Invalid histogram sample: {0}")]
    InvalidSample(f64),

    /// External command output did not match the expected schema
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metric construction or encoding error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a per-target probe failure.
    pub fn probe(target: impl Into<String>, reason: impl ToString) -> Self {
        Error::Probe {
            target: target.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_error_display() {
        let err = Error::probe("10.0.0.1:8000", "connection refused");
        assert_eq!(
            err.to_string(),
            "Probe of 10.0.0.1:8000 failed: connection refused"
        );
    }

    #[test]
    fn test_timeout_error_display() {
        let err = Error::Timeout {
            target: "pool.ntp.org".into(),
            after: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "Probe of pool.ntp.org timed out after 5s");
    }
}
