// Error types for the resolver and its engines

use thiserror::Error;

use super::diagnostics::{diagnose_error, BlockingReason};

/// The input had no extractable video identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("no video identifier found in {0:?}")]
    NoIdentifier(String),
}

/// Errors surfaced by [`Resolver::resolve`](super::Resolver::resolve).
///
/// Running out of engines is not one of them: that is
/// `Ok(ResolutionOutcome::Absent)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("invalid reference: {0}")]
    InvalidReference(#[from] NormalizationError),
}

/// Expected failure inside a single engine.
///
/// Never leaves the engine: `Engine::attempt` folds it into `None` after logging.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Transport-level failure (connect, TLS, body read)
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-success status
    #[error("upstream returned status {0}")]
    Status(u16),

    /// Payload did not have the expected shape
    #[error("parse error: {0}")]
    Parse(String),

    /// Payload parsed but a required field was missing
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Upstream listed streams but none of them is playable
    #[error("no playable variant")]
    NoPlayableVariant,

    /// External extraction tool is not installed
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// External extraction tool failed to run
    #[error("execution error: {0}")]
    Execution(String),

    /// Upstream refused for a recognizable reason
    #[error("blocked: {0}")]
    Blocked(BlockingReason),

    /// The engine's own timeout elapsed
    #[error("timed out")]
    Timeout,

    /// Every mirror the engine knows about failed
    #[error("all {0} instances failed")]
    AllInstancesFailed(usize),
}

impl EngineError {
    /// Classify the stderr of a failed extraction tool run
    pub fn from_tool_output(stderr: &str) -> Self {
        match diagnose_error(stderr) {
            Some(BlockingReason::NetworkTimeout) => Self::Timeout,
            Some(BlockingReason::Unknown) | None => {
                let line = stderr
                    .lines()
                    .rev()
                    .find(|l| !l.trim().is_empty())
                    .unwrap_or("")
                    .trim();
                Self::Execution(line.to_string())
            }
            Some(reason) => Self::Blocked(reason),
        }
    }

    /// Classify an unsuccessful HTTP status
    pub fn from_status(status: u16) -> Self {
        match BlockingReason::from_status(status) {
            Some(BlockingReason::NetworkTimeout) => Self::Timeout,
            Some(reason) => Self::Blocked(reason),
            None => Self::Status(status),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

/// Configuration could not be loaded
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid proxy URL {0:?}")]
    InvalidProxy(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_output_classification() {
        let err = EngineError::from_tool_output("ERROR: HTTP Error 429: Too Many Requests");
        assert!(matches!(err, EngineError::Blocked(BlockingReason::RateLimited)));

        let err = EngineError::from_tool_output("ERROR: Timed out after 30s");
        assert!(matches!(err, EngineError::Timeout));
    }

    #[test]
    fn test_tool_output_keeps_last_line() {
        let err = EngineError::from_tool_output("WARNING: foo\nERROR: something broke\n\n");
        match err {
            EngineError::Execution(line) => assert_eq!(line, "ERROR: something broke"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(EngineError::from_status(403), EngineError::Blocked(_)));
        assert!(matches!(EngineError::from_status(504), EngineError::Timeout));
        assert!(matches!(EngineError::from_status(502), EngineError::Status(502)));
    }
}
