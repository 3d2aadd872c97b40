use crate::core::column::FlowUniverse;
use thiserror::Error;

/// Transient I/O failures talking to the store or the cache.
///
/// These never reach callers directly: the cache-aside executor retries them,
/// and only wraps one in [`EngineError::BackendExhausted`] when a bounded
/// retry policy gives up.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RESP protocol error: {0}")]
    Resp(String),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0} unavailable")]
    Unavailable(String),
}

/// Errors surfaced by the flow engine to its callers.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown entity column '{column}' for {universe} flows")]
    UnknownColumn {
        column: String,
        universe: FlowUniverse,
    },

    #[error("at least two entity columns are required to build a flow graph, {remaining} left after exclusions")]
    TooFewColumns { remaining: usize },

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("unexpected store response for `{query}`: {reason}")]
    MalformedRows { query: String, reason: String },

    #[error("volume overflow in {context}: sum exceeds the decimal range")]
    VolumeOverflow { context: String },

    #[error("flow graph failed validation: {0}")]
    CorruptGraph(String),

    #[error("backend still failing after {attempts} attempts: {source}")]
    BackendExhausted {
        attempts: u32,
        #[source]
        source: BackendError,
    },
}

impl EngineError {
    /// True for errors caused by the request itself rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::UnknownColumn { .. }
                | EngineError::TooFewColumns { .. }
                | EngineError::InvalidParameter { .. }
        )
    }

    pub(crate) fn malformed(query: &str, reason: impl Into<String>) -> Self {
        EngineError::MalformedRows {
            query: query.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        let e = EngineError::UnknownColumn {
            column: "venue".into(),
            universe: FlowUniverse::Orderflow,
        };
        assert!(e.is_client_error());
        assert_eq!(
            e.to_string(),
            "unknown entity column 'venue' for orderflow flows"
        );
        assert!(EngineError::TooFewColumns { remaining: 1 }.is_client_error());
    }

    #[test]
    fn test_server_errors() {
        assert!(!EngineError::CorruptGraph("x".into()).is_client_error());
        assert!(!EngineError::VolumeOverflow {
            context: "node 'x'".into()
        }
        .is_client_error());
        let e = EngineError::BackendExhausted {
            attempts: 3,
            source: BackendError::Unavailable("store".into()),
        };
        assert!(!e.is_client_error());
        assert!(e.to_string().contains("3 attempts"));
    }
}
