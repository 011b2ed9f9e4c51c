//! Error types shared across every Membria component.

use thiserror::Error;

/// Result type alias using Membria's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur anywhere in the decision-memory engine.
///
/// Variants map onto the error kinds in the design: `InvalidArgument`,
/// `NotFound`, `IllegalTransition` and `AlreadyFinalized` are returned to
/// the caller as-is; `TransientBackend` is retried with bounded backoff by
/// the callee before it ever reaches a caller; `Internal` is logged with
/// full context and surfaced as a generic JSON-RPC `-32603`.
#[derive(Error, Debug)]
pub enum Error {
    /// Request failed schema/shape validation. Never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A referenced id does not exist in the active namespace.
    #[error("not found: {0}")]
    NotFound(String),

    /// A state-machine transition was attempted from a state that does not
    /// permit it. Carries the current state for the caller's benefit.
    #[error("illegal transition: {attempted} from {current_state}")]
    IllegalTransition {
        attempted: String,
        current_state: String,
    },

    /// A terminal transition (e.g. `finalize_outcome`) was attempted on an
    /// entity already in a terminal state.
    #[error("already finalized: {0}")]
    AlreadyFinalized(String),

    /// Namespace or uniqueness violation (duplicate id, conflicting write).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Backend failure believed to be transient (timeout, connection reset).
    /// The callee retries with bounded exponential backoff; by the time a
    /// caller observes this variant, every retry has failed.
    #[error("transient backend error: {0}")]
    TransientBackend(String),

    /// Backend failure believed to be permanent (schema mismatch, auth
    /// failure). Surfaced immediately, never retried.
    #[error("permanent backend error: {0}")]
    PermanentBackend(String),

    /// The operation was cancelled (context cancellation or timeout).
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Graph/relational storage error not otherwise classified above.
    #[error("storage error: {0}")]
    Storage(String),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration load/parse/validation error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unexpected internal error. Logged with full context, surfaced to
    /// callers as a generic message.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The JSON-RPC 2.0 error code this variant maps to.
    pub fn rpc_code(&self) -> i64 {
        match self {
            Error::InvalidArgument(_)
            | Error::NotFound(_)
            | Error::IllegalTransition { .. }
            | Error::AlreadyFinalized(_)
            | Error::Conflict(_)
            | Error::Serialization(_)
            | Error::Configuration(_) => -32602,
            _ => -32603,
        }
    }

    /// The HTTP status this variant maps to on the webhook surface (spec
    /// §7: validation errors -> 4xx, internal errors -> 5xx).
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidArgument(_)
            | Error::Serialization(_)
            | Error::Configuration(_)
            | Error::Conflict(_) => 400,
            Error::NotFound(_) => 404,
            Error::IllegalTransition { .. } | Error::AlreadyFinalized(_) => 409,
            _ => 500,
        }
    }

    /// True for errors that enrichment paths (behavior chains, negative
    /// knowledge lookups, calibration reads in the context builder) should
    /// swallow with a `warn` log rather than fail the overall request.
    pub fn is_recoverable_in_enrichment(&self) -> bool {
        matches!(
            self,
            Error::TransientBackend(_) | Error::NotFound(_) | Error::Storage(_)
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Configuration(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_codes_match_spec_table() {
        assert_eq!(Error::NotFound("x".into()).rpc_code(), -32602);
        assert_eq!(Error::Internal("x".into()).rpc_code(), -32603);
    }

    #[test]
    fn http_statuses_split_validation_from_internal() {
        assert_eq!(Error::InvalidArgument("x".into()).http_status(), 400);
        assert_eq!(Error::Internal("x".into()).http_status(), 500);
        assert_eq!(
            Error::IllegalTransition {
                attempted: "a".into(),
                current_state: "b".into()
            }
            .http_status(),
            409
        );
    }

    #[test]
    fn enrichment_recoverability_excludes_authoritative_errors() {
        assert!(Error::TransientBackend("x".into()).is_recoverable_in_enrichment());
        assert!(!Error::AlreadyFinalized("x".into()).is_recoverable_in_enrichment());
    }
}
