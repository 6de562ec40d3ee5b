//! QuorumKV Error Types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Result type alias for QuorumKV operations
pub type Result<T> = std::result::Result<T, Error>;

/// QuorumKV error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Role errors
    #[error("Node {0} is not the leader")]
    NotLeader(String),

    #[error("Node {0} is not a follower")]
    NotFollower(String),

    // Data errors
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Stale replication for key {key}: incoming version {incoming} <= local {current}")]
    StaleVersion {
        key: String,
        incoming: u64,
        current: u64,
    },

    // Quorum errors
    #[error("No leader available")]
    NoLeader,

    #[error("Quorum unavailable: {alive} alive followers, {required} required")]
    QuorumUnavailable { required: usize, alive: usize },

    #[error("Quorum not met: {acked}/{required} acknowledgements")]
    QuorumNotMet { required: usize, acked: usize },

    // Membership errors
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    // Network errors
    #[error("Peer unreachable at {url}: {reason}")]
    PeerUnreachable { url: String, reason: String },

    #[error("Catch-up failed for {node_id} after {attempts} attempts")]
    CatchupFailed { node_id: String, attempts: u32 },

    #[error("Failed to launch node process: {0}")]
    Launch(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::PeerUnreachable { .. }
                | Error::QuorumNotMet { .. }
                | Error::QuorumUnavailable { .. }
        )
    }

    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) | Error::ConfigParse(_) => "config",
            Error::NotLeader(_) => "not-leader",
            Error::NotFollower(_) => "not-follower",
            Error::KeyNotFound(_) => "not-found",
            Error::StaleVersion { .. } => "stale-version",
            Error::NoLeader => "no-leader",
            Error::QuorumUnavailable { .. } => "quorum-unavailable",
            Error::QuorumNotMet { .. } => "quorum-not-met",
            Error::UnknownNode(_) => "unknown-node",
            Error::PeerUnreachable { .. } => "peer-unreachable",
            Error::CatchupFailed { .. } => "catchup-failed",
            Error::Launch(_) => "launch",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Internal(_) => "internal",
        }
    }

    /// HTTP status this error maps to at the API boundary
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotLeader(_) | Error::NotFollower(_) => StatusCode::FORBIDDEN,
            Error::KeyNotFound(_) | Error::UnknownNode(_) => StatusCode::NOT_FOUND,
            Error::NoLeader
            | Error::QuorumUnavailable { .. }
            | Error::QuorumNotMet { .. }
            | Error::PeerUnreachable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Config(_) | Error::ConfigParse(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON body returned for API errors
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_errors_map_to_503() {
        let err = Error::QuorumUnavailable {
            required: 2,
            alive: 1,
        };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), "quorum-unavailable");
        assert!(err.is_retryable());
    }

    #[test]
    fn role_errors_map_to_403() {
        assert_eq!(
            Error::NotLeader("follower-1".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::NotFollower("leader".into()).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn missing_key_maps_to_404() {
        let err = Error::KeyNotFound("k1".into());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(!err.is_retryable());
    }
}
