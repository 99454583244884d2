//! Error types for quorumkv

use crate::common::config::NodeRole;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Request Errors ===
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not a write coordinator (role={role}, N={n}, W={w})")]
    NotCoordinator { role: NodeRole, n: usize, w: usize },

    // === Quorum Errors ===
    #[error("Write quorum not met: need {needed}, got {acked}")]
    QuorumNotMet { needed: usize, acked: usize },

    #[error("Key not found: {0}")]
    NotFound(String),

    // === Network Errors ===
    #[error("Peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration source error: {0}")]
    Config(#[from] config::ConfigError),

    // === Generic ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> StatusCode {
        match self {
            Error::InvalidRequest(_) | Error::NotCoordinator { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::QuorumNotMet { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::PeerUnreachable { .. } | Error::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Does this error only mean "the peer did not answer"?
    pub fn is_peer_failure(&self) -> bool {
        matches!(self, Error::PeerUnreachable { .. } | Error::Http(_))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.to_http_status(), format!("{}\n", self)).into_response()
    }
}
