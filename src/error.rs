//! Error types for dash-api.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for dash-api.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ───────────────────────────────────────────────────────
    /// A 401 came back for a call that carried no access token.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The refresh exchange failed. The session has been cleared and the
    /// navigator has already been sent to the login view.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// A request that was already replayed after a successful refresh got
    /// another 401.
    #[error("Request to {path} rejected after {replays} token refresh replay(s)")]
    ReplayRejected {
        /// Path of the rejected request.
        path: String,
        /// Replays already spent on it.
        replays: u32,
    },

    // ── API ──────────────────────────────────────────────────────────────────
    /// The API answered with a non-success status.
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// `error` or `message` from the body, or the status text.
        message: String,
    },

    // ── Storage ──────────────────────────────────────────────────────────────
    /// Storage I/O error.
    #[error("Storage I/O error at {path}: {message}")]
    StorageIo {
        /// Path that caused the error.
        path: PathBuf,
        /// Error description.
        message: String,
    },

    /// Generic storage error (serialization, keyring).
    #[error("Storage error: {0}")]
    Storage(String),

    // ── Infrastructure ───────────────────────────────────────────────────────
    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Request timeout.
    #[error("Request timed out")]
    Timeout,

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true if this error means the user has to sign in again.
    #[must_use]
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            Error::NotAuthenticated
                | Error::SessionExpired(_)
                | Error::ReplayRejected { .. }
                | Error::Api { status: 401, .. }
        )
    }

    /// HTTP status carried by the error, if it came from a response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::NotAuthenticated | Error::ReplayRejected { .. } => Some(401),
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Map a transport failure, separating timeouts from other network errors.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else {
            Error::Network(err)
        }
    }

    /// Creates a storage I/O error.
    #[must_use]
    pub fn storage_io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::StorageIo {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Convenience type alias.
pub type Result<T> = std::result::Result<T, Error>;
