// ── Planora Atoms: Error Types ─────────────────────────────────────────────
// Single canonical error enum for the client, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (I/O, Storage, Network, Auth…).
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • No variant carries secret material (tokens, credentials) in its message.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ClientError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// SQLite / rusqlite storage failure.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Authentication failure: missing/expired credentials, failed refresh.
    #[error("Auth error: {0}")]
    Auth(String),

    /// CSRF token rejected and the single retry did not recover.
    #[error("CSRF error: {0}")]
    Csrf(String),

    /// Non-success API response (non-secret detail only).
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Streaming body read or SSE framing failure.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Client configuration is invalid (bad base URL, missing origin…).
    #[error("Configuration error: {0}")]
    Config(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl ClientError {
    /// Create an API error with status and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api { status, message: message.into() }
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All client operations should return this type.
pub type ClientResult<T> = Result<T, ClientError>;
