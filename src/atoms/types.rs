// Planora Client — Core types
// These are the data structures that flow through the entire client.
// They are independent of any transport or storage backend.

use serde::{Deserialize, Serialize};

// ── Credentials ────────────────────────────────────────────────────────

/// Access/refresh token pair as issued by the backend.
/// Replaced wholesale on every refresh; never partially updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenPair {
    #[serde(alias = "accessToken")]
    pub access_token: String,
    #[serde(alias = "refreshToken")]
    pub refresh_token: String,
}

// ── User record ────────────────────────────────────────────────────────

/// Cached user record from `GET /api/auth/me`.
/// Considered stale after any 401 response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    /// Subscription status string as reported by the backend
    /// ("active", "trialing", "canceled", …).
    #[serde(default)]
    pub subscription: Option<String>,
}

// ── Chat & generation ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage { role: Role::Assistant, content: content.into() }
    }
}

/// The three generation endpoints share one request/stream shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationKind {
    Positioning,
    Topics,
    Script,
}

/// Unified streaming chunk from a generation or chat stream.
#[derive(Debug, Clone, Default)]
pub struct StreamChunk {
    /// Text fragment to append to the transcript.
    pub delta_text: Option<String>,
    /// Set on the terminal chunk.
    pub done: bool,
    /// Server-assigned id of the stored generation, when the stream is done.
    pub generation_id: Option<String>,
    /// Server-reported error delivered in-stream.
    pub error: Option<String>,
}

// ── License verification ───────────────────────────────────────────────

/// Result of `GET /api/user/license/verify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseStatus {
    pub valid: bool,
    #[serde(default)]
    pub message: Option<String>,
}

// ── Save acks ──────────────────────────────────────────────────────────

/// Generic `{ id }` acknowledgement returned by the save endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveAck {
    pub id: String,
}

// ── Helpers ────────────────────────────────────────────────────────────

/// Truncate a string to at most `max` bytes on a char boundary.
/// Used when folding response bodies into error messages.
pub fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ── Tests ──────────────────────────────────────────────────────────────
