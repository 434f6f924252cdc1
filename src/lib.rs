// Planora Client SDK — native client for the Planora content-planning backend.
//
// Layer map (one-way dependencies, top to bottom):
//   atoms/   — constants, error types, plain data types. No I/O.
//   events   — session event bus (broadcast).
//   auth/    — credential storage, OAuth hand-off, session state, page gating.
//   http     — authenticated request wrapper: bearer attach, CSRF, refresh-once.
//   api/     — typed endpoint surface + streaming generation/chat.

pub mod atoms;
#[cfg(test)]
pub(crate) mod testutil;
pub mod events;
pub mod auth;
pub mod http;
pub mod api;

pub use atoms::error::{ClientError, ClientResult};
pub use atoms::types::{StreamChunk, TokenPair, User};
pub use auth::session::SessionManager;
pub use events::{SessionEvent, SessionEvents};
pub use http::ApiClient;

/// Crate version exposed for runtime queries.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
