// Planora Client — Auth layer
//
// Module layout:
//   store    — SQLite-backed credential & preference storage (keychain mirror)
//   oauth    — OAuth popup hand-off: envelope parsing + loopback listener
//   session  — session state: user cache, login/logout, subscription flag
//   gate     — page permission gating (login / subscription policies)

pub mod store;
pub mod oauth;
pub mod session;
pub mod gate;

pub use gate::{AccessDecision, Page};
pub use oauth::AuthHandoff;
pub use session::SessionManager;
pub use store::TokenStore;
