// ── Planora Atoms: Constants ───────────────────────────────────────────────
// All named constants for the crate live here.
// Storage keys mirror the web client's storage contract one-to-one — renaming
// any of them would orphan state written by older builds. Treat as stable
// identifiers.

// ── Session storage keys ───────────────────────────────────────────────────
// Cleared wholesale by `TokenStore::clear_session()` (all except THEME).
pub(crate) const KEY_ACCESS_TOKEN: &str = "access_token";
pub(crate) const KEY_REFRESH_TOKEN: &str = "refresh_token";
pub(crate) const KEY_TOKEN_UPDATED_AT: &str = "token_updated_at";
pub(crate) const KEY_CACHED_USER: &str = "cached_user";
pub(crate) const KEY_SUBSCRIPTION_STATUS: &str = "subscription_status";

// Device preference, survives logout.
pub(crate) const KEY_THEME: &str = "theme";

/// Keys wiped by logout, in one transaction.
pub(crate) const SESSION_KEYS: [&str; 5] = [
    KEY_ACCESS_TOKEN,
    KEY_REFRESH_TOKEN,
    KEY_TOKEN_UPDATED_AT,
    KEY_CACHED_USER,
    KEY_SUBSCRIPTION_STATUS,
];

// ── Keychain mirror identifiers ────────────────────────────────────────────
// The refresh token (longer-lived credential) is mirrored into the OS
// keychain when one is available. Keyed on (service, user) — changing either
// value would strand existing entries.
pub(crate) const KEYCHAIN_SERVICE: &str = "planora-client";
pub(crate) const KEYCHAIN_REFRESH_USER: &str = "planora-refresh-token";

// ── API paths ──────────────────────────────────────────────────────────────
pub(crate) const PATH_ME: &str = "/api/auth/me";
pub(crate) const PATH_REFRESH: &str = "/api/auth/refresh";
pub(crate) const PATH_CSRF: &str = "/api/csrf-token";
pub(crate) const PATH_LICENSE_VERIFY: &str = "/api/user/license/verify";
pub(crate) const PATH_GENERATE_POSITIONING: &str = "/api/generate/positioning";
pub(crate) const PATH_GENERATE_TOPICS: &str = "/api/generate/topics";
pub(crate) const PATH_GENERATE_SCRIPT: &str = "/api/generate/script";
pub(crate) const PATH_CHAT_STREAM: &str = "/api/chat/stream";
pub(crate) const PATH_POSITIONING_SAVE: &str = "/api/user/positioning/save";
pub(crate) const PATH_SCRIPTS_SAVE: &str = "/api/scripts/save";
pub(crate) const PATH_GENERATIONS: &str = "/api/generations";

// OAuth-initiation prefix: requests under this path get no custom headers
// (the web client avoided CORS preflight here; we keep the contract).
pub(crate) const PATH_OAUTH_PREFIX: &str = "/api/auth/google";

// ── Header names ───────────────────────────────────────────────────────────
pub(crate) const HEADER_CSRF: &str = "X-CSRF-Token";

// ── HTTP client timings ────────────────────────────────────────────────────
pub(crate) const CONNECT_TIMEOUT_SECS: u64 = 10;

// ── OAuth hand-off message types ───────────────────────────────────────────
// Three aliases for the same success envelope; all generations of the web
// popup are still in the wild.
pub(crate) const AUTH_MSG_TYPES: [&str; 3] =
    ["GOOGLE_AUTH_SUCCESS", "googleAuthSuccess", "login-success"];

// ── Subscription status values considered active ───────────────────────────
pub(crate) const ACTIVE_SUBSCRIPTION_STATUSES: [&str; 2] = ["active", "trialing"];
