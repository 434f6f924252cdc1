// Planora Client — Credential & preference storage
//
// Native analog of the web client's key-value storage: a small SQLite table
// holding the session keys (tokens, timestamp, cached user, subscription
// status) plus the theme preference. The refresh token — the longer-lived
// credential — is additionally mirrored into the OS keychain when one is
// available; SQLite stays authoritative and the mirror repopulates a fresh
// database after reinstall.
//
// Write rules (the invariants the rest of the crate leans on):
//   • `set_tokens` replaces access token, refresh token, and the update
//     timestamp in a single transaction. No partial pair is ever readable.
//   • `clear_session` deletes every session key in a single transaction and
//     drops the keychain mirror. Theme survives — it is a device preference,
//     not a credential.

use crate::atoms::constants::*;
use crate::atoms::error::ClientResult;
use crate::atoms::types::TokenPair;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use log::{info, warn};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

/// Get the default path to the client database.
pub fn client_db_path() -> PathBuf {
    let base = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
    base.join("planora").join("client.db")
}

/// Thread-safe storage wrapper.
pub struct TokenStore {
    /// The SQLite connection, protected by a Mutex.
    conn: Mutex<Connection>,
    /// Mirror the refresh token into the OS keychain. Disabled for
    /// in-memory test stores.
    use_keychain: bool,
}

impl TokenStore {
    /// Open (or create) the client database at the default location.
    pub fn open() -> ClientResult<Self> {
        let path = client_db_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open_at(&path, true)
    }

    /// Open a store at an explicit path.
    pub fn open_at(path: &Path, use_keychain: bool) -> ClientResult<Self> {
        info!("[store] Opening token store at {:?}", path);
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        Self::init(conn, use_keychain)
    }

    /// In-memory store for tests. No keychain mirror.
    pub fn open_in_memory() -> ClientResult<Self> {
        Self::init(Connection::open_in_memory()?, false)
    }

    fn init(conn: Connection, use_keychain: bool) -> ClientResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS client_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        let store = TokenStore { conn: Mutex::new(conn), use_keychain };
        store.restore_refresh_from_keychain();
        Ok(store)
    }

    // ── Generic key/value access ───────────────────────────────────────

    fn get_locked(conn: &Connection, key: &str) -> ClientResult<Option<String>> {
        let result = conn.query_row(
            "SELECT value FROM client_state WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get(&self, key: &str) -> ClientResult<Option<String>> {
        let conn = self.conn.lock();
        Self::get_locked(&conn, key)
    }

    pub fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO client_state (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> ClientResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM client_state WHERE key = ?1", params![key])?;
        Ok(())
    }

    // ── Token pair ─────────────────────────────────────────────────────

    /// Replace the stored token pair wholesale, stamping `token_updated_at`.
    /// All three writes commit in one transaction.
    pub fn set_tokens(&self, pair: &TokenPair) -> ClientResult<()> {
        {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            let now = chrono::Utc::now().to_rfc3339();
            for (key, value) in [
                (KEY_ACCESS_TOKEN, pair.access_token.as_str()),
                (KEY_REFRESH_TOKEN, pair.refresh_token.as_str()),
                (KEY_TOKEN_UPDATED_AT, now.as_str()),
            ] {
                tx.execute(
                    "INSERT OR REPLACE INTO client_state (key, value) VALUES (?1, ?2)",
                    params![key, value],
                )?;
            }
            tx.commit()?;
        }
        self.mirror_refresh_to_keychain(&pair.refresh_token);
        Ok(())
    }

    /// Read the current token pair, or `None` when either half is absent.
    /// Both rows are read under one lock acquisition, so a concurrent
    /// `set_tokens` can never produce a mixed pair.
    pub fn tokens(&self) -> ClientResult<Option<TokenPair>> {
        let conn = self.conn.lock();
        let access = Self::get_locked(&conn, KEY_ACCESS_TOKEN)?;
        let refresh = Self::get_locked(&conn, KEY_REFRESH_TOKEN)?;
        match (access, refresh) {
            (Some(access_token), Some(refresh_token)) => {
                Ok(Some(TokenPair { access_token, refresh_token }))
            }
            _ => Ok(None),
        }
    }

    pub fn access_token(&self) -> ClientResult<Option<String>> {
        self.get(KEY_ACCESS_TOKEN)
    }

    pub fn token_updated_at(&self) -> ClientResult<Option<String>> {
        self.get(KEY_TOKEN_UPDATED_AT)
    }

    // ── Cached user / subscription / theme ─────────────────────────────

    pub fn set_cached_user(&self, user_json: &str) -> ClientResult<()> {
        self.set(KEY_CACHED_USER, user_json)
    }

    pub fn cached_user(&self) -> ClientResult<Option<String>> {
        self.get(KEY_CACHED_USER)
    }

    pub fn set_subscription_status(&self, status: &str) -> ClientResult<()> {
        self.set(KEY_SUBSCRIPTION_STATUS, status)
    }

    pub fn subscription_status(&self) -> ClientResult<Option<String>> {
        self.get(KEY_SUBSCRIPTION_STATUS)
    }

    pub fn set_theme(&self, theme: &str) -> ClientResult<()> {
        self.set(KEY_THEME, theme)
    }

    pub fn theme(&self) -> ClientResult<Option<String>> {
        self.get(KEY_THEME)
    }

    // ── Logout ─────────────────────────────────────────────────────────

    /// Delete every session key in one transaction and drop the keychain
    /// mirror. Leaves the theme preference in place.
    pub fn clear_session(&self) -> ClientResult<()> {
        {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            for key in SESSION_KEYS {
                tx.execute("DELETE FROM client_state WHERE key = ?1", params![key])?;
            }
            tx.commit()?;
        }
        if self.use_keychain {
            match keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_REFRESH_USER) {
                Ok(entry) => {
                    if let Err(e) = entry.delete_credential() {
                        if !matches!(e, keyring::Error::NoEntry) {
                            warn!("[store] Failed to drop keychain mirror: {}", e);
                        }
                    }
                }
                Err(e) => warn!("[store] Keychain unavailable on logout: {}", e),
            }
        }
        info!("[store] Session storage cleared");
        Ok(())
    }

    // ── Keychain mirror ────────────────────────────────────────────────
    // Best-effort on both paths: a missing or locked keychain degrades to
    // SQLite-only storage with a warning, never an error.

    fn mirror_refresh_to_keychain(&self, refresh_token: &str) {
        if !self.use_keychain {
            return;
        }
        let encoded = B64.encode(refresh_token.as_bytes());
        match keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_REFRESH_USER) {
            Ok(entry) => {
                if let Err(e) = entry.set_password(&encoded) {
                    warn!("[store] Failed to mirror refresh token to keychain: {}", e);
                }
            }
            Err(e) => warn!("[store] Keychain unavailable: {}", e),
        }
    }

    /// Repopulate the refresh-token row from the keychain when the database
    /// is fresh (reinstall, cleared data dir). Access token stays absent, so
    /// the first request will 401 and refresh its way back in.
    fn restore_refresh_from_keychain(&self) {
        if !self.use_keychain {
            return;
        }
        let already_present = matches!(self.get(KEY_REFRESH_TOKEN), Ok(Some(_)));
        if already_present {
            return;
        }
        let entry = match keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_REFRESH_USER) {
            Ok(e) => e,
            Err(_) => return,
        };
        match entry.get_password() {
            Ok(encoded) => {
                if let Ok(bytes) = B64.decode(&encoded) {
                    if let Ok(token) = String::from_utf8(bytes) {
                        let _ = self.set(KEY_REFRESH_TOKEN, &token);
                        info!("[store] Restored refresh token from OS keychain");
                    }
                }
            }
            Err(keyring::Error::NoEntry) => {}
            Err(e) => warn!("[store] Keychain read failed: {}", e),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
