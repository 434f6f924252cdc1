// Planora Client — Typed endpoint surface
//
// Thin JSON-over-HTTPS calls on top of the request wrapper. The credential
// policy (bearer attach, CSRF, refresh-once) lives entirely in http.rs;
// nothing here retries or touches tokens.
//
// Module layout:
//   mod       — user, license verification, save endpoints
//   generate  — streaming generation & chat (SSE consumption)

pub mod generate;

use crate::atoms::constants::*;
use crate::atoms::error::ClientResult;
use crate::atoms::types::{LicenseStatus, SaveAck, User};
use crate::http::ApiClient;
use serde_json::Value;

impl ApiClient {
    /// Fetch the current user record.
    pub async fn me(&self) -> ClientResult<User> {
        let user: User = self.get_json(PATH_ME).await?;
        self.mark_user_fresh();
        Ok(user)
    }

    /// Verify an activation-link token.
    pub async fn verify_license(&self, token: &str) -> ClientResult<LicenseStatus> {
        let path = format!("{}?token={}", PATH_LICENSE_VERIFY, urlencoding::encode(token));
        self.get_json(&path).await
    }

    /// Persist the user's account positioning.
    pub async fn save_positioning(&self, positioning: &Value) -> ClientResult<SaveAck> {
        self.post_json(PATH_POSITIONING_SAVE, positioning).await
    }

    /// Persist a generated script.
    pub async fn save_script(&self, script: &Value) -> ClientResult<SaveAck> {
        self.post_json(PATH_SCRIPTS_SAVE, script).await
    }

    /// Record a completed generation.
    pub async fn save_generation(&self, generation: &Value) -> ClientResult<SaveAck> {
        self.post_json(PATH_GENERATIONS, generation).await
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
