// Planora Client — Session state
//
// Owns the cached user record and the login/logout flows on top of the
// token store and the request wrapper. The cache is trusted until the HTTP
// layer sees a 401 (staleness flag), after which the next read refetches
// from `/api/auth/me`.

use crate::atoms::constants::ACTIVE_SUBSCRIPTION_STATUSES;
use crate::atoms::error::ClientResult;
use crate::atoms::types::User;
use crate::auth::oauth::AuthHandoff;
use crate::events::{LogoutReason, SessionEvent};
use crate::http::ApiClient;
use log::info;
use std::sync::Arc;

pub struct SessionManager {
    client: Arc<ApiClient>,
}

impl SessionManager {
    pub fn new(client: Arc<ApiClient>) -> Self {
        SessionManager { client }
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    /// Whether a token pair is currently stored.
    pub fn logged_in(&self) -> ClientResult<bool> {
        Ok(self.client.store().tokens()?.is_some())
    }

    // ── Login / logout ─────────────────────────────────────────────────

    /// Persist an OAuth hand-off: tokens atomically, then the user record
    /// when the popup included one.
    pub fn login(&self, handoff: &AuthHandoff) -> ClientResult<()> {
        let store = self.client.store();
        store.set_tokens(&handoff.tokens)?;
        if let Some(user) = &handoff.user {
            self.cache_user(user)?;
        }
        self.client.mark_user_fresh();
        info!("[auth] Logged in");
        self.client.events().emit(SessionEvent::LoggedIn);
        Ok(())
    }

    /// Clear every session storage key (tokens, timestamp, cached user,
    /// subscription status) and the CSRF cache, then broadcast LoggedOut.
    pub fn logout(&self) -> ClientResult<()> {
        self.client.store().clear_session()?;
        self.client.clear_csrf();
        self.client
            .events()
            .emit(SessionEvent::LoggedOut { reason: LogoutReason::UserRequested });
        Ok(())
    }

    // ── User cache ─────────────────────────────────────────────────────

    /// Current user: served from cache while fresh, refetched from
    /// `/api/auth/me` after any 401 or when no cache exists.
    pub async fn current_user(&self) -> ClientResult<User> {
        if !self.client.user_is_stale() {
            if let Some(json) = self.client.store().cached_user()? {
                if let Ok(user) = serde_json::from_str::<User>(&json) {
                    return Ok(user);
                }
            }
        }
        let user = self.client.me().await?;
        self.cache_user(&user)?;
        Ok(user)
    }

    fn cache_user(&self, user: &User) -> ClientResult<()> {
        let store = self.client.store();
        store.set_cached_user(&serde_json::to_string(user)?)?;
        if let Some(status) = &user.subscription {
            let previous = store.subscription_status()?;
            store.set_subscription_status(status)?;
            if previous.as_deref() != Some(status.as_str()) {
                self.client
                    .events()
                    .emit(SessionEvent::SubscriptionChanged { status: status.clone() });
            }
        }
        Ok(())
    }

    // ── Subscription & theme ───────────────────────────────────────────

    /// True when the stored subscription status string counts as active.
    pub fn subscription_active(&self) -> ClientResult<bool> {
        Ok(self
            .client
            .store()
            .subscription_status()?
            .map(|s| ACTIVE_SUBSCRIPTION_STATUSES.contains(&s.as_str()))
            .unwrap_or(false))
    }

    pub fn theme(&self) -> ClientResult<Option<String>> {
        self.client.store().theme()
    }

    pub fn set_theme(&self, theme: &str) -> ClientResult<()> {
        self.client.store().set_theme(theme)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
