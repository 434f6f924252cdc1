// Planora Client — Authenticated request wrapper
//
// Every API call funnels through `ApiClient::execute`, which owns the
// credential rules the web client enforced around `fetch`:
//
//   • Bearer token is attached only to requests on the API origin.
//     OAuth-initiation paths get no custom headers at all (the web client
//     avoided CORS preflight there; the contract is kept).
//   • State-changing methods carry `X-CSRF-Token` from a lazily-fetched
//     cache. A 403 whose body indicates a CSRF failure clears the cache,
//     refetches, and retries the original request once.
//   • A 401 (on anything but the refresh call itself) triggers one token
//     refresh using the current access token as bearer. Success: store the
//     new pair, drop the CSRF cache, retry once with the new token.
//     Failure: clear the session and broadcast LoggedOut.
//
// Both retries are bounded and non-recursive. Concurrent callers may each
// refresh independently — a wasted round trip, not a correctness problem,
// since token storage is last-write-wins.

use crate::atoms::constants::*;
use crate::atoms::error::{ClientError, ClientResult};
use crate::atoms::types::{truncate_utf8, TokenPair};
use crate::auth::store::TokenStore;
use crate::events::{LogoutReason, SessionEvent, SessionEvents};
use log::{info, warn};
use parking_lot::Mutex;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub struct ApiClient {
    client: Client,
    base_url: Url,
    store: Arc<TokenStore>,
    events: SessionEvents,
    /// Cached CSRF token. Invalidated on token refresh and on any
    /// CSRF-rejection response.
    csrf: Mutex<Option<String>>,
    /// Set on any 401; the session layer refetches the user on next read.
    user_stale: AtomicBool,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        store: Arc<TokenStore>,
        events: SessionEvents,
    ) -> ClientResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::Config(format!("Invalid base URL: {}", e)))?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(ApiClient { client, base_url, store, events, csrf: Mutex::new(None), user_stale: AtomicBool::new(false) })
    }

    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// True after a 401 was seen and the cached user has not been refetched.
    pub fn user_is_stale(&self) -> bool {
        self.user_stale.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_user_fresh(&self) {
        self.user_stale.store(false, Ordering::Relaxed);
    }

    pub(crate) fn clear_csrf(&self) {
        *self.csrf.lock() = None;
    }

    // ── Typed convenience calls ────────────────────────────────────────

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let resp = self.execute(Method::GET, path, None).await?;
        Ok(resp.json().await?)
    }

    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> ClientResult<T> {
        let resp = self.execute(Method::POST, path, Some(body.clone())).await?;
        Ok(resp.json().await?)
    }

    // ── Core wrapper ───────────────────────────────────────────────────

    /// Issue a request with the full credential policy. Returns the response
    /// only on a success status; everything else maps to `ClientError`.
    pub(crate) async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> ClientResult<Response> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ClientError::Config(format!("Invalid path {:?}: {}", path, e)))?;

        // OAuth initiation is a plain request: no bearer, no CSRF header.
        if path.starts_with(PATH_OAUTH_PREFIX) {
            let resp = self.client.request(method, url).send().await?;
            return check_status(resp).await;
        }

        let same_origin = url.origin() == self.base_url.origin();
        let needs_csrf = same_origin && is_state_changing(&method);
        let mut bearer = if same_origin { self.store.access_token()? } else { None };

        // Each bounded retry fires at most once per call.
        let mut csrf_retried = false;
        let mut refresh_retried = false;

        loop {
            // Lazily ensure a CSRF token for state-changing requests. The
            // fetch itself requires auth, so its 401 feeds the same
            // refresh-once branch as the main request.
            if needs_csrf && self.csrf.lock().is_none() {
                match self.fetch_csrf(bearer.as_deref()).await {
                    Ok(token) => *self.csrf.lock() = Some(token),
                    Err(ClientError::Api { status: 401, .. })
                        if !refresh_retried && path != PATH_REFRESH =>
                    {
                        warn!("[http] CSRF fetch got 401; refreshing token once");
                        refresh_retried = true;
                        self.user_stale.store(true, Ordering::Relaxed);
                        let pair = self.refresh_tokens(bearer.as_deref()).await?;
                        bearer = Some(pair.access_token);
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            let mut req = self.client.request(method.clone(), url.clone());
            if let Some(token) = &bearer {
                req = req.bearer_auth(token);
            }
            if needs_csrf {
                if let Some(csrf) = self.csrf.lock().as_deref() {
                    req = req.header(HEADER_CSRF, csrf);
                }
            }
            if let Some(b) = &body {
                req = req.json(b);
            }

            let resp = req.send().await?;
            let status = resp.status().as_u16();

            if resp.status().is_success() {
                return Ok(resp);
            }

            // 403 + CSRF-failure body: refetch the token, retry once.
            // A second rejection with the fresh token is terminal.
            if status == 403 && needs_csrf {
                let text = resp.text().await.unwrap_or_default();
                if is_csrf_rejection(&text) {
                    if !csrf_retried {
                        warn!("[http] CSRF token rejected on {}; refetching once", path);
                        csrf_retried = true;
                        self.clear_csrf();
                        continue;
                    }
                    return Err(ClientError::Csrf(truncate_utf8(&text, 200).to_string()));
                }
                return Err(ClientError::api(403, truncate_utf8(&text, 200)));
            }

            // 401: refresh once, unless this *is* the refresh call.
            if status == 401 && same_origin {
                self.user_stale.store(true, Ordering::Relaxed);
                if !refresh_retried && path != PATH_REFRESH {
                    refresh_retried = true;
                    let pair = self.refresh_tokens(bearer.as_deref()).await?;
                    bearer = Some(pair.access_token);
                    continue;
                }
            }

            let text = resp.text().await.unwrap_or_default();
            return Err(ClientError::api(status, truncate_utf8(&text, 200)));
        }
    }

    // ── CSRF ───────────────────────────────────────────────────────────

    /// Fetch a fresh CSRF token. Plain GET with bearer auth — retry policy
    /// is owned by the caller (`execute`), never nested here.
    async fn fetch_csrf(&self, bearer: Option<&str>) -> ClientResult<String> {
        let url = self
            .base_url
            .join(PATH_CSRF)
            .map_err(|e| ClientError::Config(e.to_string()))?;
        let mut req = self.client.get(url);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(ClientError::api(status, truncate_utf8(&text, 200)));
        }
        #[derive(serde::Deserialize)]
        struct CsrfResponse {
            #[serde(alias = "csrfToken")]
            csrf_token: String,
        }
        let parsed: CsrfResponse = resp.json().await?;
        Ok(parsed.csrf_token)
    }

    // ── Token refresh ──────────────────────────────────────────────────

    /// Exchange the current access token for a new pair. On success the new
    /// pair is stored atomically and the CSRF cache dropped; on failure the
    /// whole session is cleared and LoggedOut broadcast.
    async fn refresh_tokens(&self, bearer: Option<&str>) -> ClientResult<TokenPair> {
        let url = self
            .base_url
            .join(PATH_REFRESH)
            .map_err(|e| ClientError::Config(e.to_string()))?;
        let mut req = self.client.post(url);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }

        let outcome = match req.send().await {
            Ok(resp) if resp.status().is_success() => {
                match resp.json::<TokenPair>().await {
                    Ok(pair) => Ok(pair),
                    Err(e) => Err(format!("refresh response unreadable: {}", e)),
                }
            }
            Ok(resp) => Err(format!("refresh rejected with status {}", resp.status().as_u16())),
            Err(e) => Err(format!("refresh transport failure: {}", e)),
        };

        match outcome {
            Ok(pair) => {
                self.store.set_tokens(&pair)?;
                self.clear_csrf();
                info!("[http] Access token refreshed");
                self.events.emit(SessionEvent::TokenRefreshed);
                Ok(pair)
            }
            Err(message) => {
                warn!("[http] Token refresh failed: {}", message);
                self.store.clear_session()?;
                self.clear_csrf();
                self.events.emit(SessionEvent::LoggedOut { reason: LogoutReason::RefreshFailed });
                Err(ClientError::Auth(format!("Token refresh failed: {}", message)))
            }
        }
    }
}

// ── Policy helpers ─────────────────────────────────────────────────────

fn is_state_changing(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

/// The backend flags CSRF rejections in the 403 body (error/message/code
/// fields). Substring match is what the web client did; kept as-is.
fn is_csrf_rejection(body: &str) -> bool {
    body.to_ascii_lowercase().contains("csrf")
}

async fn check_status(resp: Response) -> ClientResult<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    Err(ClientError::api(status, truncate_utf8(&text, 200)))
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SessionEvents;
    use crate::testutil::{http_response, StubServer};

    fn client_with(base_url: &str) -> (ApiClient, Arc<TokenStore>) {
        let store = Arc::new(TokenStore::open_in_memory().unwrap());
        let client = ApiClient::new(base_url, store.clone(), SessionEvents::new()).unwrap();
        (client, store)
    }

    fn seed_tokens(store: &TokenStore, access: &str, refresh: &str) {
        store
            .set_tokens(&TokenPair { access_token: access.into(), refresh_token: refresh.into() })
            .unwrap();
    }

    #[tokio::test]
    async fn attaches_bearer_to_api_requests() {
        let server = StubServer::start(vec![http_response(200, "OK", r#"{"ok":true}"#)]).await;
        let (client, store) = client_with(&server.base_url);
        seed_tokens(&store, "tok-1", "ref-1");

        let _: Value = client.get_json("/api/auth/me").await.unwrap();
        assert!(server.request(0).contains("authorization: Bearer tok-1")
            || server.request(0).contains("Authorization: Bearer tok-1"));
        server.finish().await;
    }

    #[tokio::test]
    async fn oauth_initiation_carries_no_custom_headers() {
        let server = StubServer::start(vec![http_response(200, "OK", "{}")]).await;
        let (client, store) = client_with(&server.base_url);
        seed_tokens(&store, "tok-1", "ref-1");

        client.execute(Method::GET, "/api/auth/google/start", None).await.unwrap();
        let req = server.request(0).to_ascii_lowercase();
        assert!(!req.contains("authorization:"));
        assert!(!req.contains("x-csrf-token:"));
        server.finish().await;
    }

    #[tokio::test]
    async fn refresh_once_then_single_retry_with_new_token() {
        let server = StubServer::start(vec![
            http_response(401, "Unauthorized", r#"{"error":"expired"}"#),
            http_response(200, "OK", r#"{"accessToken":"tok-2","refreshToken":"ref-2"}"#),
            http_response(200, "OK", r#"{"id":"u1","email":"a@b.co"}"#),
        ])
        .await;
        let (client, store) = client_with(&server.base_url);
        seed_tokens(&store, "tok-1", "ref-1");
        let mut rx = client.events().subscribe();

        let user: Value = client.get_json("/api/auth/me").await.unwrap();
        assert_eq!(user["id"], "u1");

        // Exactly three requests: original, refresh, single retry.
        assert_eq!(server.request_count(), 3);
        let refresh_req = server.request(1).to_ascii_lowercase();
        assert!(refresh_req.starts_with("post /api/auth/refresh"));
        assert!(refresh_req.contains("bearer tok-1"), "refresh uses the old access token");
        let retry_req = server.request(2).to_ascii_lowercase();
        assert!(retry_req.contains("bearer tok-2"), "retry uses the new token");

        // Stored pair replaced wholesale; refresh event broadcast.
        let pair = store.tokens().unwrap().unwrap();
        assert_eq!(pair.access_token, "tok-2");
        assert_eq!(pair.refresh_token, "ref-2");
        assert!(matches!(rx.try_recv().unwrap(), SessionEvent::TokenRefreshed));
        assert!(client.user_is_stale());
        server.finish().await;
    }

    #[tokio::test]
    async fn failed_refresh_clears_session_and_broadcasts_logout() {
        let server = StubServer::start(vec![
            http_response(401, "Unauthorized", "{}"),
            http_response(401, "Unauthorized", r#"{"error":"refresh expired"}"#),
        ])
        .await;
        let (client, store) = client_with(&server.base_url);
        seed_tokens(&store, "tok-1", "ref-1");
        store.set_subscription_status("active").unwrap();
        let mut rx = client.events().subscribe();

        let err = client.get_json::<Value>("/api/auth/me").await.unwrap_err();
        assert!(matches!(err, ClientError::Auth(_)));
        assert_eq!(server.request_count(), 2, "no retry after a failed refresh");
        assert!(store.tokens().unwrap().is_none());
        assert!(store.subscription_status().unwrap().is_none());
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::LoggedOut { reason: LogoutReason::RefreshFailed }
        ));
        server.finish().await;
    }

    #[tokio::test]
    async fn second_401_after_successful_refresh_is_returned() {
        let server = StubServer::start(vec![
            http_response(401, "Unauthorized", "{}"),
            http_response(200, "OK", r#"{"accessToken":"tok-2","refreshToken":"ref-2"}"#),
            http_response(401, "Unauthorized", r#"{"error":"still no"}"#),
        ])
        .await;
        let (client, store) = client_with(&server.base_url);
        seed_tokens(&store, "tok-1", "ref-1");

        let err = client.get_json::<Value>("/api/auth/me").await.unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 401, .. }));
        assert_eq!(server.request_count(), 3, "exactly one retry, never two");
        server.finish().await;
    }

    #[tokio::test]
    async fn csrf_rejection_refetches_and_retries_once() {
        let server = StubServer::start(vec![
            // Lazy CSRF fetch for the first POST.
            http_response(200, "OK", r#"{"csrf_token":"c-1"}"#),
            // POST rejected as CSRF failure.
            http_response(403, "Forbidden", r#"{"error":"invalid csrf token"}"#),
            // Refetch.
            http_response(200, "OK", r#"{"csrf_token":"c-2"}"#),
            // Retry succeeds.
            http_response(200, "OK", r#"{"id":"s-1"}"#),
        ])
        .await;
        let (client, store) = client_with(&server.base_url);
        seed_tokens(&store, "tok-1", "ref-1");

        let ack: Value = client
            .post_json("/api/scripts/save", &serde_json::json!({"title": "t"}))
            .await
            .unwrap();
        assert_eq!(ack["id"], "s-1");
        assert_eq!(server.request_count(), 4);
        let retry = server.request(3).to_ascii_lowercase();
        assert!(retry.contains("x-csrf-token: c-2"));
        server.finish().await;
    }

    #[tokio::test]
    async fn csrf_rejected_request_is_retried_at_most_once() {
        let server = StubServer::start(vec![
            http_response(200, "OK", r#"{"csrf_token":"c-1"}"#),
            http_response(403, "Forbidden", r#"{"error":"csrf"}"#),
            http_response(200, "OK", r#"{"csrf_token":"c-2"}"#),
            http_response(403, "Forbidden", r#"{"error":"csrf"}"#),
        ])
        .await;
        let (client, store) = client_with(&server.base_url);
        seed_tokens(&store, "tok-1", "ref-1");

        let err = client
            .post_json::<Value>("/api/scripts/save", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Csrf(_)));
        assert_eq!(server.request_count(), 4, "second CSRF rejection is terminal");
        server.finish().await;
    }

    #[tokio::test]
    async fn non_csrf_403_is_not_retried() {
        let server = StubServer::start(vec![
            http_response(200, "OK", r#"{"csrf_token":"c-1"}"#),
            http_response(403, "Forbidden", r#"{"error":"subscription required"}"#),
        ])
        .await;
        let (client, store) = client_with(&server.base_url);
        seed_tokens(&store, "tok-1", "ref-1");

        let err = client
            .post_json::<Value>("/api/generations", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 403, .. }));
        assert_eq!(server.request_count(), 2);
        server.finish().await;
    }

    #[test]
    fn state_changing_method_detection() {
        assert!(is_state_changing(&Method::POST));
        assert!(is_state_changing(&Method::DELETE));
        assert!(!is_state_changing(&Method::GET));
        assert!(!is_state_changing(&Method::HEAD));
    }

    #[test]
    fn csrf_rejection_detection_is_case_insensitive() {
        assert!(is_csrf_rejection(r#"{"error":"Invalid CSRF token"}"#));
        assert!(is_csrf_rejection(r#"{"code":"csrf_mismatch"}"#));
        assert!(!is_csrf_rejection(r#"{"error":"forbidden"}"#));
    }
}
