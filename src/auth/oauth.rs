// Planora Client — OAuth hand-off
//
// The hosted OAuth popup finishes by delivering a token envelope to the
// opener. In the browser that was postMessage/BroadcastChannel; natively the
// popup's landing page POSTs the same JSON envelope to a loopback listener
// we stand up for the duration of the login flow.
//
// Contract (kept verbatim from the web client, legacy aliases included):
//   • `type` must be one of GOOGLE_AUTH_SUCCESS / googleAuthSuccess /
//     login-success — three generations of the popup page are in the wild.
//   • Token fields arrive as accessToken/refreshToken or snake_case.
//   • Only envelopes from the trusted backend origin are accepted: the
//     `Origin` header on the loopback POST must match. Foreign or malformed
//     messages are logged and dropped; the listener keeps waiting.

use crate::atoms::constants::AUTH_MSG_TYPES;
use crate::atoms::error::ClientResult;
use crate::atoms::types::{TokenPair, User};
use log::{info, warn};
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

// ── Envelope ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    msg_type: String,
    #[serde(alias = "accessToken")]
    access_token: Option<String>,
    #[serde(alias = "refreshToken")]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<User>,
}

/// A successful OAuth hand-off: the token pair, plus the user record when
/// the popup included one (older popups omit it).
#[derive(Debug, Clone)]
pub struct AuthHandoff {
    pub tokens: TokenPair,
    pub user: Option<User>,
}

/// Parse an OAuth envelope. Returns `None` for unknown message types or
/// envelopes missing either token.
pub fn parse_envelope(body: &str) -> Option<AuthHandoff> {
    let envelope: Envelope = serde_json::from_str(body).ok()?;
    if !AUTH_MSG_TYPES.contains(&envelope.msg_type.as_str()) {
        return None;
    }
    let tokens = TokenPair {
        access_token: envelope.access_token?,
        refresh_token: envelope.refresh_token?,
    };
    Some(AuthHandoff { tokens, user: envelope.user })
}

/// Compare an `Origin` header value against the trusted backend origin
/// (scheme + host + port). A missing or unparseable header never matches.
pub fn origin_allowed(origin_header: Option<&str>, trusted: &Url) -> bool {
    let Some(raw) = origin_header else { return false };
    match Url::parse(raw.trim()) {
        Ok(origin) => origin.origin() == trusted.origin(),
        Err(_) => false,
    }
}

// ── Loopback listener ──────────────────────────────────────────────────

pub struct HandoffListener {
    listener: TcpListener,
    trusted_origin: Url,
}

impl HandoffListener {
    /// Bind a loopback listener on an OS-assigned port.
    pub async fn bind(trusted_origin: Url) -> ClientResult<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        info!(
            "[oauth] Hand-off listener on 127.0.0.1:{}",
            listener.local_addr()?.port()
        );
        Ok(HandoffListener { listener, trusted_origin })
    }

    /// The URL the popup should POST its envelope to.
    pub fn callback_url(&self) -> ClientResult<String> {
        Ok(format!("http://127.0.0.1:{}/callback", self.listener.local_addr()?.port()))
    }

    /// Accept connections until a valid envelope arrives from the trusted
    /// origin, then resolve with it. Invalid requests get an error response
    /// and the listener keeps waiting.
    pub async fn await_handoff(&self) -> ClientResult<AuthHandoff> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            match handle_request(stream, &self.trusted_origin).await {
                Ok(Some(handoff)) => return Ok(handoff),
                Ok(None) => {}
                Err(e) => warn!("[oauth] Connection from {} failed: {}", peer, e),
            }
        }
    }
}

/// Read one HTTP request off the stream and try to extract an envelope.
/// `Ok(None)` means the request was handled (preflight, bad envelope) but
/// the hand-off is still pending.
async fn handle_request(
    mut stream: TcpStream,
    trusted: &Url,
) -> ClientResult<Option<AuthHandoff>> {
    // Read until the headers and the declared body are in; envelopes can
    // arrive split across TCP segments.
    const MAX_REQUEST_BYTES: usize = 64 * 1024;
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let body_len = header_value(&text, "content-length")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + body_len {
                break;
            }
        }
        if buf.len() > MAX_REQUEST_BYTES {
            break;
        }
    }
    if buf.is_empty() {
        return Ok(None);
    }

    let request_str = String::from_utf8_lossy(&buf).into_owned();
    let first_line = request_str.lines().next().unwrap_or("");
    let origin = header_value(&request_str, "origin");

    // CORS preflight: the popup page POSTs JSON cross-origin to loopback,
    // so the browser asks first. Only the trusted origin gets a green light.
    if first_line.starts_with("OPTIONS") {
        let response = if origin_allowed(origin.as_deref(), trusted) {
            format!(
                "HTTP/1.1 204 No Content\r\n\
                 Access-Control-Allow-Origin: {}\r\n\
                 Access-Control-Allow-Methods: POST, OPTIONS\r\n\
                 Access-Control-Allow-Headers: Content-Type\r\n\
                 Connection: close\r\n\r\n",
                origin.as_deref().unwrap_or_default()
            )
        } else {
            "HTTP/1.1 403 Forbidden\r\nConnection: close\r\n\r\n".to_string()
        };
        stream.write_all(response.as_bytes()).await?;
        return Ok(None);
    }

    if !first_line.starts_with("POST") {
        let resp = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
        stream.write_all(resp.as_bytes()).await?;
        return Ok(None);
    }

    if !origin_allowed(origin.as_deref(), trusted) {
        warn!(
            "[oauth] Dropping envelope from untrusted origin {:?}",
            origin.as_deref().unwrap_or("<none>")
        );
        let resp = "HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
        stream.write_all(resp.as_bytes()).await?;
        return Ok(None);
    }

    // Body follows the blank line; small envelopes always fit one read.
    let body = request_str.split("\r\n\r\n").nth(1).unwrap_or("");
    match parse_envelope(body) {
        Some(handoff) => {
            info!("[oauth] Token envelope accepted");
            let response = format!(
                "HTTP/1.1 204 No Content\r\nAccess-Control-Allow-Origin: {}\r\nConnection: close\r\n\r\n",
                origin.as_deref().unwrap_or_default()
            );
            stream.write_all(response.as_bytes()).await?;
            Ok(Some(handoff))
        }
        None => {
            warn!("[oauth] Malformed or unknown envelope dropped");
            let resp = "HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
            stream.write_all(resp.as_bytes()).await?;
            Ok(None)
        }
    }
}

/// Extract a header value (case-insensitive name) from raw HTTP headers.
fn header_value(request: &str, name: &str) -> Option<String> {
    let prefix = format!("{}:", name);
    for line in request.lines() {
        if line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(&prefix) {
            return Some(line[prefix.len()..].trim().to_string());
        }
    }
    None
}

// ── Tests ──────────────────────────────────────────────────────────────
