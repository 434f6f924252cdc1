// Planora Client — Test support
//
// Scripted loopback HTTP server for exercising the request wrapper and the
// streaming readers without a real backend. Raw tokio TCP, one connection
// per scripted response, every request recorded verbatim.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub(crate) struct StubServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl StubServer {
    /// Serve the given raw responses in order, one connection each.
    pub async fn start(responses: Vec<String>) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let base_url = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());
        let requests: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();
        let handle = tokio::spawn(async move {
            for response in responses {
                let (mut stream, _) = match listener.accept().await {
                    Ok(c) => c,
                    Err(_) => return,
                };
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                // Read until headers plus the declared body are in.
                loop {
                    let n = match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    buf.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&buf);
                    if let Some(header_end) = text.find("\r\n\r\n") {
                        let body_len = text
                            .lines()
                            .find_map(|l| {
                                l.to_ascii_lowercase()
                                    .strip_prefix("content-length:")
                                    .and_then(|v| v.trim().parse::<usize>().ok())
                            })
                            .unwrap_or(0);
                        if buf.len() >= header_end + 4 + body_len {
                            break;
                        }
                    }
                }
                seen.lock().push(String::from_utf8_lossy(&buf).into_owned());
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        StubServer { base_url, requests, handle }
    }

    pub fn request(&self, idx: usize) -> String {
        self.requests.lock()[idx].clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub async fn finish(self) {
        self.handle.abort();
    }
}

/// Build a raw JSON HTTP response.
pub(crate) fn http_response(status: u16, reason: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status, reason, body.len(), body
    )
}

/// Build a raw SSE response from `data: ` payload lines.
pub(crate) fn sse_response(data_lines: &[&str]) -> String {
    let body: String = data_lines.iter().map(|d| format!("data: {}\n\n", d)).collect();
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}
