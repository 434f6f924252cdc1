// Planora Client — Session event bus
//
// The web client reset its UI through a global logout flow; the SDK exposes
// the same moments as a broadcast channel front-ends subscribe to. Events are
// fire-and-forget: a send with no live subscribers is not an error.

use log::info;
use tokio::sync::broadcast;

/// Reason a session ended, attached to `SessionEvent::LoggedOut`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutReason {
    /// The user asked to log out.
    UserRequested,
    /// Token refresh failed; credentials are no longer usable.
    RefreshFailed,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Tokens were persisted after an OAuth hand-off.
    LoggedIn,
    /// Session storage was cleared; front-ends should reset to logged-out UI.
    LoggedOut { reason: LogoutReason },
    /// A 401 triggered a successful token refresh.
    TokenRefreshed,
    /// The stored subscription status string changed.
    SubscriptionChanged { status: String },
}

/// Shared handle to the session event channel.
#[derive(Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(32);
        SessionEvents { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Broadcast an event. Dropped silently when nobody is listening.
    pub fn emit(&self, event: SessionEvent) {
        if let SessionEvent::LoggedOut { reason } = &event {
            info!("[events] Session ended: {:?}", reason);
        }
        let _ = self.tx.send(event);
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let events = SessionEvents::new();
        let mut rx = events.subscribe();
        events.emit(SessionEvent::TokenRefreshed);
        match rx.recv().await.unwrap() {
            SessionEvent::TokenRefreshed => {}
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emit_without_subscribers_is_not_an_error() {
        let events = SessionEvents::new();
        events.emit(SessionEvent::LoggedIn);
    }
}
