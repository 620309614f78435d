//! Backend client (C3): the supervisor's per-connection bookkeeping.
//!
//! Grounded on `networkpluginserver.cpp`'s `Client` struct (`pongReceived`,
//! `users`, `connection`) — reworked per spec §9's "arena ownership keyed by
//! stable integer IDs" note: the supervisor is the sole owner, keyed by
//! `ClientId`, instead of raw pointers threaded through `User::setData`.

use std::collections::HashSet;
use std::fmt;

use tokio::sync::mpsc;

use xgate_wire::WrapperMessage;

/// Stable integer id for one backend connection. Never reused within a
/// supervisor's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Per-child connection endpoint inside the gateway (spec §3 "Backend
/// client"). The actual socket lives in a reader/writer task pair; this
/// struct only holds the bookkeeping the supervisor needs: where to write
/// (`outbound_tx`), who's assigned, and liveness.
pub struct BackendClient {
    pub id: ClientId,
    outbound_tx: mpsc::UnboundedSender<WrapperMessage>,
    pub users: HashSet<String>,
    pub pong_received: bool,
}

impl BackendClient {
    pub fn new(id: ClientId, outbound_tx: mpsc::UnboundedSender<WrapperMessage>) -> Self {
        Self {
            id,
            outbound_tx,
            users: HashSet::new(),
            pong_received: true,
        }
    }

    /// Enqueue an envelope for the writer task. Best-effort: a closed
    /// channel means the connection is already tearing down, so the send
    /// is dropped rather than propagated as an error (spec §7 "in-flight
    /// messages are dropped if the owning client dies").
    pub fn send(&self, wrapper: WrapperMessage) {
        if self.outbound_tx.send(wrapper).is_err() {
            tracing::warn!(client = %self.id, "backend write channel closed; dropping envelope");
        }
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        assert_eq!(ClientId(7).to_string(), "client-7");
    }

    #[test]
    fn send_after_receiver_dropped_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let client = BackendClient::new(ClientId(1), tx);
        client.send(xgate_wire::wrap(xgate_wire::WrapperType::Ping, xgate_wire::Ping {}));
    }
}
