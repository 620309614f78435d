//! Error types for the gateway core.

use thiserror::Error;

/// Errors raised by the supervisor, conversation router, and session model.
///
/// Each variant corresponds to one of the error-handling policies in the
/// design: most are logged and absorbed rather than propagated to a caller,
/// but giving them a name keeps the policy auditable (see the match arms in
/// `BackendSupervisor::handle_disconnect` and friends).
#[derive(Debug, Error)]
pub enum GatewayError {
    /// IO error on a backend connection (accept, read, write).
    #[error("backend IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing/decode error on the backend RPC stream. Always fatal for
    /// that stream (spec §7: "Protocol violation").
    #[error("backend wire protocol violation: {0}")]
    Wire(#[from] xgate_wire::WireError),

    /// A wrapper envelope carried a tag outside the closed set, or one
    /// whose payload didn't parse as the tag implies.
    #[error("unexpected envelope on backend stream: {0}")]
    ProtocolViolation(String),

    /// Spawning the backend child process failed.
    #[error("failed to spawn backend process: {0}")]
    SpawnFailed(String),

    /// A JID that should already be bound to a session/conversation isn't.
    #[error("no such user session: {0}")]
    UnknownUser(String),

    /// Malformed configuration detected at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid JID construction (e.g. rewriting a legacy name produced an
    /// illegal node).
    #[error("invalid JID: {0}")]
    InvalidJid(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
