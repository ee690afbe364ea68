use crate::domain::error::GatewayError;
use std::net::SocketAddr;

/// Client session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the signature frame
    AwaitingSignature,
    /// Forwarding client frames to the link
    Relaying,
    /// Unregistered and disconnected
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::AwaitingSignature => write!(f, "AwaitingSignature"),
            SessionState::Relaying => write!(f, "Relaying"),
            SessionState::Closed => write!(f, "Closed"),
        }
    }
}

/// Why a session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// Client closed the stream, possibly mid-frame
    ClientClosed,
    /// Gateway is shutting down
    Cancelled,
    Failed(GatewayError),
}

impl std::fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEnd::ClientClosed => write!(f, "client closed"),
            SessionEnd::Cancelled => write!(f, "cancelled"),
            SessionEnd::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Summary returned once a session is closed
#[derive(Debug)]
pub struct SessionReport {
    pub addr: SocketAddr,
    pub reached_relaying: bool,
    /// Frames sent to the link, handshake echo included
    pub frames_forwarded: u64,
    pub end: SessionEnd,
}

impl SessionReport {
    pub fn is_failure(&self) -> bool {
        matches!(self.end, SessionEnd::Failed(_))
    }
}
