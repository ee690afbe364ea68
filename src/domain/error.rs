use thiserror::Error;

/// Gateway unified error type
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Network error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid signature: {}", hex::encode(.received))]
    InvalidSignature { received: Vec<u8> },

    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serial link lost: {reason}")]
    LinkLost { reason: String },
}

/// Coarse classification used to decide how far an error may propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Local I/O failure scoped to one session or the link.
    Transport,
    /// Peer violated the wire protocol; ends only that session.
    Protocol,
    /// Terminal loss of the device; ends the whole gateway.
    LinkLost,
    Config,
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Serial(_) | GatewayError::Io(_) => ErrorKind::Transport,
            GatewayError::InvalidSignature { .. }
            | GatewayError::FrameTooLarge { .. }
            | GatewayError::Protocol(_) => ErrorKind::Protocol,
            GatewayError::LinkLost { .. } => ErrorKind::LinkLost,
            GatewayError::Config { .. } => ErrorKind::Config,
        }
    }

    pub fn is_link_lost(&self) -> bool {
        self.kind() == ErrorKind::LinkLost
    }

    pub fn link_lost(reason: impl Into<String>) -> Self {
        GatewayError::LinkLost {
            reason: reason.into(),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
