//! Serial Gateway Library
//!
//! Shares one exclusively owned serial device with many TCP clients. Client
//! frames are forwarded to the device after a signature handshake, and every
//! frame the device emits is fanned out to all connected clients.

pub mod cli;
pub mod core;
pub mod domain;
pub mod infrastructure;

pub use crate::domain::error::{ErrorKind, GatewayError, GatewayResult};
pub use crate::domain::config::{GatewayConfig, RegistrationPolicy};
pub use crate::core::codec::{encode_frame, read_frame, Frame, MAX_FRAME_LEN};
pub use crate::core::fanout::ClientRegistry;
pub use crate::core::gateway::Gateway;
pub use crate::core::session::{ClientSession, SessionState, SIGNATURE};
pub use crate::infrastructure::serial::{LinkEvents, LinkState, MemoryDevice, MemoryLink, SerialLink, SerialPortLink};
