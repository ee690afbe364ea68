// Session module - Per-client handshake and relay
pub mod session;
pub mod state;

pub use session::{ClientSession, SessionContext, SIGNATURE};
pub use state::{SessionEnd, SessionReport, SessionState};
