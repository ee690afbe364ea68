// Core module - Framing, fan-out, sessions and orchestration
pub mod codec;
pub mod fanout;
pub mod gateway;
pub mod monitor;
pub mod session;

pub use fanout::{ClientRegistry, ClientWriter};
pub use gateway::Gateway;
