// TCP module - Gateway listener and framed client
pub mod client;
pub mod server;

pub use client::GatewayClient;
pub use server::GatewayListener;
