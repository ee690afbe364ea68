// Serial module - Device link implementations
pub mod link;
pub mod memory;
pub mod port;

pub use link::{LinkEvents, LinkLost, LinkState, SerialLink};
pub use memory::{MemoryDevice, MemoryLink};
pub use port::SerialPortLink;
