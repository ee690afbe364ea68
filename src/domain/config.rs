use crate::domain::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Path of the serial device owned by the gateway
    #[serde(default = "default_serial_device_path")]
    pub serial_device_path: PathBuf,
    /// Host to listen on
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port to listen on (0 picks an ephemeral port)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Serial baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Default log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Require the signature frame before relaying
    #[serde(default = "default_check_signature")]
    pub check_signature: bool,
    /// When a client becomes eligible for fan-out
    #[serde(default)]
    pub registration: RegistrationPolicy,
    /// Capacity of the device frame queue
    #[serde(default = "default_frame_queue_capacity")]
    pub frame_queue_capacity: usize,
    /// Capacity of each client's outbound queue
    #[serde(default = "default_client_queue_capacity")]
    pub client_queue_capacity: usize,
}

/// Fan-out registration timing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPolicy {
    /// Register as soon as the connection is accepted, before the handshake.
    #[default]
    OnAccept,
    /// Register only once the session enters relaying.
    AfterHandshake,
}

// Default value functions
fn default_serial_device_path() -> PathBuf {
    PathBuf::from("/dev/ttyUSB0")
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1234
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_check_signature() -> bool {
    true
}

fn default_frame_queue_capacity() -> usize {
    256
}

fn default_client_queue_capacity() -> usize {
    64
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            serial_device_path: default_serial_device_path(),
            host: default_host(),
            port: default_port(),
            baud_rate: default_baud_rate(),
            log_level: default_log_level(),
            check_signature: default_check_signature(),
            registration: RegistrationPolicy::default(),
            frame_queue_capacity: default_frame_queue_capacity(),
            client_queue_capacity: default_client_queue_capacity(),
        }
    }
}

impl GatewayConfig {
    /// Address string suitable for `TcpListener::bind`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject values the gateway cannot run with
    pub fn validate(&self) -> GatewayResult<()> {
        if self.serial_device_path.as_os_str().is_empty() {
            return Err(GatewayError::Config {
                message: "serial_device_path must not be empty".to_string(),
            });
        }
        if self.baud_rate == 0 {
            return Err(GatewayError::Config {
                message: "baud_rate must be greater than zero".to_string(),
            });
        }
        if self.frame_queue_capacity == 0 || self.client_queue_capacity == 0 {
            return Err(GatewayError::Config {
                message: "queue capacities must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
