use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::config::{GatewayConfig, RegistrationPolicy};

/// Command line arguments for the serial gateway
#[derive(Parser, Debug)]
#[command(
    name = "serial-gateway",
    version = env!("CARGO_PKG_VERSION"),
    about = "Share one serial device with many TCP clients",
    long_about = "Owns a serial device exclusively, accepts TCP clients, checks their signature frame, forwards their frames to the device and fans device frames out to every client."
)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Command to execute (defaults to `serve`)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the gateway
    Serve(ServeArgs),
    /// Print every frame the device emits
    Monitor(MonitorArgs),
    /// Connect to a running gateway and print fanned-out frames
    Probe(ProbeArgs),
    /// Configuration management commands
    Config(ConfigArgs),
    /// Display version information
    Version,
}

/// Serial device overrides shared by commands that open the device
#[derive(ClapArgs, Debug, Default, Clone)]
pub struct DeviceArgs {
    /// Serial device path
    #[arg(long)]
    pub device: Option<PathBuf>,

    /// Baud rate
    #[arg(short, long)]
    pub baud: Option<u32>,
}

/// Gateway arguments
#[derive(ClapArgs, Debug, Default)]
pub struct ServeArgs {
    #[command(flatten)]
    pub device: DeviceArgs,

    /// Host to listen on
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Accept clients without the signature frame
    #[arg(long)]
    pub no_signature: bool,

    /// Only fan out to clients that completed the handshake
    #[arg(long)]
    pub register_after_handshake: bool,
}

/// Monitor arguments
#[derive(ClapArgs, Debug, Default)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
}

/// Probe arguments
#[derive(ClapArgs, Debug)]
pub struct ProbeArgs {
    /// Gateway address (defaults to the configured host and port)
    #[arg(short, long)]
    pub addr: Option<String>,

    /// Skip the signature frame
    #[arg(long)]
    pub no_signature: bool,

    /// Hex payload to send after the handshake (repeatable)
    #[arg(short = 's', long = "send", value_parser = parse_hex)]
    pub payloads: Vec<HexPayload>,

    /// Stop after this many received frames
    #[arg(short = 'n', long)]
    pub count: Option<u64>,

    /// Connection timeout in milliseconds
    #[arg(long, default_value = "3000")]
    pub timeout_ms: u64,
}

/// Configuration arguments
#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Configuration commands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write a default configuration file
    Init,
    /// Print the effective configuration
    Show,
}

impl DeviceArgs {
    pub fn apply(&self, config: &mut GatewayConfig) {
        if let Some(device) = &self.device {
            config.serial_device_path = device.clone();
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
    }
}

impl ServeArgs {
    pub fn apply(&self, config: &mut GatewayConfig) {
        self.device.apply(config);
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.no_signature {
            config.check_signature = false;
        }
        if self.register_after_handshake {
            config.registration = RegistrationPolicy::AfterHandshake;
        }
    }
}

/// Raw bytes given on the command line as hex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexPayload(pub Vec<u8>);

fn parse_hex(value: &str) -> Result<HexPayload, String> {
    let cleaned: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&cleaned)
        .map(HexPayload)
        .map_err(|e| format!("invalid hex payload '{}': {}", value, e))
}
