use crate::cli::args::{
    Args, Command, ConfigArgs, ConfigCommand, MonitorArgs, ProbeArgs, ServeArgs,
};
use crate::core::gateway::Gateway;
use crate::core::monitor::monitor_link;
use crate::domain::config::GatewayConfig;
use crate::domain::error::{GatewayError, GatewayResult};
use crate::infrastructure::config::ConfigManager;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::serial::{SerialLink, SerialPortLink};
use crate::infrastructure::tcp::GatewayClient;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Execute CLI command
pub async fn execute_command(args: Args) -> GatewayResult<()> {
    let config_manager = match &args.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let mut config = config_manager.load_config()?;
    if args.debug {
        config.log_level = "debug".to_string();
    }

    init_logging(&config.log_level).map_err(|e| GatewayError::Config {
        message: format!("Failed to initialize logging: {}", e),
    })?;
    debug!("Loaded config from {}: {:?}", config_manager.config_path().display(), config);

    match args.command {
        None => execute_serve(ServeArgs::default(), config).await,
        Some(Command::Serve(serve_args)) => execute_serve(serve_args, config).await,
        Some(Command::Monitor(monitor_args)) => execute_monitor(monitor_args, config).await,
        Some(Command::Probe(probe_args)) => execute_probe(probe_args, config).await,
        Some(Command::Config(config_args)) => {
            execute_config_command(config_args, &config, &config_manager)
        }
        Some(Command::Version) => {
            println!("serial-gateway {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn execute_serve(args: ServeArgs, mut config: GatewayConfig) -> GatewayResult<()> {
    args.apply(&mut config);
    config.validate()?;

    let cancel = cancel_on_ctrl_c();
    let (link, events) = SerialPortLink::open(
        &config.serial_device_path,
        config.baud_rate,
        config.frame_queue_capacity,
    )?;

    let gateway = Gateway::bind(config, Arc::new(link), events, cancel).await?;
    gateway.run().await
}

async fn execute_monitor(args: MonitorArgs, mut config: GatewayConfig) -> GatewayResult<()> {
    args.device.apply(&mut config);
    config.validate()?;

    let cancel = cancel_on_ctrl_c();
    let (link, events) = SerialPortLink::open(
        &config.serial_device_path,
        config.baud_rate,
        config.frame_queue_capacity,
    )?;

    let result = monitor_link(events, cancel, |frame| {
        println!("{}", hex::encode(frame));
    })
    .await;

    link.close().await;
    result.map(|count| info!("Monitored {} frames", count))
}

async fn execute_probe(args: ProbeArgs, config: GatewayConfig) -> GatewayResult<()> {
    let addr = args.addr.unwrap_or_else(|| config.bind_addr());
    let mut client =
        GatewayClient::connect(&addr, Duration::from_millis(args.timeout_ms)).await?;

    if !args.no_signature {
        client.handshake().await?;
    }
    for payload in &args.payloads {
        client.send(&payload.0).await?;
    }

    let cancel = cancel_on_ctrl_c();
    let mut received = 0u64;
    while args.count.map_or(true, |limit| received < limit) {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = client.recv() => frame?,
        };
        let Some(frame) = frame else {
            info!("Gateway closed the connection");
            break;
        };
        received += 1;
        println!("{}", hex::encode(&frame));
    }

    info!("Received {} frames from {}", received, client.peer_addr());
    Ok(())
}

fn execute_config_command(
    args: ConfigArgs,
    config: &GatewayConfig,
    config_manager: &ConfigManager,
) -> GatewayResult<()> {
    match args.command {
        ConfigCommand::Init => {
            let path = config_manager.init_config()?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
        ConfigCommand::Show => {
            let content = toml::to_string_pretty(config).map_err(|e| GatewayError::Config {
                message: format!("Failed to serialize config: {}", e),
            })?;
            print!("{}", content);
            Ok(())
        }
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            token.cancel();
        }
    });
    cancel
}
