// Logging module - Logging infrastructure
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use std::io;

/// Initialize logging system
///
/// `RUST_LOG` wins over `level` when set. A second call is a no-op.
pub fn init_logging(level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(level)))?;

    let initialized = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()
        .is_ok();

    if initialized {
        tracing::info!("Serial gateway logging initialized at {}", level);
    }
    Ok(())
}

fn default_directives(level: &str) -> String {
    format!("serial_gateway={},warn", level.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_init() {
        assert!(init_logging("debug").is_ok());
        assert!(init_logging("info").is_ok());
    }

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directives("DEBUG"), "serial_gateway=debug,warn");
    }
}
