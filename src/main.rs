// Serial Gateway - share one serial device with many TCP clients
use clap::Parser;
use serial_gateway::cli::{execute_command, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    execute_command(args).await?;
    Ok(())
}
