use crate::core::session::{ClientSession, SessionContext, SessionReport};
use crate::domain::error::{GatewayError, GatewayResult};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Back-off after a failed `accept`, so a persistent error does not spin.
const ACCEPT_ERROR_DELAY: Duration = Duration::from_millis(100);

/// Listening socket that spawns one [`ClientSession`] per connection
pub struct GatewayListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl GatewayListener {
    pub async fn bind(bind_addr: &str) -> GatewayResult<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| GatewayError::Config {
                message: format!("Failed to bind to {}: {}", bind_addr, e),
            })?;
        let local_addr = listener.local_addr()?;

        info!("Gateway listening on {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` fires, then close the socket and
    /// wait for every live session to finish its cleanup.
    pub async fn serve(self, ctx: SessionContext, shutdown: CancellationToken) -> usize {
        let mut sessions: JoinSet<SessionReport> = JoinSet::new();
        let mut accepted = 0usize;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.listener.accept() => match result {
                    Ok((stream, addr)) => {
                        info!("New client connected: {}", addr);
                        accepted += 1;
                        let session = ClientSession::new(addr, ctx.clone());
                        sessions.spawn(session.run_tcp(stream));
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_DELAY).await;
                    }
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    log_session(joined);
                }
            }
        }

        let local_addr = self.local_addr;
        drop(self.listener);
        info!("Stopped accepting on {}", local_addr);

        while let Some(joined) = sessions.join_next().await {
            log_session(joined);
        }
        debug!("All client sessions finished");

        accepted
    }
}

fn log_session(joined: Result<SessionReport, tokio::task::JoinError>) {
    match joined {
        Ok(report) => debug!(
            "Session {} finished (relaying: {}, frames forwarded: {})",
            report.addr, report.reached_relaying, report.frames_forwarded
        ),
        Err(e) => warn!("Client session task failed: {}", e),
    }
}
