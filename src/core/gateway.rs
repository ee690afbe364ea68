//! Gateway orchestration.
//!
//! Three flows run side by side: the accept loop, the device frame pump and
//! a watcher for the link's terminal notification. Link loss cancels a token
//! shared by all of them and every session.

use crate::core::codec::{encode_frame, Frame, FANOUT_MARKER, MAX_FRAME_LEN};
use crate::core::fanout::ClientRegistry;
use crate::core::session::SessionContext;
use crate::domain::config::GatewayConfig;
use crate::domain::error::{GatewayError, GatewayResult};
use crate::infrastructure::serial::{LinkEvents, LinkLost, SerialLink};
use crate::infrastructure::tcp::GatewayListener;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Gateway {
    config: GatewayConfig,
    link: Arc<dyn SerialLink>,
    events: LinkEvents,
    registry: Arc<ClientRegistry>,
    listener: GatewayListener,
    cancel: CancellationToken,
}

impl Gateway {
    /// Bind the listening socket. Nothing is accepted until [`Gateway::run`].
    ///
    /// Cancelling `cancel` stops the gateway without it counting as link loss.
    pub async fn bind(
        config: GatewayConfig,
        link: Arc<dyn SerialLink>,
        events: LinkEvents,
        cancel: CancellationToken,
    ) -> GatewayResult<Self> {
        config.validate()?;
        let listener = GatewayListener::bind(&config.bind_addr()).await?;

        Ok(Self {
            config,
            link,
            events,
            registry: Arc::new(ClientRegistry::new()),
            listener,
            cancel,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    /// Serve until the link is lost or `cancel` fires.
    ///
    /// Returns `Err(LinkLost)` after a device disconnect and `Ok(())` after
    /// external cancellation. Either way the listener and every client socket
    /// are closed before this returns.
    pub async fn run(self) -> GatewayResult<()> {
        let Gateway {
            config,
            link,
            events,
            registry,
            listener,
            cancel,
        } = self;

        let shutdown = cancel.child_token();
        let ctx = SessionContext::from_config(
            &config,
            Arc::clone(&link),
            Arc::clone(&registry),
            shutdown.clone(),
        );

        info!(
            "Gateway bridging {} to {} (signature check: {}, registration: {:?})",
            link.describe(),
            listener.local_addr(),
            config.check_signature,
            config.registration
        );

        let (lost, accepted, stream_ended) = tokio::join!(
            watch_link(events.disconnected, shutdown.clone()),
            listener.serve(ctx, shutdown.clone()),
            process_frames(events.frames, Arc::clone(&registry), shutdown.clone()),
        );

        link.close().await;
        info!("Gateway stopped after {} connections", accepted);

        match lost {
            Some(lost) => Err(GatewayError::LinkLost {
                reason: lost.reason,
            }),
            None if stream_ended => Err(GatewayError::link_lost("device frame stream closed")),
            None => Ok(()),
        }
    }
}

async fn watch_link(
    disconnected: oneshot::Receiver<LinkLost>,
    shutdown: CancellationToken,
) -> Option<LinkLost> {
    tokio::select! {
        biased;
        result = disconnected => {
            let lost = result.unwrap_or_else(|_| LinkLost {
                reason: "link dropped without notice".to_string(),
            });
            warn!("Serial disconnected: {}", lost.reason);
            shutdown.cancel();
            Some(lost)
        }
        _ = shutdown.cancelled() => None,
    }
}

/// Pump device frames into the registry until shutdown.
///
/// Returns `true` if the frame stream itself ended.
async fn process_frames(
    mut frames: mpsc::Receiver<Frame>,
    registry: Arc<ClientRegistry>,
    shutdown: CancellationToken,
) -> bool {
    let stream_ended = loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break false,
            frame = frames.recv() => frame,
        };

        let Some(frame) = frame else {
            warn!("Device frame stream ended");
            shutdown.cancel();
            break true;
        };

        if frame.len() > MAX_FRAME_LEN {
            warn!("Dropping {} byte device frame, too large to re-frame", frame.len());
            continue;
        }

        debug!("frame: {}", hex::encode(&frame));
        let report = registry.broadcast(&encode_frame(FANOUT_MARKER, &frame)).await;
        debug!(
            "Fanned out {} byte frame to {} clients ({} failed)",
            frame.len(),
            report.delivered,
            report.failed
        );
    };

    let closed = registry.close_all().await;
    info!("Closed {} client sinks", closed);
    stream_ended
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::serial::MemoryLink;
    use std::time::Duration;

    fn test_config() -> GatewayConfig {
        GatewayConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..GatewayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let (link, _device, events) = MemoryLink::new(4);
        let config = GatewayConfig {
            frame_queue_capacity: 0,
            ..test_config()
        };
        let result = Gateway::bind(config, Arc::new(link), events, CancellationToken::new()).await;
        assert!(matches!(result, Err(GatewayError::Config { .. })));
    }

    #[tokio::test]
    async fn test_external_cancel_is_not_link_loss() {
        let (link, device, events) = MemoryLink::new(4);
        let cancel = CancellationToken::new();
        let gateway = Gateway::bind(test_config(), Arc::new(link), events, cancel.clone())
            .await
            .unwrap();

        let handle = tokio::spawn(gateway.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        // the gateway releases the device on the way out
        assert_eq!(device.state(), crate::infrastructure::serial::LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_link_loss_ends_run() {
        let (link, mut device, events) = MemoryLink::new(4);
        let cancel = CancellationToken::new();
        let gateway = Gateway::bind(test_config(), Arc::new(link), events, cancel.clone())
            .await
            .unwrap();

        let handle = tokio::spawn(gateway.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        device.disconnect("unplugged");

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        match result {
            Err(GatewayError::LinkLost { reason }) => assert_eq!(reason, "unplugged"),
            other => panic!("unexpected result: {:?}", other),
        }
        // the caller's token is untouched
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_process_frames_stops_on_closed_stream() {
        let (sender, receiver) = mpsc::channel(4);
        let registry = Arc::new(ClientRegistry::new());
        let shutdown = CancellationToken::new();

        drop(sender);
        assert!(process_frames(receiver, registry, shutdown.clone()).await);
        assert!(shutdown.is_cancelled());
    }
}
