use crate::core::codec::Frame;
use crate::domain::error::GatewayResult;
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::info;

/// Connection state of the device link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Connected => write!(f, "connected"),
            LinkState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Terminal notification raised once when the device goes away
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkLost {
    pub reason: String,
}

/// Receive side of a link, handed to whoever owns the link.
#[derive(Debug)]
pub struct LinkEvents {
    /// Frames from the device in arrival order
    pub frames: mpsc::Receiver<Frame>,
    /// Resolves once, when the link transitions to `Disconnected`
    pub disconnected: oneshot::Receiver<LinkLost>,
}

/// Exclusive channel to the physical device
#[async_trait]
pub trait SerialLink: Send + Sync {
    /// Deliver one frame to the device.
    async fn send(&self, frame: &[u8]) -> GatewayResult<()>;

    fn state(&self) -> LinkState;

    /// Release the device. Raises the terminal notification if it has not
    /// fired yet.
    async fn close(&self);

    /// Human readable endpoint, for logs
    fn describe(&self) -> String;
}

/// One-shot `Connected -> Disconnected` transition shared by link implementations.
#[derive(Debug)]
pub(crate) struct DisconnectSignal {
    notifier: Mutex<Option<oneshot::Sender<LinkLost>>>,
}

impl DisconnectSignal {
    pub(crate) fn new() -> (Self, oneshot::Receiver<LinkLost>) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                notifier: Mutex::new(Some(sender)),
            },
            receiver,
        )
    }

    /// Fire the notification. Only the first call has any effect.
    pub(crate) fn fire(&self, reason: impl Into<String>) -> bool {
        let sender = self
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match sender {
            Some(sender) => {
                let reason = reason.into();
                info!("Serial link disconnected: {}", reason);
                // the owner may already have stopped listening
                let _ = sender.send(LinkLost { reason });
                true
            }
            None => false,
        }
    }

    pub(crate) fn state(&self) -> LinkState {
        let notifier = self.notifier.lock().unwrap_or_else(PoisonError::into_inner);
        if notifier.is_some() {
            LinkState::Connected
        } else {
            LinkState::Disconnected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signal_fires_once() {
        let (signal, receiver) = DisconnectSignal::new();
        assert_eq!(signal.state(), LinkState::Connected);

        assert!(signal.fire("unplugged"));
        assert!(!signal.fire("again"));
        assert_eq!(signal.state(), LinkState::Disconnected);

        let lost = receiver.await.unwrap();
        assert_eq!(lost.reason, "unplugged");
    }

    #[test]
    fn test_link_state_display() {
        assert_eq!(LinkState::Connected.to_string(), "connected");
        assert_eq!(LinkState::Disconnected.to_string(), "disconnected");
    }
}
