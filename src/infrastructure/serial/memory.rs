use crate::core::codec::Frame;
use crate::domain::error::{GatewayError, GatewayResult};
use crate::infrastructure::serial::link::{
    DisconnectSignal, LinkEvents, LinkState, SerialLink,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// In-process link with no hardware behind it.
///
/// The paired [`MemoryDevice`] plays the device: it injects frames, observes
/// what the gateway sent, and can pull the plug.
pub struct MemoryLink {
    sent: mpsc::UnboundedSender<Frame>,
    signal: Arc<DisconnectSignal>,
}

pub struct MemoryDevice {
    frames: Option<mpsc::Sender<Frame>>,
    sent: mpsc::UnboundedReceiver<Frame>,
    signal: Arc<DisconnectSignal>,
}

impl MemoryLink {
    pub fn new(frame_queue_capacity: usize) -> (Self, MemoryDevice, LinkEvents) {
        let (signal, disconnected) = DisconnectSignal::new();
        let signal = Arc::new(signal);
        let (frame_sender, frames) = mpsc::channel(frame_queue_capacity);
        let (sent_sender, sent_receiver) = mpsc::unbounded_channel();

        let link = Self {
            sent: sent_sender,
            signal: Arc::clone(&signal),
        };
        let device = MemoryDevice {
            frames: Some(frame_sender),
            sent: sent_receiver,
            signal,
        };

        (link, device, LinkEvents { frames, disconnected })
    }
}

#[async_trait]
impl SerialLink for MemoryLink {
    async fn send(&self, frame: &[u8]) -> GatewayResult<()> {
        if self.signal.state() == LinkState::Disconnected {
            return Err(GatewayError::link_lost("memory device disconnected"));
        }
        self.sent
            .send(frame.to_vec())
            .map_err(|_| GatewayError::link_lost("memory device dropped"))
    }

    fn state(&self) -> LinkState {
        self.signal.state()
    }

    async fn close(&self) {
        self.signal.fire("closed by owner");
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

impl MemoryDevice {
    /// Emit a frame as if the device produced it.
    pub async fn inject(&self, frame: impl Into<Frame>) -> GatewayResult<()> {
        let sender = self
            .frames
            .as_ref()
            .ok_or_else(|| GatewayError::link_lost("memory device disconnected"))?;
        sender
            .send(frame.into())
            .await
            .map_err(|_| GatewayError::link_lost("frame receiver dropped"))
    }

    /// Next frame the gateway delivered to the device.
    pub async fn next_sent(&mut self) -> Option<Frame> {
        self.sent.recv().await
    }

    pub fn try_next_sent(&mut self) -> Option<Frame> {
        self.sent.try_recv().ok()
    }

    /// Simulate losing the device.
    pub fn disconnect(&mut self, reason: &str) -> bool {
        let fired = self.signal.fire(reason);
        self.frames = None;
        debug!("Memory device disconnected (fired: {})", fired);
        fired
    }

    pub fn state(&self) -> LinkState {
        self.signal.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_and_inject() {
        let (link, mut device, mut events) = MemoryLink::new(4);

        link.send(b"to-device").await.unwrap();
        assert_eq!(device.next_sent().await.unwrap(), b"to-device");

        device.inject(b"from-device".to_vec()).await.unwrap();
        assert_eq!(events.frames.recv().await.unwrap(), b"from-device");
    }

    #[tokio::test]
    async fn test_disconnect_is_terminal() {
        let (link, mut device, mut events) = MemoryLink::new(4);

        assert!(device.disconnect("unplugged"));
        assert!(!device.disconnect("twice"));
        assert_eq!(link.state(), LinkState::Disconnected);

        let lost = events.disconnected.await.unwrap();
        assert_eq!(lost.reason, "unplugged");
        assert!(events.frames.recv().await.is_none());

        let err = link.send(b"late").await.unwrap_err();
        assert!(err.is_link_lost());
        assert!(device.inject(b"late".to_vec()).await.is_err());
    }
}
