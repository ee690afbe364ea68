use crate::domain::error::{GatewayError, GatewayResult};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outbound sink for one TCP client.
///
/// Writes are queued to a dedicated writer task so a stalled peer never
/// blocks the caller. A peer that falls a full queue behind is cut off
/// rather than served a stream with gaps.
#[derive(Debug, Clone)]
pub struct ClientWriter {
    addr: SocketAddr,
    sender: mpsc::Sender<Arc<[u8]>>,
    closing: CancellationToken,
}

impl ClientWriter {
    /// Spawn the writer task that drains queued bytes into `stream`.
    ///
    /// The task shuts `stream` down and exits once every `ClientWriter` clone
    /// is dropped or `closing` is cancelled. A write failure or an overflowing
    /// queue cancels `closing` itself so the owning session notices.
    pub fn spawn<W>(
        addr: SocketAddr,
        mut stream: W,
        capacity: usize,
        closing: CancellationToken,
    ) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, mut receiver) = mpsc::channel::<Arc<[u8]>>(capacity);

        let task_closing = closing.clone();
        let handle = tokio::spawn(async move {
            let closing = task_closing;
            loop {
                let bytes = tokio::select! {
                    _ = closing.cancelled() => break,
                    bytes = receiver.recv() => match bytes {
                        Some(bytes) => bytes,
                        None => break,
                    },
                };

                let result = tokio::select! {
                    _ = closing.cancelled() => break,
                    result = async {
                        stream.write_all(&bytes).await?;
                        stream.flush().await
                    } => result,
                };

                if let Err(e) = result {
                    warn!("Write to client {} failed: {}", addr, e);
                    closing.cancel();
                    break;
                }
                debug!("Wrote {} bytes to {}", bytes.len(), addr);
            }

            if let Err(e) = stream.shutdown().await {
                debug!("Shutdown of client {} stream failed: {}", addr, e);
            }
        });

        (
            Self {
                addr,
                sender,
                closing,
            },
            handle,
        )
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queue `bytes` without waiting.
    ///
    /// A full queue fails the write and signals `closing`, ending the client.
    pub fn write(&self, bytes: Arc<[u8]>) -> GatewayResult<()> {
        self.sender.try_send(bytes).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                self.closing.cancel();
                GatewayError::Io(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    format!("outbound queue for {} is full, dropping client", self.addr),
                ))
            }
            mpsc::error::TrySendError::Closed(_) => GatewayError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("writer for {} has stopped", self.addr),
            )),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Result of one broadcast pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Active client sinks keyed by peer address
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<SocketAddr, ClientWriter>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `writer` under `addr`, returning any entry it replaced.
    pub async fn add(&self, addr: SocketAddr, writer: ClientWriter) -> Option<ClientWriter> {
        let previous = self.clients.write().await.insert(addr, writer);
        if previous.is_some() {
            warn!("Client {} re-registered, replacing previous sink", addr);
        } else {
            debug!("Client {} registered for fan-out", addr);
        }
        previous
    }

    /// Drop the entry for `addr`. Absent entries are ignored.
    pub async fn remove(&self, addr: &SocketAddr) -> bool {
        let removed = self.clients.write().await.remove(addr).is_some();
        if removed {
            debug!("Client {} unregistered", addr);
        }
        removed
    }

    /// Queue `bytes` on every registered sink.
    ///
    /// A failing sink is logged and skipped. It stays registered until its
    /// session removes it.
    pub async fn broadcast(&self, bytes: &[u8]) -> BroadcastReport {
        let shared: Arc<[u8]> = Arc::from(bytes);
        let clients = self.clients.read().await;
        let mut report = BroadcastReport::default();

        for (addr, writer) in clients.iter() {
            match writer.write(Arc::clone(&shared)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Broadcast to {} failed: {}", addr, e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Drop every sink, letting each writer task flush and close its stream.
    pub async fn close_all(&self) -> usize {
        let mut clients = self.clients.write().await;
        let count = clients.len();
        clients.clear();
        count
    }

    pub async fn contains(&self, addr: &SocketAddr) -> bool {
        self.clients.read().await.contains_key(addr)
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    pub async fn addresses(&self) -> Vec<SocketAddr> {
        self.clients.read().await.keys().copied().collect()
    }
}
