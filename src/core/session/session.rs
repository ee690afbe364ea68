use crate::core::codec::{read_frame, Frame};
use crate::core::fanout::{ClientRegistry, ClientWriter};
use crate::core::session::state::{SessionEnd, SessionReport, SessionState};
use crate::domain::config::{GatewayConfig, RegistrationPolicy};
use crate::domain::error::GatewayError;
use crate::infrastructure::serial::SerialLink;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// First frame a client must send when signature checking is enabled
pub const SIGNATURE: &[u8] = b"\x01\x03      mccli";

/// Everything a session shares with the rest of the gateway
#[derive(Clone)]
pub struct SessionContext {
    pub link: Arc<dyn SerialLink>,
    pub registry: Arc<ClientRegistry>,
    pub check_signature: bool,
    pub registration: RegistrationPolicy,
    pub client_queue_capacity: usize,
    pub shutdown: CancellationToken,
}

impl SessionContext {
    pub fn from_config(
        config: &GatewayConfig,
        link: Arc<dyn SerialLink>,
        registry: Arc<ClientRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            link,
            registry,
            check_signature: config.check_signature,
            registration: config.registration,
            client_queue_capacity: config.client_queue_capacity,
            shutdown,
        }
    }
}

/// One accepted client connection
pub struct ClientSession {
    addr: SocketAddr,
    ctx: SessionContext,
    state: SessionState,
    reached_relaying: bool,
    frames_forwarded: u64,
}

impl ClientSession {
    pub fn new(addr: SocketAddr, ctx: SessionContext) -> Self {
        let state = if ctx.check_signature {
            SessionState::AwaitingSignature
        } else {
            SessionState::Relaying
        };

        Self {
            addr,
            ctx,
            state,
            reached_relaying: false,
            frames_forwarded: 0,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Run the session over an accepted TCP connection.
    pub async fn run_tcp(self, stream: TcpStream) -> SessionReport {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", self.addr, e);
        }
        let (reader, writer) = stream.into_split();
        self.run(BufReader::new(reader), writer).await
    }

    /// Drive the session to completion.
    ///
    /// Whatever happens, the address is unregistered and the connection
    /// closed before this returns.
    pub async fn run<R, W>(mut self, mut reader: R, writer: W) -> SessionReport
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let closing = self.ctx.shutdown.child_token();
        let (sink, writer_task) = ClientWriter::spawn(
            self.addr,
            writer,
            self.ctx.client_queue_capacity,
            closing.clone(),
        );

        let mut pending = Some(sink);
        if self.ctx.registration == RegistrationPolicy::OnAccept {
            self.register(&mut pending).await;
        }

        let end = self.drive(&mut reader, &mut pending, &closing).await;

        self.state = SessionState::Closed;
        self.ctx.registry.remove(&self.addr).await;
        drop(pending);
        closing.cancel();
        if let Err(e) = writer_task.await {
            warn!("Writer task for {} panicked: {}", self.addr, e);
        }

        match &end {
            SessionEnd::Failed(e) => warn!("Session {} closed: {}", self.addr, e),
            other => info!("Session {} closed: {}", self.addr, other),
        }

        SessionReport {
            addr: self.addr,
            reached_relaying: self.reached_relaying,
            frames_forwarded: self.frames_forwarded,
            end,
        }
    }

    async fn drive<R>(
        &mut self,
        reader: &mut R,
        pending: &mut Option<ClientWriter>,
        closing: &CancellationToken,
    ) -> SessionEnd
    where
        R: AsyncRead + Unpin + Send,
    {
        if self.state == SessionState::AwaitingSignature {
            let frame = match self.next_frame(reader, closing).await {
                Ok(Some(frame)) => frame,
                Ok(None) => return SessionEnd::ClientClosed,
                Err(end) => return end,
            };

            if frame != SIGNATURE {
                return SessionEnd::Failed(GatewayError::InvalidSignature { received: frame });
            }
            debug!("Client {} sent a valid signature", self.addr);

            if let Err(e) = self.forward(&frame).await {
                return SessionEnd::Failed(e);
            }
        }

        self.state = SessionState::Relaying;
        self.reached_relaying = true;
        if self.ctx.registration == RegistrationPolicy::AfterHandshake {
            self.register(pending).await;
        }
        info!("Client {} relaying", self.addr);

        loop {
            match self.next_frame(reader, closing).await {
                Ok(Some(frame)) => {
                    if let Err(e) = self.forward(&frame).await {
                        return SessionEnd::Failed(e);
                    }
                }
                Ok(None) => return SessionEnd::ClientClosed,
                Err(end) => return end,
            }
        }
    }

    async fn next_frame<R>(
        &self,
        reader: &mut R,
        closing: &CancellationToken,
    ) -> Result<Option<Frame>, SessionEnd>
    where
        R: AsyncRead + Unpin + Send,
    {
        tokio::select! {
            _ = closing.cancelled() => {
                if self.ctx.shutdown.is_cancelled() {
                    Err(SessionEnd::Cancelled)
                } else {
                    Err(SessionEnd::Failed(GatewayError::Io(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "client stopped accepting writes",
                    ))))
                }
            }
            frame = read_frame(reader) => frame.map_err(SessionEnd::Failed),
        }
    }

    async fn forward(&mut self, frame: &[u8]) -> Result<(), GatewayError> {
        debug!("{} -> link: {}", self.addr, hex::encode(frame));
        self.ctx.link.send(frame).await?;
        self.frames_forwarded += 1;
        Ok(())
    }

    async fn register(&self, pending: &mut Option<ClientWriter>) {
        if let Some(sink) = pending.take() {
            self.ctx.registry.add(self.addr, sink).await;
        }
    }
}
