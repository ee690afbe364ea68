use crate::core::codec::{read_frame, write_frame, Frame};
use crate::core::session::SIGNATURE;
use crate::domain::error::{GatewayError, GatewayResult};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Marker this client puts on outgoing frames
pub const CLIENT_MARKER: u8 = 0x3c;

/// Minimal framed client for talking to a running gateway
pub struct GatewayClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer_addr: SocketAddr,
}

impl GatewayClient {
    pub async fn connect(addr: &str, timeout: Duration) -> GatewayResult<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                GatewayError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("Connection timeout to {}", addr),
                ))
            })??;

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }
        let peer_addr = stream.peer_addr()?;
        info!("Connected to gateway at {}", peer_addr);

        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            peer_addr,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Send the signature frame the gateway expects first.
    pub async fn handshake(&mut self) -> GatewayResult<()> {
        self.send(SIGNATURE).await
    }

    pub async fn send(&mut self, payload: &[u8]) -> GatewayResult<()> {
        write_frame(&mut self.writer, CLIENT_MARKER, payload).await?;
        debug!("Sent {} byte frame to {}", payload.len(), self.peer_addr);
        Ok(())
    }

    /// Next fanned-out frame, or `None` once the gateway closes the connection.
    pub async fn recv(&mut self) -> GatewayResult<Option<Frame>> {
        read_frame(&mut self.reader).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::{encode_frame, FANOUT_MARKER};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_client_handshake_and_recv() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut header = [0u8; 3];
            stream.read_exact(&mut header).await.unwrap();
            let mut signature = vec![0u8; u16::from_le_bytes([header[1], header[2]]) as usize];
            stream.read_exact(&mut signature).await.unwrap();

            stream.write_all(&encode_frame(FANOUT_MARKER, b"pong")).await.unwrap();
            signature
        });

        let mut client = GatewayClient::connect(&addr, Duration::from_secs(1)).await.unwrap();
        client.handshake().await.unwrap();

        assert_eq!(client.recv().await.unwrap(), Some(b"pong".to_vec()));
        assert_eq!(server.await.unwrap(), SIGNATURE);
        assert_eq!(client.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = GatewayClient::connect(&addr, Duration::from_secs(1)).await;
        assert!(result.is_err());
    }
}
