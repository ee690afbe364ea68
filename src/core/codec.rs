//! Length-prefixed framing.
//!
//! Every frame on the wire is `[marker][len lo][len hi][payload...]`. TCP
//! clients and the gateway treat the marker as opaque; the serial device uses
//! it to tell direction apart (see [`DeviceFrameDecoder`]).

use crate::domain::error::{GatewayError, GatewayResult};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Opaque frame payload
pub type Frame = Vec<u8>;

/// Largest payload representable by the 16-bit length field
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Marker byte plus the two length bytes
pub const HEADER_LEN: usize = 3;

/// Marker on frames the gateway fans out to TCP clients
pub const FANOUT_MARKER: u8 = b'?';

/// Marker on frames written to the device
pub const DEVICE_TX_MARKER: u8 = 0x3c;

/// Marker on frames the device emits
pub const DEVICE_RX_MARKER: u8 = 0x3e;

/// Encode `payload` behind `marker` and its little-endian length.
///
/// # Panics
///
/// Panics if `payload` is longer than [`MAX_FRAME_LEN`].
pub fn encode_frame(marker: u8, payload: &[u8]) -> Vec<u8> {
    assert!(
        payload.len() <= MAX_FRAME_LEN,
        "frame payload of {} bytes exceeds {}",
        payload.len(),
        MAX_FRAME_LEN
    );

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.push(marker);
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Read one frame from `reader`.
///
/// Returns `Ok(None)` when the stream ends before a whole frame arrived,
/// including mid-header or mid-payload. Partial frames are never surfaced.
pub async fn read_frame<R>(reader: &mut R) -> GatewayResult<Option<Frame>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; HEADER_LEN];
    if !read_full(reader, &mut header).await? {
        return Ok(None);
    }

    let len = u16::from_le_bytes([header[1], header[2]]) as usize;
    let mut payload = vec![0u8; len];
    if !read_full(reader, &mut payload).await? {
        return Ok(None);
    }

    Ok(Some(payload))
}

/// Write one frame to `writer` and flush it.
pub async fn write_frame<W>(writer: &mut W, marker: u8, payload: &[u8]) -> GatewayResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(GatewayError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }
    writer.write_all(&encode_frame(marker, payload)).await?;
    writer.flush().await?;
    Ok(())
}

// `false` on clean end-of-stream, whether or not some bytes were consumed.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> GatewayResult<bool>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Incremental decoder for frames coming off the serial device.
///
/// Bytes arrive in arbitrary chunks. Anything before a [`DEVICE_RX_MARKER`]
/// is line noise and gets skipped.
#[derive(Debug, Default)]
pub struct DeviceFrameDecoder {
    buffer: Vec<u8>,
    skipped: u64,
}

impl DeviceFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, if one is buffered.
    ///
    /// A `>` inside line noise is taken at face value: its length is trusted
    /// and the decoder holds everything up to that length before emitting.
    pub fn next_frame(&mut self) -> Option<Frame> {
        match self.buffer.iter().position(|b| *b == DEVICE_RX_MARKER) {
            Some(0) => {}
            Some(start) => {
                self.skipped += start as u64;
                self.buffer.drain(..start);
            }
            None => {
                self.skipped += self.buffer.len() as u64;
                self.buffer.clear();
                return None;
            }
        }

        if self.buffer.len() < HEADER_LEN {
            return None;
        }
        let len = u16::from_le_bytes([self.buffer[1], self.buffer[2]]) as usize;
        if self.buffer.len() < HEADER_LEN + len {
            return None;
        }

        let frame = self.buffer[HEADER_LEN..HEADER_LEN + len].to_vec();
        self.buffer.drain(..HEADER_LEN + len);
        Some(frame)
    }

    /// Bytes discarded while hunting for a marker
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
