use crate::core::codec::{
    encode_frame, DeviceFrameDecoder, Frame, DEVICE_TX_MARKER, MAX_FRAME_LEN,
};
use crate::domain::error::{GatewayError, GatewayResult};
use crate::infrastructure::serial::link::{
    DisconnectSignal, LinkEvents, LinkState, SerialLink,
};
use async_trait::async_trait;
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

const READ_TIMEOUT: Duration = Duration::from_millis(100);
const READ_BUFFER_SIZE: usize = 1024;

/// Device link over a local serial port.
///
/// Reads happen on a dedicated thread because `serialport` is blocking.
/// Writes go through tokio's blocking pool.
pub struct SerialPortLink {
    path: String,
    baud_rate: u32,
    writer: Arc<Mutex<Box<dyn SerialPort>>>,
    signal: Arc<DisconnectSignal>,
    stop: Arc<AtomicBool>,
}

impl SerialPortLink {
    pub fn open(
        path: &Path,
        baud_rate: u32,
        frame_queue_capacity: usize,
    ) -> GatewayResult<(Self, LinkEvents)> {
        let path = path.to_string_lossy().into_owned();
        let port = serialport::new(path.as_str(), baud_rate)
            .timeout(READ_TIMEOUT)
            .open()?;
        let reader = port.try_clone()?;

        info!("Serial port {} opened at {} baud", path, baud_rate);

        let (signal, disconnected) = DisconnectSignal::new();
        let signal = Arc::new(signal);
        let stop = Arc::new(AtomicBool::new(false));
        let (frame_sender, frames) = mpsc::channel(frame_queue_capacity);

        let reader_signal = Arc::clone(&signal);
        let reader_stop = Arc::clone(&stop);
        std::thread::Builder::new()
            .name("serial-reader".to_string())
            .spawn(move || read_loop(reader, frame_sender, reader_signal, reader_stop))?;

        let link = Self {
            path,
            baud_rate,
            writer: Arc::new(Mutex::new(port)),
            signal,
            stop,
        };

        Ok((link, LinkEvents { frames, disconnected }))
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

fn read_loop(
    mut port: Box<dyn SerialPort>,
    frames: mpsc::Sender<Frame>,
    signal: Arc<DisconnectSignal>,
    stop: Arc<AtomicBool>,
) {
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    let mut decoder = DeviceFrameDecoder::new();

    while !stop.load(Ordering::Acquire) {
        match port.read(&mut buffer) {
            Ok(0) => {
                signal.fire("serial port reached end of stream");
                return;
            }
            Ok(n) => {
                decoder.push(&buffer[..n]);
                while let Some(frame) = decoder.next_frame() {
                    debug!("Received {} byte frame from device", frame.len());
                    if frames.blocking_send(frame).is_err() {
                        debug!("Frame receiver dropped, stopping serial reader");
                        return;
                    }
                }
            }
            Err(ref e)
                if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::Interrupted =>
            {
                continue;
            }
            Err(e) => {
                error!("Failed to read from serial port: {}", e);
                signal.fire(format!("read failed: {}", e));
                return;
            }
        }
    }

    debug!(
        "Serial reader stopped ({} noise bytes skipped)",
        decoder.skipped()
    );
}

#[async_trait]
impl SerialLink for SerialPortLink {
    async fn send(&self, frame: &[u8]) -> GatewayResult<()> {
        if self.signal.state() == LinkState::Disconnected {
            return Err(GatewayError::link_lost(format!("{} is disconnected", self.path)));
        }
        if frame.len() > MAX_FRAME_LEN {
            return Err(GatewayError::FrameTooLarge {
                len: frame.len(),
                max: MAX_FRAME_LEN,
            });
        }

        let bytes = encode_frame(DEVICE_TX_MARKER, frame);
        let writer = Arc::clone(&self.writer);
        tokio::task::spawn_blocking(move || -> io::Result<()> {
            let mut port = writer.lock().unwrap_or_else(PoisonError::into_inner);
            port.write_all(&bytes)?;
            port.flush()
        })
        .await
        .map_err(|e| GatewayError::Io(io::Error::new(io::ErrorKind::Other, e)))??;

        debug!("Sent {} byte frame to device", frame.len());
        Ok(())
    }

    fn state(&self) -> LinkState {
        self.signal.state()
    }

    async fn close(&self) {
        self.stop.store(true, Ordering::Release);
        self.signal.fire("closed by owner");
        info!("Serial link {} closed", self.path);
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.path, self.baud_rate)
    }
}

impl Drop for SerialPortLink {
    fn drop(&mut self) {
        // The reader thread notices within one read timeout.
        self.stop.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_fails_gracefully() {
        // /dev/null is not a serial port
        let result = SerialPortLink::open(Path::new("/dev/null"), 9600, 8);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_open_missing_device() {
        let result = SerialPortLink::open(Path::new("/dev/does-not-exist-gateway"), 115_200, 8);
        match result {
            Err(e) => assert_eq!(e.kind(), crate::domain::error::ErrorKind::Transport),
            Ok(_) => panic!("opening a missing device should fail"),
        }
    }
}
