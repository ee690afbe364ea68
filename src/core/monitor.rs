use crate::core::codec::Frame;
use crate::domain::error::{GatewayError, GatewayResult};
use crate::infrastructure::serial::LinkEvents;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Hand every device frame to `on_frame` until the link drops or `cancel` fires.
///
/// Returns the number of frames seen when cancelled, or the link loss.
pub async fn monitor_link<F>(
    events: LinkEvents,
    cancel: CancellationToken,
    mut on_frame: F,
) -> GatewayResult<u64>
where
    F: FnMut(&Frame),
{
    let LinkEvents {
        mut frames,
        mut disconnected,
    } = events;
    let mut count = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Monitor stopped after {} frames", count);
                return Ok(count);
            }
            frame = frames.recv() => match frame {
                Some(frame) => {
                    count += 1;
                    debug!("Frame {} ({} bytes)", count, frame.len());
                    on_frame(&frame);
                }
                None => break,
            },
        }
    }

    // Frames are drained before the disconnect reason is reported.
    let reason = match disconnected.try_recv() {
        Ok(lost) => lost.reason,
        Err(_) => "device frame stream closed".to_string(),
    };
    Err(GatewayError::LinkLost { reason })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::serial::MemoryLink;

    #[tokio::test]
    async fn test_monitor_until_disconnect() {
        let (_link, mut device, events) = MemoryLink::new(8);
        device.inject(vec![1, 2, 3]).await.unwrap();
        device.inject(vec![4]).await.unwrap();
        device.disconnect("unplugged");

        let mut seen = Vec::new();
        let result = monitor_link(events, CancellationToken::new(), |frame| {
            seen.push(frame.clone())
        })
        .await;

        assert_eq!(seen, vec![vec![1, 2, 3], vec![4]]);
        match result {
            Err(GatewayError::LinkLost { reason }) => assert_eq!(reason, "unplugged"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_monitor_cancelled() {
        let (_link, _device, events) = MemoryLink::new(8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = monitor_link(events, cancel, |_| {}).await;
        assert_eq!(result.unwrap(), 0);
    }
}
