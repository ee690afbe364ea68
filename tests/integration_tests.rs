use serial_gateway::core::monitor::monitor_link;
use serial_gateway::infrastructure::tcp::GatewayClient;
use serial_gateway::{Gateway, GatewayConfig, LinkState, MemoryLink, SerialLink, SIGNATURE};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Integration tests for the serial gateway library
#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = GatewayConfig::default();

        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 1234);
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.log_level, "info");
        assert!(config.check_signature);
    }

    #[test]
    fn test_signature_constant() {
        assert_eq!(SIGNATURE.len(), 13);
        assert_eq!(&SIGNATURE[..2], &[0x01, 0x03]);
        assert!(SIGNATURE.ends_with(b"mccli"));
    }

    #[tokio::test]
    async fn test_gateway_client_round_trip() {
        let config = GatewayConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..GatewayConfig::default()
        };
        let (link, mut device, events) = MemoryLink::new(16);
        let cancel = CancellationToken::new();
        let gateway = Gateway::bind(config, Arc::new(link), events, cancel.clone())
            .await
            .unwrap();
        let addr = gateway.local_addr().to_string();
        let registry = gateway.registry();
        let handle = tokio::spawn(gateway.run());

        let mut client = GatewayClient::connect(&addr, Duration::from_secs(1)).await.unwrap();
        client.handshake().await.unwrap();
        client.send(&[0x16, 0x03]).await.unwrap();

        let wait = Duration::from_secs(3);
        assert_eq!(timeout(wait, device.next_sent()).await.unwrap().unwrap(), SIGNATURE);
        assert_eq!(timeout(wait, device.next_sent()).await.unwrap().unwrap(), vec![0x16, 0x03]);
        assert_eq!(registry.len().await, 1);

        device.inject(vec![0xaa; 12]).await.unwrap();
        let frame = timeout(wait, client.recv()).await.unwrap().unwrap();
        assert_eq!(frame, Some(vec![0xaa; 12]));

        cancel.cancel();
        assert!(timeout(wait, handle).await.unwrap().unwrap().is_ok());
        assert_eq!(timeout(wait, client.recv()).await.unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn test_monitor_sees_device_frames() {
        let (link, mut device, events) = MemoryLink::new(16);
        device.inject(vec![0x05, 0x01]).await.unwrap();
        device.disconnect("done");

        let mut frames = Vec::new();
        let result = monitor_link(events, CancellationToken::new(), |frame| frames.push(frame.clone())).await;

        assert!(result.unwrap_err().is_link_lost());
        assert_eq!(frames, vec![vec![0x05, 0x01]]);
        assert_eq!(link.state(), LinkState::Disconnected);
    }
}
