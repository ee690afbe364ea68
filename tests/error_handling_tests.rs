use serial_gateway::{ErrorKind, GatewayError, GatewayResult};
use std::error::Error;

/// Error taxonomy and propagation tests
#[cfg(test)]
mod error_handling_tests {
    use super::*;

    #[test]
    fn test_error_taxonomy() {
        let cases = vec![
            (
                GatewayError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer gone")),
                ErrorKind::Transport,
            ),
            (
                GatewayError::InvalidSignature { received: b"nope".to_vec() },
                ErrorKind::Protocol,
            ),
            (
                GatewayError::FrameTooLarge { len: 70_000, max: 65_535 },
                ErrorKind::Protocol,
            ),
            (GatewayError::Protocol("bad length".to_string()), ErrorKind::Protocol),
            (GatewayError::link_lost("unplugged"), ErrorKind::LinkLost),
            (
                GatewayError::Config { message: "bad port".to_string() },
                ErrorKind::Config,
            ),
        ];

        for (error, kind) in cases {
            assert_eq!(error.kind(), kind, "wrong kind for {}", error);
            assert!(!error.to_string().is_empty());
            assert_eq!(error.is_link_lost(), kind == ErrorKind::LinkLost);
        }
    }

    #[test]
    fn test_io_error_conversion_keeps_source() {
        let root_cause = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Access denied");
        let error: GatewayError = root_cause.into();

        assert!(matches!(error, GatewayError::Io(_)));
        let source = error.source().expect("io errors keep their source");
        assert!(source.to_string().contains("Access denied"));
    }

    #[test]
    fn test_invalid_signature_shows_hex() {
        let error = GatewayError::InvalidSignature { received: vec![0x01, 0x03, 0xff] };
        assert!(error.to_string().contains("0103ff"));
    }

    #[tokio::test]
    async fn test_async_error_propagation() {
        async fn lose_link() -> GatewayResult<()> {
            Err(GatewayError::link_lost("read failed"))
        }

        async fn calling_function() -> GatewayResult<()> {
            lose_link().await?;
            Ok(())
        }

        let error = calling_function().await.unwrap_err();
        assert!(error.is_link_lost());
        assert!(error.to_string().contains("read failed"));
    }

    #[test]
    fn test_error_size() {
        let error_size = std::mem::size_of::<GatewayError>();
        assert!(error_size <= 128, "GatewayError too large: {} bytes", error_size);
    }
}
