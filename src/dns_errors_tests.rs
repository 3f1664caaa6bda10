// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for engine error types.

#[cfg(test)]
mod tests {
    use crate::dns_errors::*;

    #[test]
    fn test_invalid_address_error() {
        let error = ClassificationError::InvalidAddress {
            address: "300.1.1.1".to_string(),
            family: AddressFamily::V4,
        };

        assert_eq!(error.to_string(), "Invalid ipv4 address '300.1.1.1'");
    }

    #[test]
    fn test_unsupported_boundary_error() {
        let error = ClassificationError::UnsupportedBoundary {
            family: AddressFamily::V6,
            size: 56,
        };

        assert_eq!(error.to_string(), "Unsupported ipv6 subnet boundary /56");
    }

    #[test]
    fn test_outside_subnet_error() {
        let error = ClassificationError::OutsideSubnet {
            address: "192.168.1.10".to_string(),
            subnet: "100.64.0.0/10".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Address 192.168.1.10 is outside reverse subnet 100.64.0.0/10"
        );
    }

    #[test]
    fn test_rejected_error() {
        let error = TransportError::Rejected {
            server: "10.0.0.1:53".to_string(),
            zone: "ts.example.com".to_string(),
            code: "REFUSED".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "DNS update for zone 'ts.example.com' rejected by 10.0.0.1:53 with REFUSED"
        );
    }

    #[test]
    fn test_missing_field_error() {
        let error = ConfigError::MissingField {
            field: "bind.server".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Missing required configuration 'bind.server'"
        );
    }

    #[test]
    fn test_unsupported_algorithm_message_lists_supported_set() {
        let error = StartupError::UnsupportedAlgorithm {
            algorithm: "hmac-sha224".to_string(),
        };

        let message = error.to_string();
        assert!(message.contains("'hmac-sha224'"));
        for name in [
            "hmac-md5",
            "hmac-sha1",
            "hmac-sha256",
            "hmac-sha384",
            "hmac-sha512",
        ] {
            assert!(message.contains(name), "missing {name} in: {message}");
        }
    }

    #[test]
    fn test_sync_error_is_transparent() {
        let inner = TransportError::Exchange {
            server: "10.0.0.1:53".to_string(),
            zone: "example.com".to_string(),
            reason: "timed out".to_string(),
        };
        let error: SyncError = inner.clone().into();

        assert_eq!(error.to_string(), inner.to_string());
    }

    #[test]
    fn test_error_kinds() {
        let config: SyncError = ConfigError::MissingField {
            field: "bind.zone".to_string(),
        }
        .into();
        let classification: SyncError = ClassificationError::UnsupportedBoundary {
            family: AddressFamily::V4,
            size: 12,
        }
        .into();
        let transport: SyncError = TransportError::Rejected {
            server: "s".to_string(),
            zone: "z".to_string(),
            code: "SERVFAIL".to_string(),
        }
        .into();
        let startup: SyncError = StartupError::UnsupportedAlgorithm {
            algorithm: "rsa".to_string(),
        }
        .into();

        assert_eq!(config.kind(), ErrorKind::Configuration);
        assert_eq!(classification.kind(), ErrorKind::Classification);
        assert_eq!(transport.kind(), ErrorKind::Transport);
        assert_eq!(startup.kind(), ErrorKind::FatalStartup);
    }

    #[test]
    fn test_only_config_and_startup_errors_are_fatal() {
        let fatal: Vec<SyncError> = vec![
            ConfigError::InvalidValue {
                field: "bind.ttl".to_string(),
                reason: "too large".to_string(),
            }
            .into(),
            StartupError::ConnectivityCheck {
                server: "10.0.0.1:53".to_string(),
                zone: "example.com".to_string(),
                reason: "timeout".to_string(),
            }
            .into(),
            StartupError::InvalidKey {
                key_name: "ddns".to_string(),
                reason: "bad base64".to_string(),
            }
            .into(),
        ];
        for error in &fatal {
            assert!(error.is_fatal(), "{error} should be fatal");
        }

        let recoverable: Vec<SyncError> = vec![
            ClassificationError::OutsideSubnet {
                address: "1.2.3.4".to_string(),
                subnet: "100.64.0.0/10".to_string(),
            }
            .into(),
            TransportError::ServerResolution {
                server: "ns.invalid".to_string(),
                reason: "no such host".to_string(),
            }
            .into(),
            TransportError::Discovery {
                url: "https://api.tailscale.com".to_string(),
                reason: "HTTP 500".to_string(),
            }
            .into(),
        ];
        for error in &recoverable {
            assert!(!error.is_fatal(), "{error} should not be fatal");
        }
    }

    #[test]
    fn test_status_reasons() {
        let cases: Vec<(SyncError, &str)> = vec![
            (
                ClassificationError::InvalidAddress {
                    address: "x".to_string(),
                    family: AddressFamily::V6,
                }
                .into(),
                "InvalidAddress",
            ),
            (
                TransportError::Rejected {
                    server: "s".to_string(),
                    zone: "z".to_string(),
                    code: "NOTAUTH".to_string(),
                }
                .into(),
                "UpdateRejected",
            ),
            (
                StartupError::UnsupportedAlgorithm {
                    algorithm: "x".to_string(),
                }
                .into(),
                "UnsupportedAlgorithm",
            ),
            (
                ConfigError::MissingField {
                    field: "f".to_string(),
                }
                .into(),
                "MissingField",
            ),
        ];

        for (error, reason) in cases {
            assert_eq!(error.status_reason(), reason);
        }
    }

    #[test]
    fn test_address_family_display() {
        assert_eq!(AddressFamily::V4.to_string(), "ipv4");
        assert_eq!(AddressFamily::V6.to_string(), "ipv6");
    }
}
