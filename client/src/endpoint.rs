// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::sync::Arc;
use std::time::Duration;

/// Per-socket tuning shared by every transport variant. Defaults follow
/// common platform behaviour rather than anything MQTT-specific.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpOptions {
    pub nodelay: bool,
    pub connect_timeout: Option<Duration>,
}

impl Default for TcpOptions {
    fn default() -> Self {
        Self {
            nodelay: true,
            connect_timeout: None,
        }
    }
}

/// Minimum/maximum negotiated TLS protocol version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlsVersion {
    V1_2,
    V1_3,
}

/// Server certificate validation strategy, spec.md §6.
#[derive(Clone)]
pub enum TrustPolicy {
    TrustAll,
    TrustRoots(Vec<Vec<u8>>),
    CustomVerify(Arc<dyn Fn(&[u8]) -> bool + Send + Sync>),
}

/// Client identity presented during mutual TLS: certificate chain plus
/// the private key, both DER-encoded (extracted from a PKCS#12 bundle
/// plus its passphrase by the caller before construction, per spec.md
/// §6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientCredential {
    pub cert_chain: Vec<Vec<u8>>,
    pub private_key: Vec<u8>,
}

/// TLS connection parameters, spec.md §6.
#[derive(Clone)]
pub struct TlsOptions {
    pub trust_policy: Option<TrustPolicy>,
    pub client_credential: Option<ClientCredential>,
    pub server_name: Option<String>,
    pub min_version: TlsVersion,
    pub max_version: TlsVersion,
    pub session_tickets: bool,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            trust_policy: None,
            client_credential: None,
            server_name: None,
            min_version: TlsVersion::V1_2,
            max_version: TlsVersion::V1_3,
            session_tickets: true,
        }
    }
}

/// QUIC transport parameters, spec.md §6.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuicOptions {
    /// Overridden to `1.5 * keep_alive` when ping is enabled; this is the
    /// fallback when it is not.
    pub idle_timeout: Duration,
}

impl Default for QuicOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
        }
    }
}

/// ALPN/subprotocol identifier MQTT brokers expect from QUIC and
/// WebSocket transports.
pub const MQTT_ALPN: &[u8] = b"mqtt";
pub const MQTT_WS_SUBPROTOCOL: &str = "mqtt";

/// The one-time transport configuration for a client, spec.md §6. Fixed
/// for the lifetime of a session core -- reconnects reuse the same
/// endpoint.
#[derive(Clone)]
pub enum Endpoint {
    Tcp {
        host: String,
        port: u16,
        tcp_options: TcpOptions,
    },
    Tls {
        host: String,
        port: u16,
        tcp_options: TcpOptions,
        tls_options: TlsOptions,
    },
    Ws {
        host: String,
        port: u16,
        path: String,
        tcp_options: TcpOptions,
        headers: Vec<(String, String)>,
    },
    Wss {
        host: String,
        port: u16,
        path: String,
        tcp_options: TcpOptions,
        tls_options: TlsOptions,
        headers: Vec<(String, String)>,
    },
    Quic {
        host: String,
        port: u16,
        quic_options: QuicOptions,
        tls_options: TlsOptions,
    },
}

impl Endpoint {
    #[must_use]
    pub fn tcp(host: impl Into<String>) -> Self {
        Self::Tcp {
            host: host.into(),
            port: 1883,
            tcp_options: TcpOptions::default(),
        }
    }

    #[must_use]
    pub fn tls(host: impl Into<String>) -> Self {
        Self::Tls {
            host: host.into(),
            port: 8883,
            tcp_options: TcpOptions::default(),
            tls_options: TlsOptions::default(),
        }
    }

    #[must_use]
    pub fn ws(host: impl Into<String>) -> Self {
        Self::Ws {
            host: host.into(),
            port: 8083,
            path: "/mqtt".to_string(),
            tcp_options: TcpOptions::default(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn wss(host: impl Into<String>) -> Self {
        Self::Wss {
            host: host.into(),
            port: 8084,
            path: "/mqtt".to_string(),
            tcp_options: TcpOptions::default(),
            tls_options: TlsOptions::default(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn quic(host: impl Into<String>) -> Self {
        Self::Quic {
            host: host.into(),
            port: 14567,
            quic_options: QuicOptions::default(),
            tls_options: TlsOptions::default(),
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        match self {
            Self::Tcp { host, .. }
            | Self::Tls { host, .. }
            | Self::Ws { host, .. }
            | Self::Wss { host, .. }
            | Self::Quic { host, .. } => host,
        }
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        match self {
            Self::Tcp { port, .. }
            | Self::Tls { port, .. }
            | Self::Ws { port, .. }
            | Self::Wss { port, .. }
            | Self::Quic { port, .. } => *port,
        }
    }

    /// Whether this endpoint frames packets one-per-message (WebSocket)
    /// rather than as a continuous byte stream, spec.md §4.5.
    #[must_use]
    pub const fn is_message_mode(&self) -> bool {
        matches!(self, Self::Ws { .. } | Self::Wss { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ports_match_the_endpoint_surface() {
        assert_eq!(Endpoint::tcp("broker").port(), 1883);
        assert_eq!(Endpoint::tls("broker").port(), 8883);
        assert_eq!(Endpoint::ws("broker").port(), 8083);
        assert_eq!(Endpoint::wss("broker").port(), 8084);
        assert_eq!(Endpoint::quic("broker").port(), 14567);
    }

    #[test]
    fn only_websocket_variants_are_message_mode() {
        assert!(!Endpoint::tcp("broker").is_message_mode());
        assert!(!Endpoint::tls("broker").is_message_mode());
        assert!(Endpoint::ws("broker").is_message_mode());
        assert!(Endpoint::wss("broker").is_message_mode());
        assert!(!Endpoint::quic("broker").is_message_mode());
    }
}
