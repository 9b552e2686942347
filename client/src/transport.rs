// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Framing and socket I/O for every transport variant, spec.md §4.5.
//!
//! Stream-mode transports (TCP, TLS, QUIC) carry a continuous byte
//! stream in which one MQTT frame follows the next; this module reads
//! however many bytes are available, hands them to [`Packet::decode`],
//! and treats `DecodeError::IncompletePacket` as "read more and retry"
//! rather than a protocol violation. Message-mode transports (WebSocket)
//! give one binary frame per packet, so framing is free.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use quinn::{ClientConfig as QuinnClientConfig, Endpoint as QuinnEndpoint, TransportConfig, VarInt};
use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig as RustlsClientConfig, PrivateKey, RootCertStore, ServerName};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{Connector as WsConnector, MaybeTlsStream, WebSocketStream};

use mqtt_codec::byte_array::ByteArray;
use mqtt_codec::packet::Packet;
use mqtt_codec::protocol_version::ProtocolVersion;
use mqtt_codec::DecodeError;

use crate::endpoint::{Endpoint, TlsOptions, TlsVersion, TrustPolicy, MQTT_ALPN};
use crate::error::{ErrorKind, NetworkErrorKind};

/// How long an identical connection-level error is suppressed from
/// re-triggering a fresh close evaluation, spec.md §4.5.
const ERROR_DEBOUNCE: Duration = Duration::from_secs(1);

/// An open connection to a broker, framed per spec.md §4.5. One instance
/// per connection attempt; a reconnect builds a fresh one.
pub struct Transport {
    io: TransportIo,
    read_buf: Vec<u8>,
    error_debounce: ErrorDebounce,
}

/// Suppresses repeat reports of the same connection-level error within
/// [`ERROR_DEBOUNCE`] of the last one, spec.md §4.5.
#[derive(Default)]
struct ErrorDebounce {
    last: Option<(NetworkErrorKind, Instant)>,
}

impl ErrorDebounce {
    /// Whether `kind` should be surfaced now. Always records the
    /// observation, regardless of the outcome.
    fn should_report(&mut self, kind: NetworkErrorKind) -> bool {
        let now = Instant::now();
        let report = !matches!(
            self.last,
            Some((last_kind, at)) if last_kind == kind && now.duration_since(at) < ERROR_DEBOUNCE
        );
        self.last = Some((kind, now));
        report
    }
}

enum TransportIo {
    Stream(StreamIo),
    Message(WebSocketStream<MaybeTlsStream<TcpStream>>),
}

enum StreamIo {
    Tcp(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
    Quic {
        send: quinn::SendStream,
        recv: quinn::RecvStream,
        // Kept alive for the duration of the stream; dropping the
        // connection closes every stream derived from it.
        _connection: quinn::Connection,
    },
}

impl StreamIo {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf).await,
            Self::Tls(stream) => stream.read(buf).await,
            Self::Quic { recv, .. } => recv
                .read(buf)
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::ConnectionReset, e))
                .map(Option::unwrap_or_default),
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.write_all(buf).await,
            Self::Tls(stream) => stream.write_all(buf).await,
            Self::Quic { send, .. } => send
                .write_all(buf)
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e)),
        }
    }
}

impl Transport {
    /// Open a fresh connection for `endpoint`, bounded by
    /// `connect_timeout`.
    ///
    /// # Errors
    /// Returns `ErrorKind::Timeout` if the handshake doesn't complete in
    /// time, `ErrorKind::InvalidCertData` on bad TLS credentials, or a
    /// `NetworkError`/`OtherError` for any other connect failure.
    ///
    /// `keep_alive`/`ping_enabled` only affect the QUIC variant, spec.md
    /// §6: when ping is enabled the transport's own idle timeout is
    /// overridden to `1.5 * keep_alive` rather than the configured
    /// `QuicOptions::idle_timeout`. `connect_timeout` is advisory there
    /// too -- QUIC enforces its own 30-second default regardless.
    pub async fn connect(
        endpoint: &Endpoint,
        connect_timeout: Duration,
        ping_enabled: bool,
        keep_alive: Duration,
    ) -> Result<Self, ErrorKind> {
        let io = timeout(
            connect_timeout,
            Self::connect_inner(endpoint, ping_enabled, keep_alive),
        )
        .await
        .map_err(|_| ErrorKind::Timeout)??;
        Ok(Self {
            io,
            read_buf: Vec::with_capacity(4096),
            error_debounce: ErrorDebounce::default(),
        })
    }

    async fn connect_inner(
        endpoint: &Endpoint,
        ping_enabled: bool,
        keep_alive: Duration,
    ) -> Result<TransportIo, ErrorKind> {
        match endpoint {
            Endpoint::Tcp { host, port, tcp_options } => {
                let stream = TcpStream::connect((host.as_str(), *port)).await?;
                stream.set_nodelay(tcp_options.nodelay)?;
                Ok(TransportIo::Stream(StreamIo::Tcp(stream)))
            }
            Endpoint::Tls { host, port, tcp_options, tls_options } => {
                let stream = TcpStream::connect((host.as_str(), *port)).await?;
                stream.set_nodelay(tcp_options.nodelay)?;
                let config = build_rustls_config(tls_options, &[b"mqtt".to_vec()])?;
                let connector = TlsConnector::from(Arc::new(config));
                let server_name = resolve_server_name(tls_options, host)?;
                let tls_stream = connector
                    .connect(server_name, stream)
                    .await
                    .map_err(|e| ErrorKind::OtherError(e.to_string()))?;
                Ok(TransportIo::Stream(StreamIo::Tls(Box::new(tls_stream))))
            }
            Endpoint::Ws { host, port, path, headers, .. } => {
                let url = format!("ws://{host}:{port}{path}");
                let request = build_request(&url, headers)?;
                let (stream, _response) = tokio_tungstenite::connect_async(request)
                    .await
                    .map_err(|e| ErrorKind::OtherError(e.to_string()))?;
                Ok(TransportIo::Message(stream))
            }
            Endpoint::Wss { host, port, path, tls_options, headers, .. } => {
                let url = format!("wss://{host}:{port}{path}");
                let request = build_request(&url, headers)?;
                let config = build_rustls_config(tls_options, &[])?;
                let connector = WsConnector::Rustls(Arc::new(config));
                let (stream, _response) = tokio_tungstenite::connect_async_tls_with_config(
                    request,
                    None,
                    false,
                    Some(connector),
                )
                .await
                .map_err(|e| ErrorKind::OtherError(e.to_string()))?;
                Ok(TransportIo::Message(stream))
            }
            Endpoint::Quic { host, port, tls_options, quic_options } => {
                let config = build_rustls_config(tls_options, &[MQTT_ALPN.to_vec()])?;
                let mut client_config = QuinnClientConfig::new(Arc::new(config));
                let idle_timeout = if ping_enabled {
                    keep_alive.mul_f64(1.5)
                } else {
                    quic_options.idle_timeout
                };
                let mut transport_config = TransportConfig::default();
                transport_config.max_idle_timeout(Some(
                    VarInt::from_u64(idle_timeout.as_millis() as u64)
                        .map_err(|e| ErrorKind::OtherError(e.to_string()))?
                        .into(),
                ));
                client_config.transport_config(Arc::new(transport_config));
                let mut endpoint = QuinnEndpoint::client("0.0.0.0:0".parse().unwrap())
                    .map_err(|e| ErrorKind::OtherError(e.to_string()))?;
                endpoint.set_default_client_config(client_config);
                let addr = tokio::net::lookup_host((host.as_str(), *port))
                    .await?
                    .next()
                    .ok_or_else(|| ErrorKind::OtherError(format!("unresolvable host: {host}")))?;
                let server_name = tls_options.server_name.clone().unwrap_or_else(|| host.clone());
                let connecting = endpoint
                    .connect(addr, &server_name)
                    .map_err(|e| ErrorKind::OtherError(e.to_string()))?;
                let connection = connecting
                    .await
                    .map_err(|e| ErrorKind::OtherError(e.to_string()))?;
                let (send, recv) = connection
                    .open_bi()
                    .await
                    .map_err(|e| ErrorKind::OtherError(e.to_string()))?;
                Ok(TransportIo::Stream(StreamIo::Quic { send, recv, _connection: connection }))
            }
        }
    }

    /// Write an encoded frame. Only connection-level conditions (spec.md
    /// §4.5's filter) are classified as `NetworkError`; anything else
    /// collapses to `OtherError`.
    ///
    /// # Errors
    /// Returns the classified I/O failure.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), ErrorKind> {
        let result = match &mut self.io {
            TransportIo::Stream(io) => io.write_all(bytes).await.map_err(ErrorKind::from),
            TransportIo::Message(ws) => ws
                .send(WsMessage::Binary(bytes.to_vec()))
                .await
                .map_err(|e| ErrorKind::OtherError(e.to_string())),
        };
        result
    }

    /// Whether the session core should act on `kind` now (close the
    /// connection, notify observers) rather than treat it as a repeat of
    /// the error it just handled within [`ERROR_DEBOUNCE`], spec.md
    /// §4.5. Always records the observation.
    pub fn note_network_error(&mut self, kind: NetworkErrorKind) -> bool {
        self.error_debounce.should_report(kind)
    }

    /// Read and decode the next complete packet, blocking (asynchronously)
    /// until one is available.
    ///
    /// # Errors
    /// Returns `ErrorKind::DecodeError` on a malformed frame, or a
    /// `NetworkError`/`OtherError` if the connection drops.
    pub async fn recv_packet(&mut self, version: ProtocolVersion) -> Result<Packet, ErrorKind> {
        match &mut self.io {
            TransportIo::Stream(io) => Self::recv_stream_packet(io, &mut self.read_buf, version).await,
            TransportIo::Message(ws) => loop {
                match ws.next().await {
                    Some(Ok(WsMessage::Binary(data))) => {
                        let mut ba = ByteArray::new(&data);
                        return Packet::decode(&mut ba, version).map_err(ErrorKind::from);
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        return Err(ErrorKind::NetworkError(NetworkErrorKind::ConnectionReset));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(ErrorKind::OtherError(e.to_string())),
                }
            },
        }
    }

    async fn recv_stream_packet(
        io: &mut StreamIo,
        read_buf: &mut Vec<u8>,
        version: ProtocolVersion,
    ) -> Result<Packet, ErrorKind> {
        loop {
            {
                let mut ba = ByteArray::new(read_buf);
                match Packet::decode(&mut ba, version) {
                    Ok(packet) => {
                        let consumed = ba.offset();
                        read_buf.drain(0..consumed);
                        return Ok(packet);
                    }
                    Err(DecodeError::IncompletePacket) => {}
                    Err(e) => return Err(ErrorKind::from(e)),
                }
            }
            let mut chunk = [0u8; 4096];
            let n = io.read(&mut chunk).await.map_err(ErrorKind::from)?;
            if n == 0 {
                return Err(ErrorKind::NetworkError(NetworkErrorKind::ConnectionReset));
            }
            read_buf.extend_from_slice(&chunk[..n]);
        }
    }
}

fn resolve_server_name(tls_options: &TlsOptions, host: &str) -> Result<ServerName, ErrorKind> {
    let name = tls_options.server_name.as_deref().unwrap_or(host);
    ServerName::try_from(name).map_err(|_| ErrorKind::InvalidCertData)
}

fn build_request(
    url: &str,
    headers: &[(String, String)],
) -> Result<tokio_tungstenite::tungstenite::http::Request<()>, ErrorKind> {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    let mut request = url
        .into_client_request()
        .map_err(|e| ErrorKind::OtherError(e.to_string()))?;
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", crate::endpoint::MQTT_WS_SUBPROTOCOL.parse().unwrap());
    for (name, value) in headers {
        let header_name: tokio_tungstenite::tungstenite::http::HeaderName =
            name.parse().map_err(|_| ErrorKind::OtherError(format!("invalid header name: {name}")))?;
        let header_value = value
            .parse()
            .map_err(|_| ErrorKind::OtherError(format!("invalid header value for {name}")))?;
        request.headers_mut().insert(header_name, header_value);
    }
    Ok(request)
}

/// A verifier that accepts every certificate, spec.md §6's
/// `TrustPolicy::TrustAll` -- for talking to brokers with self-signed
/// certificates in development.
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

/// Adapts `TrustPolicy::CustomVerify`'s plain byte-slice predicate to
/// rustls's verifier trait -- only the end-entity certificate's DER is
/// handed to the closure.
struct CustomCertVerifier {
    predicate: Arc<dyn Fn(&[u8]) -> bool + Send + Sync>,
}

impl ServerCertVerifier for CustomCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if (self.predicate)(&end_entity.0) {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::General("custom certificate verifier rejected the chain".into()))
        }
    }
}

fn protocol_versions(min: TlsVersion, max: TlsVersion) -> &'static [&'static rustls::SupportedProtocolVersion] {
    match (min, max) {
        (TlsVersion::V1_2, TlsVersion::V1_2) => &[&rustls::version::TLS12],
        (TlsVersion::V1_3, TlsVersion::V1_3) => &[&rustls::version::TLS13],
        _ => rustls::DEFAULT_VERSIONS,
    }
}

fn build_rustls_config(
    tls_options: &TlsOptions,
    alpn_protocols: &[Vec<u8>],
) -> Result<RustlsClientConfig, ErrorKind> {
    let mut roots = RootCertStore::empty();
    match &tls_options.trust_policy {
        Some(TrustPolicy::TrustRoots(ders)) => {
            for der in ders {
                roots
                    .add(&Certificate(der.clone()))
                    .map_err(|_| ErrorKind::InvalidCertData)?;
            }
        }
        _ => {
            roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|anchor| {
                rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
                    anchor.subject,
                    anchor.spki,
                    anchor.name_constraints,
                )
            }));
        }
    }

    let versions = protocol_versions(tls_options.min_version, tls_options.max_version);
    let builder = RustlsClientConfig::builder()
        .with_safe_default_cipher_suites()
        .with_safe_default_kx_groups()
        .with_protocol_versions(versions)
        .map_err(|e| ErrorKind::OtherError(e.to_string()))?;

    let mut config = if let Some(credential) = &tls_options.client_credential {
        let certs = credential
            .cert_chain
            .iter()
            .cloned()
            .map(Certificate)
            .collect();
        let key = PrivateKey(credential.private_key.clone());
        builder
            .with_root_certificates(roots)
            .with_client_auth_cert(certs, key)
            .map_err(|_| ErrorKind::InvalidCertData)?
    } else {
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    match &tls_options.trust_policy {
        Some(TrustPolicy::TrustAll) => {
            config.dangerous().set_certificate_verifier(Arc::new(AcceptAnyCert));
        }
        Some(TrustPolicy::CustomVerify(predicate)) => {
            config.dangerous().set_certificate_verifier(Arc::new(CustomCertVerifier {
                predicate: Arc::clone(predicate),
            }));
        }
        _ => {}
    }

    if !tls_options.session_tickets {
        config.resumption = rustls::client::Resumption::disabled();
    }

    if !alpn_protocols.is_empty() {
        config.alpn_protocols = alpn_protocols.to_vec();
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debounce_suppresses_the_same_error_within_the_window() {
        let mut debounce = ErrorDebounce::default();
        assert!(debounce.should_report(NetworkErrorKind::BrokenPipe));
        assert!(!debounce.should_report(NetworkErrorKind::BrokenPipe));
        assert!(debounce.should_report(NetworkErrorKind::ConnectionReset));
    }
}
