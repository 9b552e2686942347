// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::fmt;
use std::io;

use mqtt_codec::reason_code::{ConnectReturnCode, ReasonCode};
use mqtt_codec::{DecodeError, EncodeError};

/// Client-side packet construction invariant violated before anything was
/// sent on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketError {
    QoSAboveMax,
    RetainUnavailable,
    MissingTopic,
    TopicAliasOutOfRange,
    InvalidTopicName,
    SubscriptionIdentifierInOutgoingPublish,
    BadParameter,
}

/// CONNACK/AUTH failure code, distinguishing the v3.1.1 and v5.0 code
/// spaces -- spec.md's `connectFailed(code?)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectFailureCode {
    V311(ConnectReturnCode),
    V5(ReasonCode),
}

/// The full error taxonomy from spec.md §7. This is the value every
/// awaited client operation resolves with on failure, and the value
/// carried by [`crate::notification::Notification::Error`] for
/// connection-wide conditions not tied to one call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A completer elapsed without a response.
    Timeout,

    /// Operation attempted while not opened.
    Unconnected,

    /// Client-side packet construction invariant violated.
    PacketError(PacketError),

    /// Incoming bytes violate the wire format.
    DecodeError(DecodeError),

    /// Broker-initiated DISCONNECT, carrying its reason code.
    ServerClose(ReasonCode),

    /// Locally initiated close, carrying the caller-supplied code.
    ClientClose(ReasonCode),

    /// A QoS >= 1 flow ended with a non-success reason.
    PublishFailed(ReasonCode),

    /// CONNACK/AUTH indicated failure.
    ConnectFailed(Option<ConnectFailureCode>),

    /// `open` called while already opening or opened.
    AlreadyOpened,

    /// `close` called while already closing or closed.
    AlreadyClosed,

    /// Protocol sequencing violation observed locally (e.g. PUBREL for an
    /// identifier with no pending PUBREC).
    UnexpectPacket,

    /// A received message violated a local invariant (e.g. no observers
    /// configured for unsolicited PUBLISH).
    UnexpectMessage,

    /// TLS credential import failed.
    InvalidCertData,

    /// MQTT 5.0 broker demanded enhanced auth but no `AuthFlow` was
    /// configured.
    AuthflowRequired,

    /// The transport reported a connection-level I/O condition.
    NetworkError(NetworkErrorKind),

    /// Any other transport- or protocol-level failure that doesn't fit a
    /// more specific variant.
    OtherError(String),
}

/// Connection-level transport conditions recognised by the error filter
/// in spec.md §4.5 and mapped to `closed` reasons in §4.7.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkErrorKind {
    NotConnected,
    BrokenPipe,
    ConnectionReset,
    TimedOut,
    NetworkDown,
    NetworkUnreachable,
    HostDown,
    HostUnreachable,
    ConnectionRefused,
    ConnectionAborted,
}

impl NetworkErrorKind {
    /// Classify a raw I/O error kind as connection-level, per spec.md
    /// §4.5's send-failure filter.
    #[must_use]
    pub fn from_io_error_kind(kind: io::ErrorKind) -> Option<Self> {
        match kind {
            io::ErrorKind::NotConnected => Some(Self::NotConnected),
            io::ErrorKind::BrokenPipe => Some(Self::BrokenPipe),
            io::ErrorKind::ConnectionReset => Some(Self::ConnectionReset),
            io::ErrorKind::TimedOut => Some(Self::TimedOut),
            io::ErrorKind::ConnectionRefused => Some(Self::ConnectionRefused),
            io::ErrorKind::ConnectionAborted => Some(Self::ConnectionAborted),
            _ => None,
        }
    }

    /// Whether spec.md §4.7 forbids retrying after this condition,
    /// independent of the configured retry filter.
    #[must_use]
    pub const fn never_retry(self) -> bool {
        matches!(self, Self::NetworkUnreachable | Self::NetworkDown)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for ErrorKind {}

impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        NetworkErrorKind::from_io_error_kind(err.kind()).map_or_else(
            || Self::OtherError(err.to_string()),
            Self::NetworkError,
        )
    }
}

impl From<DecodeError> for ErrorKind {
    fn from(err: DecodeError) -> Self {
        Self::DecodeError(err)
    }
}

impl From<EncodeError> for ErrorKind {
    fn from(err: EncodeError) -> Self {
        Self::PacketError(match err {
            EncodeError::InvalidTopicName => PacketError::InvalidTopicName,
            _ => PacketError::BadParameter,
        })
    }
}
