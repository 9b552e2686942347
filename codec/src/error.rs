// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::fmt;

use crate::byte_array::ByteArrayError;
use crate::utils::StringError;

/// Errors returned while decoding bytes read off the wire into a packet.
///
/// `IncompletePacket` is the only variant a caller should treat as "try
/// again once more bytes arrive" -- every other variant means the bytes
/// seen so far violate the wire format and the connection should be
/// closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Not enough bytes were available to finish decoding. Never escapes
    /// the framed transports in `mqtt-client`; only meaningful to callers
    /// decoding a buffer directly.
    IncompletePacket,

    /// A variable byte integer used a fifth continuation byte.
    VarIntOverflow,

    /// Fixed-header type nibble did not match any known packet type.
    InvalidPacketType,

    /// Fixed-header flag bits were not the value this packet type requires.
    InvalidPacketFlags,

    /// Protocol level byte was not 4 (3.1.1) or 5 (5.0).
    InvalidProtocolLevel,

    /// Connect packet's protocol name was not the literal string `MQTT`.
    InvalidProtocolName,

    /// A boolean property byte was neither 0x00 nor 0x01.
    InvalidBoolData,

    /// A QoS byte was not 0, 1 or 2.
    InvalidQoS,

    /// Bytes did not form valid UTF-8, or used disallowed code points.
    InvalidString,

    /// A v5 property identifier was not recognised.
    InvalidPropertyType,

    /// A property appeared somewhere the packet type does not allow it,
    /// or more than once where only one instance is permitted.
    UnexpectedTokens,

    /// A property decoded to a value the spec forbids for its type, e.g.
    /// `MaximumQoS` outside {0,1} or a zero `SubscriptionIdentifier`.
    InvalidPropertyValue,

    /// A reason code byte was not defined for this packet type.
    InvalidReasonCode,

    /// Remaining length in the fixed header did not match the number of
    /// bytes actually present in the frame.
    InvalidRemainingLength,

    /// Packet identifier was zero where the protocol requires nonzero.
    InvalidPacketIdentifier,

    /// Catch-all for malformed packet content that doesn't fit another
    /// variant (e.g. an unexpected payload length).
    UnexpectedDataLength,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for DecodeError {}

impl From<ByteArrayError> for DecodeError {
    fn from(e: ByteArrayError) -> Self {
        match e {
            ByteArrayError::OutOfRange => DecodeError::IncompletePacket,
            ByteArrayError::InvalidString(_) => DecodeError::InvalidString,
        }
    }
}

impl From<StringError> for DecodeError {
    fn from(_e: StringError) -> Self {
        DecodeError::InvalidString
    }
}

/// Errors returned while encoding a packet into bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// A variable byte integer (remaining length, property length,
    /// subscription identifier, ...) would need more than 4 bytes to
    /// encode -- the value exceeds 268,435,455.
    InvalidVarInt,

    /// A string or binary field is longer than 65,535 bytes.
    TooManyData,

    /// String content is not valid UTF-8 or uses a disallowed code point.
    InvalidString,

    /// Topic name used a wildcard character where PUBLISH forbids one.
    InvalidTopicName,

    /// Client identifier is empty or contains characters the broker may
    /// reject.
    InvalidClientId,

    /// Underlying `std::io::Write` into the byte buffer failed. Buffers
    /// used here are always `Vec<u8>`, so this should never happen in
    /// practice, but `byteorder`'s write methods return `io::Result`.
    Io,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for EncodeError {}

impl From<std::io::Error> for EncodeError {
    fn from(_e: std::io::Error) -> Self {
        EncodeError::Io
    }
}

impl From<StringError> for EncodeError {
    fn from(_e: StringError) -> Self {
        EncodeError::InvalidString
    }
}
