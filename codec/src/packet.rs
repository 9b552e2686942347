// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::ack::SimpleAck;
use crate::auth::AuthPacket;
use crate::byte_array::ByteArray;
use crate::connect::ConnectPacket;
use crate::connect_ack::ConnectAckPacket;
use crate::disconnect::DisconnectPacket;
use crate::header::{FixedHeader, PacketType};
use crate::ping::{PingRequestPacket, PingResponsePacket};
use crate::protocol_version::ProtocolVersion;
use crate::publish::PublishPacket;
use crate::subscribe::{SubscribeAckPacket, SubscribePacket};
use crate::unsubscribe::{UnsubscribeAckPacket, UnsubscribePacket};
use crate::{DecodeError, DecodePacket, EncodeError, EncodePacket};

/// Every MQTT control packet this crate speaks, tagged by type. Each
/// variant carries only the fields its packet type defines; the fixed-
/// header flag bits live inside `Publish`'s tag and are validated by
/// [`PacketType::from_byte`] for every other type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(ConnectPacket),
    ConnectAck(ConnectAckPacket),
    Publish(PublishPacket),
    PublishAck(SimpleAck),
    PublishReceived(SimpleAck),
    PublishRelease(SimpleAck),
    PublishComplete(SimpleAck),
    Subscribe(SubscribePacket),
    SubscribeAck(SubscribeAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubscribeAck(UnsubscribeAckPacket),
    PingRequest,
    PingResponse,
    Disconnect(DisconnectPacket),
    Auth(AuthPacket),
}

impl Packet {
    #[must_use]
    pub const fn packet_type(&self) -> &'static str {
        match self {
            Self::Connect(_) => "CONNECT",
            Self::ConnectAck(_) => "CONNACK",
            Self::Publish(_) => "PUBLISH",
            Self::PublishAck(_) => "PUBACK",
            Self::PublishReceived(_) => "PUBREC",
            Self::PublishRelease(_) => "PUBREL",
            Self::PublishComplete(_) => "PUBCOMP",
            Self::Subscribe(_) => "SUBSCRIBE",
            Self::SubscribeAck(_) => "SUBACK",
            Self::Unsubscribe(_) => "UNSUBSCRIBE",
            Self::UnsubscribeAck(_) => "UNSUBACK",
            Self::PingRequest => "PINGREQ",
            Self::PingResponse => "PINGRESP",
            Self::Disconnect(_) => "DISCONNECT",
            Self::Auth(_) => "AUTH",
        }
    }

    /// Packet identifier carried by this packet, if its type has one.
    #[must_use]
    pub const fn packet_id(&self) -> Option<crate::base::PacketId> {
        match self {
            Self::Publish(p) => p.packet_id,
            Self::PublishAck(a)
            | Self::PublishReceived(a)
            | Self::PublishRelease(a)
            | Self::PublishComplete(a) => Some(a.packet_id),
            Self::Subscribe(p) => Some(p.packet_id),
            Self::SubscribeAck(p) => Some(p.packet_id),
            Self::Unsubscribe(p) => Some(p.packet_id),
            Self::UnsubscribeAck(p) => Some(p.packet_id),
            _ => None,
        }
    }

    /// Encode the full frame (fixed header + variable header + payload)
    /// for `version` onto the end of `buf`.
    ///
    /// # Errors
    /// Returns `EncodeError` if any field fails to encode or the total
    /// remaining length would exceed the variable-byte-integer maximum.
    pub fn encode(&self, buf: &mut Vec<u8>, version: ProtocolVersion) -> Result<usize, EncodeError> {
        let mut body = Vec::new();
        let packet_type = match self {
            Self::Connect(p) => {
                p.encode(&mut body)?;
                PacketType::Connect
            }
            Self::ConnectAck(p) => {
                p.encode(&mut body)?;
                PacketType::ConnectAck
            }
            Self::Publish(p) => {
                p.encode(&mut body, version)?;
                PacketType::Publish {
                    dup: p.dup,
                    qos: p.qos,
                    retain: p.retain,
                }
            }
            Self::PublishAck(a) => {
                a.encode(&mut body, version)?;
                PacketType::PublishAck
            }
            Self::PublishReceived(a) => {
                a.encode(&mut body, version)?;
                PacketType::PublishReceived
            }
            Self::PublishRelease(a) => {
                a.encode(&mut body, version)?;
                PacketType::PublishRelease
            }
            Self::PublishComplete(a) => {
                a.encode(&mut body, version)?;
                PacketType::PublishComplete
            }
            Self::Subscribe(p) => {
                p.encode(&mut body, version)?;
                PacketType::Subscribe
            }
            Self::SubscribeAck(p) => {
                p.encode(&mut body, version)?;
                PacketType::SubscribeAck
            }
            Self::Unsubscribe(p) => {
                p.encode(&mut body, version)?;
                PacketType::Unsubscribe
            }
            Self::UnsubscribeAck(p) => {
                p.encode(&mut body, version)?;
                PacketType::UnsubscribeAck
            }
            Self::PingRequest => PacketType::PingRequest,
            Self::PingResponse => PacketType::PingResponse,
            Self::Disconnect(p) => {
                p.encode(&mut body, version)?;
                PacketType::Disconnect
            }
            Self::Auth(p) => {
                p.encode(&mut body)?;
                PacketType::Auth
            }
        };

        let old_len = buf.len();
        let header = FixedHeader::new(packet_type, body.len())?;
        header.encode(buf)?;
        buf.extend_from_slice(&body);
        Ok(buf.len() - old_len)
    }

    /// Decode a complete frame: fixed header plus exactly
    /// `remaining_length` bytes of variable header and payload. Callers
    /// (the transports in `mqtt-client`) guarantee the buffer holds a
    /// whole frame; [`DecodeError::IncompletePacket`] only ever escapes
    /// when fewer bytes than the fixed header declares are present.
    ///
    /// # Errors
    /// Returns `DecodeError` if the frame violates the wire format for
    /// its packet type.
    pub fn decode(ba: &mut ByteArray, version: ProtocolVersion) -> Result<Self, DecodeError> {
        let header = FixedHeader::decode(ba)?;
        let body = ba.peek_sub_buffer(header.remaining_length)?;
        let mut body = body;
        let packet = match header.packet_type {
            PacketType::Connect => Self::Connect(ConnectPacket::decode(&mut body)?),
            PacketType::ConnectAck => {
                Self::ConnectAck(ConnectAckPacket::decode(&mut body, version)?)
            }
            PacketType::Publish { dup, qos, retain } => Self::Publish(PublishPacket::decode(
                &mut body,
                version,
                dup,
                qos,
                retain,
                header.remaining_length,
            )?),
            PacketType::PublishAck => {
                Self::PublishAck(SimpleAck::decode(&mut body, version, header.remaining_length)?)
            }
            PacketType::PublishReceived => Self::PublishReceived(SimpleAck::decode(
                &mut body,
                version,
                header.remaining_length,
            )?),
            PacketType::PublishRelease => Self::PublishRelease(SimpleAck::decode(
                &mut body,
                version,
                header.remaining_length,
            )?),
            PacketType::PublishComplete => Self::PublishComplete(SimpleAck::decode(
                &mut body,
                version,
                header.remaining_length,
            )?),
            PacketType::Subscribe => Self::Subscribe(SubscribePacket::decode(
                &mut body,
                version,
                header.remaining_length,
            )?),
            PacketType::SubscribeAck => Self::SubscribeAck(SubscribeAckPacket::decode(
                &mut body,
                version,
                header.remaining_length,
            )?),
            PacketType::Unsubscribe => Self::Unsubscribe(UnsubscribePacket::decode(
                &mut body,
                version,
                header.remaining_length,
            )?),
            PacketType::UnsubscribeAck => Self::UnsubscribeAck(UnsubscribeAckPacket::decode(
                &mut body,
                version,
                header.remaining_length,
            )?),
            PacketType::PingRequest => {
                let _ = PingRequestPacket;
                Self::PingRequest
            }
            PacketType::PingResponse => {
                let _ = PingResponsePacket;
                Self::PingResponse
            }
            PacketType::Disconnect => Self::Disconnect(DisconnectPacket::decode(
                &mut body,
                version,
                header.remaining_length,
            )?),
            PacketType::Auth => {
                if version == ProtocolVersion::V311 {
                    log::warn!("packet: AUTH is not valid on MQTT 3.1.1 connections");
                    return Err(DecodeError::InvalidPacketType);
                }
                Self::Auth(AuthPacket::decode(&mut body, header.remaining_length)?)
            }
        };
        // Advance the parent cursor past the frame we just consumed from
        // the peeked sub-buffer.
        ba.read_bytes(header.remaining_length)?;
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::QoS;

    fn roundtrip(packet: Packet, version: ProtocolVersion) {
        let mut buf = Vec::new();
        packet.encode(&mut buf, version).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = Packet::decode(&mut ba, version).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(ba.offset(), buf.len());
    }

    #[test]
    fn ping_roundtrip() {
        roundtrip(Packet::PingRequest, ProtocolVersion::V5);
        roundtrip(Packet::PingResponse, ProtocolVersion::V311);
    }

    #[test]
    fn publish_qos2_roundtrip_v5() {
        let mut p = PublishPacket::new("t", QoS::ExactlyOnce, b"hi".to_vec()).unwrap();
        p.packet_id = Some(9);
        roundtrip(Packet::Publish(p), ProtocolVersion::V5);
    }

    #[test]
    fn connect_then_connack_roundtrip() {
        let connect = ConnectPacket::new(ProtocolVersion::V5, "client-a").unwrap();
        roundtrip(Packet::Connect(connect), ProtocolVersion::V5);
    }

    #[test]
    fn auth_rejected_on_v311() {
        let mut buf = Vec::new();
        Packet::Auth(AuthPacket::new(
            crate::reason_code::ReasonCode::Success,
            crate::properties::Properties::new(),
        ))
        .encode(&mut buf, ProtocolVersion::V5)
        .unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            Packet::decode(&mut ba, ProtocolVersion::V311),
            Err(DecodeError::InvalidPacketType)
        );
    }

    #[test]
    fn incomplete_frame_is_reported_past_fixed_header() {
        let mut buf = Vec::new();
        Packet::PingRequest.encode(&mut buf, ProtocolVersion::V5).unwrap();
        buf.extend_from_slice(&[0xe0, 0x10]); // a second, truncated frame
        let mut ba = ByteArray::new(&buf);
        assert_eq!(Packet::decode(&mut ba, ProtocolVersion::V5), Ok(Packet::PingRequest));
        // The fixed header (type + remaining-length) decodes fine; only the
        // body is short, so per spec.md 4.4 the cursor lands past it.
        assert!(Packet::decode(&mut ba, ProtocolVersion::V5).is_err());
        assert_eq!(ba.offset(), buf.len());
    }
}
