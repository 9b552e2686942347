// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::byte_array::ByteArray;
use crate::var_int::{varint_packet_size, VarInt, MAX_VARINT};
use crate::{DecodeError, DecodePacket, EncodeError, EncodePacket, QoS};

/// Packet type nibble plus the four flag bits that sit below it in the
/// first fixed-header byte. `Publish` is the only variant whose flags
/// carry information (dup/qos/retain); every other packet type has a
/// single fixed flag pattern and any other value is `InvalidPacketFlags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect,
    ConnectAck,
    Publish { dup: bool, qos: QoS, retain: bool },
    PublishAck,
    PublishReceived,
    PublishRelease,
    PublishComplete,
    Subscribe,
    SubscribeAck,
    Unsubscribe,
    UnsubscribeAck,
    PingRequest,
    PingResponse,
    Disconnect,
    /// MQTT 5.0 only.
    Auth,
}

impl PacketType {
    /// Convert the first fixed-header byte into a packet type, validating
    /// the flag bits against what this packet type requires.
    ///
    /// # Errors
    /// Returns `InvalidPacketType` if the top nibble does not match a known
    /// packet type, or `InvalidPacketFlags` if the bottom nibble is wrong
    /// for a fixed-flags packet type.
    pub fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        let type_bits = byte >> 4;
        let flags = byte & 0x0f;
        match type_bits {
            1 => fixed_flags(flags, 0b0000, PacketType::Connect),
            2 => fixed_flags(flags, 0b0000, PacketType::ConnectAck),
            3 => {
                let dup = flags & 0b1000 != 0;
                let qos = QoS::try_from((flags & 0b0110) >> 1)?;
                let retain = flags & 0b0001 != 0;
                Ok(PacketType::Publish { dup, qos, retain })
            }
            4 => fixed_flags(flags, 0b0000, PacketType::PublishAck),
            5 => fixed_flags(flags, 0b0000, PacketType::PublishReceived),
            6 => fixed_flags(flags, 0b0010, PacketType::PublishRelease),
            7 => fixed_flags(flags, 0b0000, PacketType::PublishComplete),
            8 => fixed_flags(flags, 0b0010, PacketType::Subscribe),
            9 => fixed_flags(flags, 0b0000, PacketType::SubscribeAck),
            10 => fixed_flags(flags, 0b0010, PacketType::Unsubscribe),
            11 => fixed_flags(flags, 0b0000, PacketType::UnsubscribeAck),
            12 => fixed_flags(flags, 0b0000, PacketType::PingRequest),
            13 => fixed_flags(flags, 0b0000, PacketType::PingResponse),
            14 => fixed_flags(flags, 0b0000, PacketType::Disconnect),
            15 => fixed_flags(flags, 0b0000, PacketType::Auth),
            _ => Err(DecodeError::InvalidPacketType),
        }
    }

    #[must_use]
    pub const fn to_byte(self) -> u8 {
        let (type_bits, flags): (u8, u8) = match self {
            PacketType::Connect => (1, 0b0000),
            PacketType::ConnectAck => (2, 0b0000),
            PacketType::Publish { dup, qos, retain } => {
                let mut flags = (qos as u8) << 1;
                if dup {
                    flags |= 0b1000;
                }
                if retain {
                    flags |= 0b0001;
                }
                (3, flags)
            }
            PacketType::PublishAck => (4, 0b0000),
            PacketType::PublishReceived => (5, 0b0000),
            PacketType::PublishRelease => (6, 0b0010),
            PacketType::PublishComplete => (7, 0b0000),
            PacketType::Subscribe => (8, 0b0010),
            PacketType::SubscribeAck => (9, 0b0000),
            PacketType::Unsubscribe => (10, 0b0010),
            PacketType::UnsubscribeAck => (11, 0b0000),
            PacketType::PingRequest => (12, 0b0000),
            PacketType::PingResponse => (13, 0b0000),
            PacketType::Disconnect => (14, 0b0000),
            PacketType::Auth => (15, 0b0000),
        };
        (type_bits << 4) | flags
    }
}

fn fixed_flags(
    flags: u8,
    expect: u8,
    packet_type: PacketType,
) -> Result<PacketType, DecodeError> {
    if flags == expect {
        Ok(packet_type)
    } else {
        log::error!("header: invalid flags {flags:#06b} for {packet_type:?}, expected {expect:#06b}");
        Err(DecodeError::InvalidPacketFlags)
    }
}

/// The first 2-5 bytes of every MQTT packet: a type+flags byte followed
/// by the variable-length remaining-length field, which counts every byte
/// of the packet after the fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub remaining_length: usize,
}

impl FixedHeader {
    #[must_use]
    pub fn new(packet_type: PacketType, remaining_length: usize) -> Result<Self, EncodeError> {
        if remaining_length > MAX_VARINT {
            return Err(EncodeError::InvalidVarInt);
        }
        Ok(Self {
            packet_type,
            remaining_length,
        })
    }

    /// Total size on the wire: the type+flags byte, the remaining-length
    /// field itself, and `remaining_length` bytes of variable header plus
    /// payload.
    #[must_use]
    pub const fn bytes(&self) -> usize {
        1 + varint_packet_size(self.remaining_length) + self.remaining_length
    }
}

impl DecodePacket for FixedHeader {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let byte = ba.read_byte()?;
        let packet_type = PacketType::from_byte(byte)?;
        let remaining_length = VarInt::decode(ba)?.value();
        Ok(Self {
            packet_type,
            remaining_length,
        })
    }
}

impl EncodePacket for FixedHeader {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push(self.packet_type.to_byte());
        let written = VarInt::from(self.remaining_length)
            .map_err(|_e| EncodeError::InvalidVarInt)?
            .encode(buf)?;
        Ok(1 + written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_flags_roundtrip() {
        let pt = PacketType::Publish {
            dup: true,
            qos: QoS::ExactlyOnce,
            retain: true,
        };
        assert_eq!(PacketType::from_byte(pt.to_byte()).unwrap(), pt);
    }

    #[test]
    fn rejects_bad_subscribe_flags() {
        // SUBSCRIBE type nibble is 8, required flags are 0b0010.
        assert_eq!(
            PacketType::from_byte(0b1000_0000),
            Err(DecodeError::InvalidPacketFlags)
        );
    }

    #[test]
    fn rejects_unknown_packet_type() {
        assert_eq!(
            PacketType::from_byte(0b0000_0000),
            Err(DecodeError::InvalidPacketType)
        );
    }

    #[test]
    fn fixed_header_roundtrip() {
        let header = FixedHeader::new(PacketType::PingRequest, 0).unwrap();
        let mut buf = Vec::new();
        header.encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0xc0, 0x00]);
        let mut ba = ByteArray::new(&buf);
        assert_eq!(FixedHeader::decode(&mut ba).unwrap(), header);
    }
}
