// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::base::PacketId;
use crate::byte_array::ByteArray;
use crate::properties::Properties;
use crate::protocol_version::ProtocolVersion;
use crate::reason_code::ReasonCode;
use crate::u16_data::U16Data;
use crate::{DecodeError, EncodeError, EncodePacket};

/// Shared wire layout of PUBACK, PUBREC, PUBREL and PUBCOMP: a packet
/// identifier, and on v5 optionally a reason code and properties. v5 may
/// shorten the frame to just the packet id when the reason is `Success`
/// and there are no properties -- spec.md §4.4.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimpleAck {
    pub packet_id: PacketId,
    pub reason_code: ReasonCode,
    pub properties: Properties,
}

impl SimpleAck {
    #[must_use]
    pub fn new(packet_id: PacketId) -> Self {
        Self {
            packet_id,
            reason_code: ReasonCode::Success,
            properties: Properties::new(),
        }
    }

    #[must_use]
    pub fn with_reason(packet_id: PacketId, reason_code: ReasonCode) -> Self {
        Self {
            packet_id,
            reason_code,
            properties: Properties::new(),
        }
    }

    fn can_shorten(&self) -> bool {
        self.reason_code == ReasonCode::Success && self.properties.is_empty()
    }

    /// # Errors
    /// Returns `EncodeError` if the reason code or properties fail to
    /// encode.
    pub fn encode(
        &self,
        buf: &mut Vec<u8>,
        version: ProtocolVersion,
    ) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        U16Data::new(self.packet_id).encode(buf)?;
        if version.is_v5() && !self.can_shorten() {
            buf.push(self.reason_code as u8);
            self.properties.encode(buf)?;
        }
        Ok(buf.len() - old_len)
    }

    /// # Errors
    /// Returns `DecodeError` on a malformed packet identifier or reason
    /// code.
    pub fn decode(
        ba: &mut ByteArray,
        version: ProtocolVersion,
        remaining_length: usize,
    ) -> Result<Self, DecodeError> {
        let packet_id = U16Data::decode(ba)?.value();
        if packet_id == 0 {
            return Err(DecodeError::InvalidPacketIdentifier);
        }
        if version.is_v5() && remaining_length > U16Data::bytes() {
            let reason_code = ReasonCode::try_from(ba.read_byte()?)?;
            let properties = Properties::decode(ba)?;
            Ok(Self {
                packet_id,
                reason_code,
                properties,
            })
        } else {
            Ok(Self::new(packet_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v5_shortened_form_roundtrip() {
        let ack = SimpleAck::new(9);
        let mut buf = Vec::new();
        let len = ack.encode(&mut buf, ProtocolVersion::V5).unwrap();
        assert_eq!(len, 2);
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            SimpleAck::decode(&mut ba, ProtocolVersion::V5, len).unwrap(),
            ack
        );
    }

    #[test]
    fn v5_full_form_roundtrip() {
        let ack = SimpleAck::with_reason(9, ReasonCode::PacketIdentifierNotFound);
        let mut buf = Vec::new();
        let len = ack.encode(&mut buf, ProtocolVersion::V5).unwrap();
        assert_eq!(len, 4);
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            SimpleAck::decode(&mut ba, ProtocolVersion::V5, len).unwrap(),
            ack
        );
    }

    #[test]
    fn v311_roundtrip_always_two_bytes() {
        let ack = SimpleAck::new(42);
        let mut buf = Vec::new();
        let len = ack.encode(&mut buf, ProtocolVersion::V311).unwrap();
        assert_eq!(len, 2);
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            SimpleAck::decode(&mut ba, ProtocolVersion::V311, len).unwrap(),
            ack
        );
    }
}
