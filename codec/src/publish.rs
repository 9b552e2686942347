// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::PacketId;
use crate::byte_array::ByteArray;
use crate::properties::Properties;
use crate::protocol_version::ProtocolVersion;
use crate::string_data::StringData;
use crate::u16_data::U16Data;
use crate::utils::contains_wildcard;
use crate::{DecodeError, EncodeError, EncodePacket, QoS};

/// PUBLISH. `packet_id` is `None` iff `qos == AtMostOnce` -- spec.md §4.4.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishPacket {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: String,
    pub packet_id: Option<PacketId>,
    pub properties: Properties,
    pub payload: Vec<u8>,
}

impl PublishPacket {
    /// # Errors
    /// Returns `EncodeError::InvalidTopicName` if `topic` contains a
    /// wildcard, which is forbidden in PUBLISH.
    pub fn new(topic: &str, qos: QoS, payload: Vec<u8>) -> Result<Self, EncodeError> {
        if contains_wildcard(topic) {
            return Err(EncodeError::InvalidTopicName);
        }
        Ok(Self {
            dup: false,
            qos,
            retain: false,
            topic: topic.to_string(),
            packet_id: None,
            properties: Properties::new(),
            payload,
        })
    }
}

impl PublishPacket {
    /// # Errors
    /// Returns `EncodeError` if the topic is invalid or the packet
    /// identifier is missing/present in violation of QoS.
    pub fn encode(
        &self,
        buf: &mut Vec<u8>,
        version: ProtocolVersion,
    ) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        if contains_wildcard(&self.topic) {
            return Err(EncodeError::InvalidTopicName);
        }
        StringData::from(&self.topic)?.encode(buf)?;
        match (self.qos, self.packet_id) {
            (QoS::AtMostOnce, None) => {}
            (QoS::AtMostOnce, Some(_)) | (_, None) => return Err(EncodeError::Io),
            (_, Some(id)) => {
                U16Data::new(id).encode(buf)?;
            }
        }
        if version.is_v5() {
            self.properties.encode(buf)?;
        }
        buf.extend_from_slice(&self.payload);
        Ok(buf.len() - old_len)
    }

    /// Decode a PUBLISH body given the flags already parsed out of the
    /// fixed header and `remaining_length` bytes available in `ba`.
    ///
    /// # Errors
    /// Returns a `DecodeError` on malformed content.
    pub fn decode(
        ba: &mut ByteArray,
        version: ProtocolVersion,
        dup: bool,
        qos: QoS,
        retain: bool,
        remaining_length: usize,
    ) -> Result<Self, DecodeError> {
        let start_offset = ba.offset();
        let topic = StringData::decode(ba)?;
        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            let id = U16Data::decode(ba)?.value();
            if id == 0 {
                return Err(DecodeError::InvalidPacketIdentifier);
            }
            Some(id)
        };
        let properties = if version.is_v5() {
            Properties::decode(ba)?
        } else {
            Properties::new()
        };
        let consumed = ba.offset() - start_offset;
        let payload_len = remaining_length
            .checked_sub(consumed)
            .ok_or(DecodeError::UnexpectedDataLength)?;
        let payload = ba.read_bytes(payload_len)?.to_vec();
        Ok(Self {
            dup,
            qos,
            retain,
            topic: topic.as_str().to_string(),
            packet_id,
            properties,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos0_roundtrip() {
        let packet = PublishPacket::new("t", QoS::AtMostOnce, b"hi".to_vec()).unwrap();
        let mut buf = Vec::new();
        let len = packet.encode(&mut buf, ProtocolVersion::V5).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = PublishPacket::decode(
            &mut ba,
            ProtocolVersion::V5,
            packet.dup,
            packet.qos,
            packet.retain,
            len,
        )
        .unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn qos2_roundtrip_with_packet_id() {
        let mut packet = PublishPacket::new("t/2", QoS::ExactlyOnce, b"payload".to_vec()).unwrap();
        packet.packet_id = Some(7);
        packet.dup = true;
        let mut buf = Vec::new();
        let len = packet.encode(&mut buf, ProtocolVersion::V311).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = PublishPacket::decode(
            &mut ba,
            ProtocolVersion::V311,
            packet.dup,
            packet.qos,
            packet.retain,
            len,
        )
        .unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn rejects_wildcard_topic() {
        assert_eq!(
            PublishPacket::new("a/+", QoS::AtMostOnce, vec![]).unwrap_err(),
            EncodeError::InvalidTopicName
        );
    }
}
