// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::binary_data::BinaryData;
use crate::byte_array::ByteArray;
use crate::connect_flags::ConnectFlags;
use crate::keep_alive::{validate_keep_alive, KeepAlive};
use crate::properties::Properties;
use crate::protocol_version::{ProtocolVersion, PROTOCOL_NAME};
use crate::string_data::StringData;
use crate::utils::{contains_wildcard, validate_client_id};
use crate::{DecodeError, DecodePacket, EncodeError, EncodePacket, QoS};

/// Pre-registered message a broker publishes on the client's abnormal
/// disconnect. Payload order on the wire (v5): will-properties, will-topic,
/// will-payload -- spec.md §4.4's mandatory CONNECT payload ordering.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Will {
    pub properties: Properties,
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// CONNECT packet, unified across MQTT 3.1.1 and 5.0. `properties` and
/// `will.properties` are always empty on `ProtocolVersion::V311` and never
/// encoded on the wire for that version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectPacket {
    pub version: ProtocolVersion,
    pub keep_alive: u16,
    pub clean_start: bool,
    pub client_id: String,
    pub will: Option<Will>,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
    pub properties: Properties,
}

impl ConnectPacket {
    /// # Errors
    /// Returns `EncodeError::InvalidClientId` if `client_id` fails the v3.1.1
    /// character-set check on a v3 connection.
    pub fn new(version: ProtocolVersion, client_id: &str) -> Result<Self, EncodeError> {
        if version == ProtocolVersion::V311 || !client_id.is_empty() {
            validate_client_id(client_id).map_err(|_e| EncodeError::InvalidClientId)?;
        }
        Ok(Self {
            version,
            keep_alive: 60,
            clean_start: true,
            client_id: client_id.to_string(),
            will: None,
            username: None,
            password: None,
            properties: Properties::new(),
        })
    }

    fn connect_flags(&self) -> ConnectFlags {
        ConnectFlags {
            has_username: self.username.is_some(),
            has_password: self.password.is_some(),
            will_retain: self.will.as_ref().is_some_and(|w| w.retain),
            will_qos: self.will.as_ref().map_or(QoS::AtMostOnce, |w| w.qos),
            has_will: self.will.is_some(),
            clean_start: self.clean_start,
        }
    }
}

impl EncodePacket for ConnectPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        StringData::from(PROTOCOL_NAME)?.encode(buf)?;
        self.version.encode(buf)?;
        self.connect_flags().encode(buf)?;
        KeepAlive::new(self.keep_alive).encode(buf)?;
        if self.version.is_v5() {
            self.properties.encode(buf)?;
        }

        StringData::from(&self.client_id)?.encode(buf)?;

        if let Some(will) = &self.will {
            if contains_wildcard(&will.topic) {
                return Err(EncodeError::InvalidTopicName);
            }
            if self.version.is_v5() {
                will.properties.encode(buf)?;
            }
            StringData::from(&will.topic)?.encode(buf)?;
            BinaryData::from_slice(&will.payload)?.encode(buf)?;
        }
        if let Some(username) = &self.username {
            StringData::from(username)?.encode(buf)?;
        }
        if let Some(password) = &self.password {
            BinaryData::from_slice(password)?.encode(buf)?;
        }
        Ok(buf.len() - old_len)
    }
}

impl ConnectPacket {
    /// Decode a CONNECT variable header + payload, given the fixed header
    /// has already been consumed.
    ///
    /// # Errors
    /// Returns a `DecodeError` if any mandatory field is missing, the
    /// protocol name isn't `"MQTT"`, or the payload order is violated.
    pub fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let protocol_name = StringData::decode(ba)?;
        if protocol_name.as_str() != PROTOCOL_NAME {
            return Err(DecodeError::InvalidProtocolName);
        }
        let version = ProtocolVersion::try_from(ba.read_byte()?)?;
        let flags = ConnectFlags::decode(ba)?;
        let keep_alive = KeepAlive::decode(ba)?;
        validate_keep_alive(keep_alive)?;

        let properties = if version.is_v5() {
            Properties::decode(ba)?
        } else {
            Properties::new()
        };

        let client_id = StringData::decode(ba)?;
        if client_id.as_str().is_empty() && !flags.clean_start && version == ProtocolVersion::V311
        {
            return Err(DecodeError::InvalidPacketIdentifier);
        }

        let will = if flags.has_will {
            let will_properties = if version.is_v5() {
                Properties::decode(ba)?
            } else {
                Properties::new()
            };
            let topic = StringData::decode(ba)?;
            let payload = BinaryData::decode(ba)?;
            Some(Will {
                properties: will_properties,
                topic: topic.as_str().to_string(),
                payload: payload.as_ref().to_vec(),
                qos: flags.will_qos,
                retain: flags.will_retain,
            })
        } else {
            None
        };

        let username = if flags.has_username {
            Some(StringData::decode(ba)?.as_str().to_string())
        } else {
            None
        };
        let password = if flags.has_password {
            Some(BinaryData::decode(ba)?.as_ref().to_vec())
        } else {
            None
        };

        Ok(Self {
            version,
            keep_alive: keep_alive.value(),
            clean_start: flags.clean_start,
            client_id: client_id.as_str().to_string(),
            will,
            username,
            password,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{FixedHeader, PacketType};

    fn roundtrip(packet: &ConnectPacket) -> ConnectPacket {
        let mut buf = Vec::new();
        let len = packet.encode(&mut buf).unwrap();
        let fh = FixedHeader::new(PacketType::Connect, len).unwrap();
        let mut framed = Vec::new();
        fh.encode(&mut framed).unwrap();
        framed.extend_from_slice(&buf);

        let mut ba = ByteArray::new(&framed);
        let decoded_fh = FixedHeader::decode(&mut ba).unwrap();
        assert_eq!(decoded_fh.remaining_length, len);
        ConnectPacket::decode(&mut ba).unwrap()
    }

    #[test]
    fn v311_roundtrip() {
        let packet = ConnectPacket::new(ProtocolVersion::V311, "client1").unwrap();
        assert_eq!(roundtrip(&packet), packet);
    }

    #[test]
    fn v5_with_will_and_properties_roundtrip() {
        let mut packet = ConnectPacket::new(ProtocolVersion::V5, "client2").unwrap();
        packet.username = Some("user".to_string());
        packet.password = Some(b"pass".to_vec());
        packet.will = Some(Will {
            properties: Properties::new(),
            topic: "a/b".to_string(),
            payload: b"bye".to_vec(),
            qos: QoS::AtLeastOnce,
            retain: true,
        });
        assert_eq!(roundtrip(&packet), packet);
    }

    #[test]
    fn empty_client_id_requires_clean_start_on_v311() {
        let mut packet = ConnectPacket::new(ProtocolVersion::V311, "x").unwrap();
        packet.client_id = String::new();
        packet.clean_start = false;
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert!(ConnectPacket::decode(&mut ba).is_err());
    }
}
