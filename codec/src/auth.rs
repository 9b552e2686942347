// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::byte_array::ByteArray;
use crate::properties::Properties;
use crate::reason_code::ReasonCode;
use crate::{DecodeError, EncodeError, EncodePacket};

/// AUTH packet, MQTT 5.0 only -- the enhanced-authentication handshake.
/// Never sent or expected on a v3.1.1 connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPacket {
    pub reason_code: ReasonCode,
    pub properties: Properties,
}

impl AuthPacket {
    #[must_use]
    pub fn new(reason_code: ReasonCode, properties: Properties) -> Self {
        Self {
            reason_code,
            properties,
        }
    }

    fn can_shorten(&self) -> bool {
        self.reason_code == ReasonCode::Success && self.properties.is_empty()
    }

    /// # Errors
    /// Returns `EncodeError` on failure.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        if !self.can_shorten() {
            buf.push(self.reason_code as u8);
            self.properties.encode(buf)?;
        }
        Ok(buf.len() - old_len)
    }

    /// # Errors
    /// Returns `DecodeError` on a malformed reason code.
    pub fn decode(ba: &mut ByteArray, remaining_length: usize) -> Result<Self, DecodeError> {
        if remaining_length == 0 {
            return Ok(Self::new(ReasonCode::Success, Properties::new()));
        }
        let reason_code = ReasonCode::try_from(ba.read_byte()?)?;
        let properties = Properties::decode(ba)?;
        Ok(Self {
            reason_code,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortened_form_roundtrip() {
        let packet = AuthPacket::new(ReasonCode::Success, Properties::new());
        let mut buf = Vec::new();
        let len = packet.encode(&mut buf).unwrap();
        assert_eq!(len, 0);
        let mut ba = ByteArray::new(&buf);
        assert_eq!(AuthPacket::decode(&mut ba, len).unwrap(), packet);
    }

    #[test]
    fn continue_authentication_roundtrip() {
        use crate::binary_data::BinaryData;
        use crate::properties::Property;

        let mut properties = Properties::new();
        properties.push(Property::AuthenticationMethod(
            crate::string_data::StringData::from("SCRAM").unwrap(),
        ));
        properties.push(Property::AuthenticationData(
            BinaryData::from_slice(b"challenge").unwrap(),
        ));
        let packet = AuthPacket::new(ReasonCode::ContinueAuthentication, properties);
        let mut buf = Vec::new();
        let len = packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(AuthPacket::decode(&mut ba, len).unwrap(), packet);
    }
}
