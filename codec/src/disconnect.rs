// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::byte_array::ByteArray;
use crate::properties::Properties;
use crate::protocol_version::ProtocolVersion;
use crate::reason_code::ReasonCode;
use crate::{DecodeError, EncodeError, EncodePacket};

/// DISCONNECT packet. v3.1.1 has no variable header or payload at all; v5
/// may omit the reason code and properties when reason is `Success` and
/// properties are empty, the same shortened form `SimpleAck` uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectPacket {
    pub reason_code: ReasonCode,
    pub properties: Properties,
}

impl DisconnectPacket {
    #[must_use]
    pub fn new() -> Self {
        Self {
            reason_code: ReasonCode::Success,
            properties: Properties::new(),
        }
    }

    #[must_use]
    pub fn with_reason(reason_code: ReasonCode) -> Self {
        Self {
            reason_code,
            properties: Properties::new(),
        }
    }

    fn can_shorten(&self) -> bool {
        self.reason_code == ReasonCode::Success && self.properties.is_empty()
    }

    /// # Errors
    /// Returns `EncodeError` on failure.
    pub fn encode(
        &self,
        buf: &mut Vec<u8>,
        version: ProtocolVersion,
    ) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        if version.is_v5() && !self.can_shorten() {
            buf.push(self.reason_code as u8);
            self.properties.encode(buf)?;
        }
        Ok(buf.len() - old_len)
    }

    /// # Errors
    /// Returns `DecodeError` on a malformed reason code.
    pub fn decode(
        ba: &mut ByteArray,
        version: ProtocolVersion,
        remaining_length: usize,
    ) -> Result<Self, DecodeError> {
        if version == ProtocolVersion::V311 || remaining_length == 0 {
            return Ok(Self::new());
        }
        let reason_code = ReasonCode::try_from(ba.read_byte()?)?;
        let properties = Properties::decode(ba)?;
        Ok(Self {
            reason_code,
            properties,
        })
    }
}

impl Default for DisconnectPacket {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v311_has_no_body() {
        let packet = DisconnectPacket::new();
        let mut buf = Vec::new();
        let len = packet.encode(&mut buf, ProtocolVersion::V311).unwrap();
        assert_eq!(len, 0);
    }

    #[test]
    fn v5_full_form_roundtrip() {
        let packet = DisconnectPacket::with_reason(ReasonCode::QuotaExceeded);
        let mut buf = Vec::new();
        let len = packet.encode(&mut buf, ProtocolVersion::V5).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = DisconnectPacket::decode(&mut ba, ProtocolVersion::V5, len).unwrap();
        assert_eq!(decoded, packet);
    }
}
