// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::byte_array::ByteArray;
use crate::properties::Properties;
use crate::protocol_version::ProtocolVersion;
use crate::reason_code::{ConnectReturnCode, ReasonCode};
use crate::{DecodeError, EncodeError, EncodePacket};

/// CONNACK's second byte, version-specific: a small disjoint v3.1.1 return
/// code, or a v5 reason code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckCode {
    V311(ConnectReturnCode),
    V5(ReasonCode),
}

impl AckCode {
    #[must_use]
    pub const fn is_success(self) -> bool {
        match self {
            Self::V311(code) => code.is_success(),
            Self::V5(code) => code.is_success(),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Self::V311(code) => code as u8,
            Self::V5(code) => code as u8,
        }
    }
}

/// CONNACK, unified across MQTT 3.1.1 and 5.0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectAckPacket {
    pub session_present: bool,
    pub reason_code: AckCode,
    pub properties: Properties,
}

impl ConnectAckPacket {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.reason_code.is_success()
    }

    fn is_v5(&self) -> bool {
        matches!(self.reason_code, AckCode::V5(_))
    }
}

impl EncodePacket for ConnectAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        buf.push(u8::from(self.session_present));
        buf.push(self.reason_code.to_byte());
        if self.is_v5() {
            self.properties.encode(buf)?;
        }
        Ok(buf.len() - old_len)
    }
}

impl ConnectAckPacket {
    /// # Errors
    /// Returns `DecodeError` on a malformed acknowledgement flags byte or
    /// an unrecognised reason/return code for `version`.
    pub fn decode(ba: &mut ByteArray, version: ProtocolVersion) -> Result<Self, DecodeError> {
        let ack_flags = ba.read_byte()?;
        if ack_flags & 0b1111_1110 != 0 {
            return Err(DecodeError::UnexpectedDataLength);
        }
        let session_present = ack_flags & 0x01 != 0;
        let code_byte = ba.read_byte()?;
        let reason_code = match version {
            ProtocolVersion::V311 => AckCode::V311(ConnectReturnCode::try_from(code_byte)?),
            ProtocolVersion::V5 => AckCode::V5(ReasonCode::try_from(code_byte)?),
        };
        let properties = if version.is_v5() {
            Properties::decode(ba)?
        } else {
            Properties::new()
        };
        Ok(Self {
            session_present,
            reason_code,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v5_roundtrip() {
        let packet = ConnectAckPacket {
            session_present: true,
            reason_code: AckCode::V5(ReasonCode::Success),
            properties: Properties::new(),
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            ConnectAckPacket::decode(&mut ba, ProtocolVersion::V5).unwrap(),
            packet
        );
    }

    #[test]
    fn v311_failure_is_not_success() {
        let buf = vec![0x00, 0x04];
        let mut ba = ByteArray::new(&buf);
        let packet = ConnectAckPacket::decode(&mut ba, ProtocolVersion::V311).unwrap();
        assert!(!packet.is_success());
        assert_eq!(
            packet.reason_code,
            AckCode::V311(ConnectReturnCode::BadUserNameOrPassword)
        );
    }
}
