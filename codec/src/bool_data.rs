// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::byte_array::ByteArray;
use crate::{DecodeError, DecodePacket, EncodeError, EncodePacket};

/// One-byte boolean property value, e.g. Payload Format Indicator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BoolData(bool);

impl BoolData {
    #[must_use]
    pub const fn new(value: bool) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(&self) -> bool {
        self.0
    }

    #[must_use]
    pub const fn bytes() -> usize {
        1
    }
}

impl DecodePacket for BoolData {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        match ba.read_byte()? {
            0x00 => Ok(Self(false)),
            0x01 => Ok(Self(true)),
            _ => Err(DecodeError::InvalidBoolData),
        }
    }
}

impl EncodePacket for BoolData {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push(u8::from(self.0));
        Ok(Self::bytes())
    }
}
