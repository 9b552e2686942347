// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::fmt;

use crate::byte_array::ByteArray;
use crate::string_data::StringData;
use crate::{DecodeError, DecodePacket, EncodeError, EncodePacket};

/// A UTF-8 String Pair: used for the v5 `UserProperty`, name then value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StringPairData(StringData, StringData);

impl StringPairData {
    /// # Errors
    /// Returns `EncodeError` if `key` or `value` are invalid strings.
    pub fn new(key: &str, value: &str) -> Result<Self, EncodeError> {
        Ok(Self(StringData::from(key)?, StringData::from(value)?))
    }

    #[must_use]
    pub fn key(&self) -> &str {
        self.0.as_str()
    }

    #[must_use]
    pub fn value(&self) -> &str {
        self.1.as_str()
    }

    #[must_use]
    pub fn bytes(&self) -> usize {
        self.0.bytes() + self.1.bytes()
    }
}

impl fmt::Display for StringPairData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}

impl DecodePacket for StringPairData {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let key = StringData::decode(ba)?;
        let value = StringData::decode(ba)?;
        Ok(Self(key, value))
    }
}

impl EncodePacket for StringPairData {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        Ok(self.0.encode(buf)? + self.1.encode(buf)?)
    }
}
