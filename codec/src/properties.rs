// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::binary_data::BinaryData;
use crate::bool_data::BoolData;
use crate::byte_array::ByteArray;
use crate::string_data::StringData;
use crate::string_pair_data::StringPairData;
use crate::u16_data::U16Data;
use crate::u32_data::U32Data;
use crate::utils::validate_client_id;
use crate::var_int::{varint_packet_size, VarInt};
use crate::{DecodeError, DecodePacket, EncodeError, EncodePacket, QoS};

/// Property types allowed to appear more than once in a single `Properties`
/// list -- every other type is a decode error the second time it appears.
const MULTIPLE_PROPERTIES: &[PropertyType] = &[
    PropertyType::UserProperty,
    PropertyType::SubscriptionIdentifier,
];

/// Identifier byte of an MQTT 5.0 property, one per [`Property`] variant.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    PayloadFormatIndicator = 0x01,
    MessageExpiryInterval = 0x02,
    ContentType = 0x03,
    ResponseTopic = 0x08,
    CorrelationData = 0x09,
    SubscriptionIdentifier = 0x0b,
    SessionExpiryInterval = 0x11,
    AssignedClientIdentifier = 0x12,
    ServerKeepAlive = 0x13,
    AuthenticationMethod = 0x15,
    AuthenticationData = 0x16,
    RequestProblemInformation = 0x17,
    WillDelayInterval = 0x18,
    RequestResponseInformation = 0x19,
    ResponseInformation = 0x1a,
    ServerReference = 0x1c,
    ReasonString = 0x1f,
    ReceiveMaximum = 0x21,
    TopicAliasMaximum = 0x22,
    TopicAlias = 0x23,
    MaximumQoS = 0x24,
    RetainAvailable = 0x25,
    UserProperty = 0x26,
    MaximumPacketSize = 0x27,
    WildcardSubscriptionAvailable = 0x28,
    SubscriptionIdentifierAvailable = 0x29,
    SharedSubscriptionAvailable = 0x2a,
}

impl PropertyType {
    #[must_use]
    pub const fn bytes() -> usize {
        1
    }
}

impl TryFrom<u8> for PropertyType {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0x01 => Ok(Self::PayloadFormatIndicator),
            0x02 => Ok(Self::MessageExpiryInterval),
            0x03 => Ok(Self::ContentType),
            0x08 => Ok(Self::ResponseTopic),
            0x09 => Ok(Self::CorrelationData),
            0x0b => Ok(Self::SubscriptionIdentifier),
            0x11 => Ok(Self::SessionExpiryInterval),
            0x12 => Ok(Self::AssignedClientIdentifier),
            0x13 => Ok(Self::ServerKeepAlive),
            0x15 => Ok(Self::AuthenticationMethod),
            0x16 => Ok(Self::AuthenticationData),
            0x17 => Ok(Self::RequestProblemInformation),
            0x18 => Ok(Self::WillDelayInterval),
            0x19 => Ok(Self::RequestResponseInformation),
            0x1a => Ok(Self::ResponseInformation),
            0x1c => Ok(Self::ServerReference),
            0x1f => Ok(Self::ReasonString),
            0x21 => Ok(Self::ReceiveMaximum),
            0x22 => Ok(Self::TopicAliasMaximum),
            0x23 => Ok(Self::TopicAlias),
            0x24 => Ok(Self::MaximumQoS),
            0x25 => Ok(Self::RetainAvailable),
            0x26 => Ok(Self::UserProperty),
            0x27 => Ok(Self::MaximumPacketSize),
            0x28 => Ok(Self::WildcardSubscriptionAvailable),
            0x29 => Ok(Self::SubscriptionIdentifierAvailable),
            0x2a => Ok(Self::SharedSubscriptionAvailable),
            _ => Err(DecodeError::InvalidPropertyType),
        }
    }
}

/// A single MQTT 5.0 property: identifier plus its typed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    PayloadFormatIndicator(BoolData),
    MessageExpiryInterval(U32Data),
    ContentType(StringData),
    /// Topic used as the basis for a response message.
    ResponseTopic(StringData),
    CorrelationData(BinaryData),
    /// 1..=268,435,455; zero is a protocol error, checked on decode.
    SubscriptionIdentifier(VarInt),
    SessionExpiryInterval(U32Data),
    AssignedClientIdentifier(StringData),
    ServerKeepAlive(U16Data),
    AuthenticationMethod(StringData),
    AuthenticationData(BinaryData),
    RequestProblemInformation(BoolData),
    WillDelayInterval(U32Data),
    RequestResponseInformation(BoolData),
    ResponseInformation(StringData),
    ServerReference(StringData),
    ReasonString(StringData),
    ReceiveMaximum(U16Data),
    TopicAliasMaximum(U16Data),
    TopicAlias(U16Data),
    /// Only `AtMostOnce` or `AtLeastOnce`; `ExactlyOnce` is a protocol error
    /// in this property, checked on decode.
    MaximumQoS(QoS),
    RetainAvailable(BoolData),
    UserProperty(StringPairData),
    MaximumPacketSize(U32Data),
    WildcardSubscriptionAvailable(BoolData),
    SubscriptionIdentifierAvailable(BoolData),
    SharedSubscriptionAvailable(BoolData),
}

impl Property {
    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        match self {
            Self::PayloadFormatIndicator(_) => PropertyType::PayloadFormatIndicator,
            Self::MessageExpiryInterval(_) => PropertyType::MessageExpiryInterval,
            Self::ContentType(_) => PropertyType::ContentType,
            Self::ResponseTopic(_) => PropertyType::ResponseTopic,
            Self::CorrelationData(_) => PropertyType::CorrelationData,
            Self::SubscriptionIdentifier(_) => PropertyType::SubscriptionIdentifier,
            Self::SessionExpiryInterval(_) => PropertyType::SessionExpiryInterval,
            Self::AssignedClientIdentifier(_) => PropertyType::AssignedClientIdentifier,
            Self::ServerKeepAlive(_) => PropertyType::ServerKeepAlive,
            Self::AuthenticationMethod(_) => PropertyType::AuthenticationMethod,
            Self::AuthenticationData(_) => PropertyType::AuthenticationData,
            Self::RequestProblemInformation(_) => PropertyType::RequestProblemInformation,
            Self::WillDelayInterval(_) => PropertyType::WillDelayInterval,
            Self::RequestResponseInformation(_) => PropertyType::RequestResponseInformation,
            Self::ResponseInformation(_) => PropertyType::ResponseInformation,
            Self::ServerReference(_) => PropertyType::ServerReference,
            Self::ReasonString(_) => PropertyType::ReasonString,
            Self::ReceiveMaximum(_) => PropertyType::ReceiveMaximum,
            Self::TopicAliasMaximum(_) => PropertyType::TopicAliasMaximum,
            Self::TopicAlias(_) => PropertyType::TopicAlias,
            Self::MaximumQoS(_) => PropertyType::MaximumQoS,
            Self::RetainAvailable(_) => PropertyType::RetainAvailable,
            Self::UserProperty(_) => PropertyType::UserProperty,
            Self::MaximumPacketSize(_) => PropertyType::MaximumPacketSize,
            Self::WildcardSubscriptionAvailable(_) => PropertyType::WildcardSubscriptionAvailable,
            Self::SubscriptionIdentifierAvailable(_) => {
                PropertyType::SubscriptionIdentifierAvailable
            }
            Self::SharedSubscriptionAvailable(_) => PropertyType::SharedSubscriptionAvailable,
        }
    }

    #[allow(clippy::match_same_arms)]
    #[must_use]
    pub fn bytes(&self) -> usize {
        let value_bytes = match self {
            Self::AssignedClientIdentifier(value) => value.bytes(),
            Self::AuthenticationData(value) => value.bytes(),
            Self::AuthenticationMethod(value) => value.bytes(),
            Self::ContentType(value) => value.bytes(),
            Self::CorrelationData(value) => value.bytes(),
            Self::MaximumPacketSize(..) => U32Data::bytes(),
            Self::MaximumQoS(..) => 1,
            Self::MessageExpiryInterval(..) => U32Data::bytes(),
            Self::PayloadFormatIndicator(..) => BoolData::bytes(),
            Self::ReasonString(value) => value.bytes(),
            Self::ReceiveMaximum(..) => U16Data::bytes(),
            Self::RequestProblemInformation(..) => BoolData::bytes(),
            Self::RequestResponseInformation(..) => BoolData::bytes(),
            Self::ResponseInformation(value) => value.bytes(),
            Self::ResponseTopic(value) => value.bytes(),
            Self::RetainAvailable(..) => BoolData::bytes(),
            Self::ServerKeepAlive(..) => U16Data::bytes(),
            Self::ServerReference(value) => value.bytes(),
            Self::SessionExpiryInterval(..) => U32Data::bytes(),
            Self::SharedSubscriptionAvailable(..) => BoolData::bytes(),
            Self::SubscriptionIdentifier(value) => value.bytes(),
            Self::SubscriptionIdentifierAvailable(..) => BoolData::bytes(),
            Self::TopicAlias(..) => U16Data::bytes(),
            Self::TopicAliasMaximum(..) => U16Data::bytes(),
            Self::UserProperty(value) => value.bytes(),
            Self::WildcardSubscriptionAvailable(..) => BoolData::bytes(),
            Self::WillDelayInterval(..) => U32Data::bytes(),
        };
        PropertyType::bytes() + value_bytes
    }
}

impl DecodePacket for Property {
    #[allow(clippy::too_many_lines)]
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let property_type = PropertyType::try_from(ba.read_byte()?)?;
        match property_type {
            PropertyType::SessionExpiryInterval => Ok(Self::SessionExpiryInterval(
                U32Data::decode(ba)?,
            )),
            PropertyType::ReceiveMaximum => Ok(Self::ReceiveMaximum(U16Data::decode(ba)?)),
            PropertyType::MaximumPacketSize => {
                Ok(Self::MaximumPacketSize(U32Data::decode(ba)?))
            }
            PropertyType::RequestResponseInformation => Ok(Self::RequestResponseInformation(
                BoolData::decode(ba)?,
            )),
            PropertyType::RequestProblemInformation => Ok(Self::RequestProblemInformation(
                BoolData::decode(ba)?,
            )),
            PropertyType::UserProperty => Ok(Self::UserProperty(StringPairData::decode(ba)?)),
            PropertyType::AuthenticationMethod => {
                Ok(Self::AuthenticationMethod(StringData::decode(ba)?))
            }
            PropertyType::AuthenticationData => {
                Ok(Self::AuthenticationData(BinaryData::decode(ba)?))
            }
            PropertyType::WillDelayInterval => {
                Ok(Self::WillDelayInterval(U32Data::decode(ba)?))
            }
            PropertyType::PayloadFormatIndicator => {
                Ok(Self::PayloadFormatIndicator(BoolData::decode(ba)?))
            }
            PropertyType::MessageExpiryInterval => {
                Ok(Self::MessageExpiryInterval(U32Data::decode(ba)?))
            }
            PropertyType::ContentType => Ok(Self::ContentType(StringData::decode(ba)?)),
            PropertyType::ResponseTopic => Ok(Self::ResponseTopic(StringData::decode(ba)?)),
            PropertyType::CorrelationData => {
                Ok(Self::CorrelationData(BinaryData::decode(ba)?))
            }
            PropertyType::MaximumQoS => {
                let qos = QoS::try_from(ba.read_byte()?)?;
                if qos == QoS::ExactlyOnce {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::MaximumQoS(qos))
            }
            PropertyType::RetainAvailable => Ok(Self::RetainAvailable(BoolData::decode(ba)?)),
            PropertyType::AssignedClientIdentifier => {
                let client_id = StringData::decode(ba)?;
                if !client_id.as_str().is_empty() {
                    validate_client_id(client_id.as_str())
                        .map_err(|_e| DecodeError::InvalidPropertyValue)?;
                }
                Ok(Self::AssignedClientIdentifier(client_id))
            }
            PropertyType::WildcardSubscriptionAvailable => {
                Ok(Self::WildcardSubscriptionAvailable(BoolData::decode(ba)?))
            }
            PropertyType::SubscriptionIdentifierAvailable => Ok(
                Self::SubscriptionIdentifierAvailable(BoolData::decode(ba)?),
            ),
            PropertyType::SharedSubscriptionAvailable => {
                Ok(Self::SharedSubscriptionAvailable(BoolData::decode(ba)?))
            }
            PropertyType::ServerKeepAlive => Ok(Self::ServerKeepAlive(U16Data::decode(ba)?)),
            PropertyType::ResponseInformation => {
                Ok(Self::ResponseInformation(StringData::decode(ba)?))
            }
            PropertyType::ServerReference => Ok(Self::ServerReference(StringData::decode(ba)?)),
            PropertyType::TopicAlias => Ok(Self::TopicAlias(U16Data::decode(ba)?)),
            PropertyType::ReasonString => Ok(Self::ReasonString(StringData::decode(ba)?)),
            PropertyType::TopicAliasMaximum => {
                Ok(Self::TopicAliasMaximum(U16Data::decode(ba)?))
            }
            PropertyType::SubscriptionIdentifier => {
                let id = VarInt::decode(ba)?;
                if id.value() == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::SubscriptionIdentifier(id))
            }
        }
    }
}

impl EncodePacket for Property {
    #[allow(clippy::match_same_arms)]
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push(self.property_type() as u8);
        let value_bytes = match self {
            Self::AssignedClientIdentifier(v) => v.encode(buf)?,
            Self::AuthenticationData(v) => v.encode(buf)?,
            Self::AuthenticationMethod(v) => v.encode(buf)?,
            Self::ContentType(v) => v.encode(buf)?,
            Self::CorrelationData(v) => v.encode(buf)?,
            Self::MaximumPacketSize(v) => v.encode(buf)?,
            Self::MaximumQoS(v) => {
                buf.push(u8::from(*v));
                1
            }
            Self::MessageExpiryInterval(v) => v.encode(buf)?,
            Self::PayloadFormatIndicator(v) => v.encode(buf)?,
            Self::ReasonString(v) => v.encode(buf)?,
            Self::ReceiveMaximum(v) => v.encode(buf)?,
            Self::RequestProblemInformation(v) => v.encode(buf)?,
            Self::RequestResponseInformation(v) => v.encode(buf)?,
            Self::ResponseInformation(v) => v.encode(buf)?,
            Self::ResponseTopic(v) => v.encode(buf)?,
            Self::RetainAvailable(v) => v.encode(buf)?,
            Self::ServerKeepAlive(v) => v.encode(buf)?,
            Self::ServerReference(v) => v.encode(buf)?,
            Self::SessionExpiryInterval(v) => v.encode(buf)?,
            Self::SharedSubscriptionAvailable(v) => v.encode(buf)?,
            Self::SubscriptionIdentifier(v) => v.encode(buf)?,
            Self::SubscriptionIdentifierAvailable(v) => v.encode(buf)?,
            Self::TopicAlias(v) => v.encode(buf)?,
            Self::TopicAliasMaximum(v) => v.encode(buf)?,
            Self::UserProperty(v) => v.encode(buf)?,
            Self::WildcardSubscriptionAvailable(v) => v.encode(buf)?,
            Self::WillDelayInterval(v) => v.encode(buf)?,
        };
        Ok(PropertyType::bytes() + value_bytes)
    }
}

/// Ordered list of properties, encoded as a varint length prefix followed
/// by that many bytes of back-to-back TLV pairs. Insertion order survives
/// the round trip; only [`MULTIPLE_PROPERTIES`] types may repeat.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Properties(Vec<Property>);

impl Properties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn props(&self) -> &[Property] {
        &self.0
    }

    pub fn push(&mut self, prop: Property) {
        self.0.push(prop);
    }

    #[must_use]
    pub fn find(&self, ty: PropertyType) -> Option<&Property> {
        self.0.iter().find(|p| p.property_type() == ty)
    }

    /// Validate that every property in the list belongs to `allowed`, and
    /// that no type outside [`MULTIPLE_PROPERTIES`] repeats.
    ///
    /// # Errors
    /// Returns `DecodeError::UnexpectedTokens` on the first violation.
    pub fn check_allowed(&self, allowed: &[PropertyType]) -> Result<(), DecodeError> {
        for property in &self.0 {
            let ty = property.property_type();
            if !allowed.contains(&ty) {
                return Err(DecodeError::UnexpectedTokens);
            }
        }
        for ty in allowed {
            let count = self.0.iter().filter(|p| p.property_type() == *ty).count();
            if count > 1 && !MULTIPLE_PROPERTIES.contains(ty) {
                return Err(DecodeError::UnexpectedTokens);
            }
        }
        Ok(())
    }

    fn payload_bytes(&self) -> usize {
        self.0.iter().map(Property::bytes).sum()
    }

    #[must_use]
    pub fn bytes(&self) -> usize {
        let payload = self.payload_bytes();
        varint_packet_size(payload) + payload
    }
}

impl DecodePacket for Properties {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let mut remaining = VarInt::decode(ba)?.value();
        let mut properties = Vec::new();
        while remaining > 0 {
            let property = Property::decode(ba)?;
            let used = property.bytes();
            remaining = remaining
                .checked_sub(used)
                .ok_or(DecodeError::UnexpectedDataLength)?;
            properties.push(property);
        }
        Ok(Self(properties))
    }
}

impl EncodePacket for Properties {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let payload = self.payload_bytes();
        let mut written = VarInt::from(payload)
            .map_err(|_e| EncodeError::InvalidVarInt)?
            .encode(buf)?;
        for property in &self.0 {
            written += property.encode(buf)?;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_properties_roundtrip() {
        let props = Properties::new();
        let mut buf = Vec::new();
        props.encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0x00]);
        let mut ba = ByteArray::new(&buf);
        assert_eq!(Properties::decode(&mut ba).unwrap(), props);
    }

    #[test]
    fn mixed_properties_roundtrip() {
        let mut props = Properties::new();
        props.push(Property::SessionExpiryInterval(U32Data::new(30)));
        props.push(Property::UserProperty(
            StringPairData::new("k1", "v1").unwrap(),
        ));
        props.push(Property::UserProperty(
            StringPairData::new("k2", "v2").unwrap(),
        ));
        let mut buf = Vec::new();
        props.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(Properties::decode(&mut ba).unwrap(), props);
    }

    #[test]
    fn rejects_duplicate_non_repeatable_property() {
        let mut props = Properties::new();
        props.push(Property::SessionExpiryInterval(U32Data::new(1)));
        props.push(Property::SessionExpiryInterval(U32Data::new(2)));
        assert_eq!(
            props.check_allowed(&[PropertyType::SessionExpiryInterval]),
            Err(DecodeError::UnexpectedTokens)
        );
    }

    #[test]
    fn rejects_zero_subscription_identifier() {
        let buf = vec![0x0b, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            Property::decode(&mut ba),
            Err(DecodeError::InvalidPropertyValue)
        );
    }

    #[test]
    fn rejects_exactly_once_maximum_qos() {
        let buf = vec![0x24, 0x02];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            Property::decode(&mut ba),
            Err(DecodeError::InvalidPropertyValue)
        );
    }
}
