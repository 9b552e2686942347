// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Bit-exact encoder/decoder for MQTT 3.1.1 and MQTT 5.0 control packets.
//!
//! This crate has no I/O and no async runtime dependency: it operates
//! purely on byte slices (via [`byte_array::ByteArray`]) and the in-memory
//! [`packet::Packet`] representation. The `mqtt-client` crate layers
//! transport framing, session lifecycle and retry policy on top of it.

pub mod ack;
pub mod auth;
pub mod base;
pub mod binary_data;
pub mod bool_data;
pub mod byte_array;
pub mod connect;
pub mod connect_ack;
pub mod connect_flags;
pub mod disconnect;
pub mod error;
pub mod header;
pub mod keep_alive;
pub mod packet;
pub mod ping;
pub mod properties;
pub mod protocol_version;
pub mod publish;
pub mod reason_code;
pub mod string_data;
pub mod string_pair_data;
pub mod subscribe;
pub mod u16_data;
pub mod u32_data;
pub mod unsubscribe;
pub mod utils;
pub mod var_int;

pub use ack::SimpleAck;
pub use auth::AuthPacket;
pub use base::{DecodePacket, EncodePacket, PacketId, QoS};
pub use connect::{ConnectPacket, Will};
pub use connect_ack::{AckCode, ConnectAckPacket};
pub use connect_flags::ConnectFlags;
pub use disconnect::DisconnectPacket;
pub use error::{DecodeError, EncodeError};
pub use header::{FixedHeader, PacketType};
pub use packet::Packet;
pub use properties::{Properties, Property, PropertyType};
pub use protocol_version::ProtocolVersion;
pub use publish::PublishPacket;
pub use reason_code::{ConnectReturnCode, ReasonCode};
pub use subscribe::{RetainHandling, SubscribeAckPacket, SubscribePacket, SubscribeTopic};
pub use unsubscribe::{UnsubscribeAckPacket, UnsubscribePacket};
pub use var_int::{varint_packet_size, VarInt, MAX_VARINT};
