// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use mqtt_codec::base::QoS;
use mqtt_codec::properties::Properties;

/// Client identifier plus optional credentials. `client_id` is mutable:
/// the broker may replace it via the v5 `assignedClientIdentifier`
/// property on CONNACK.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identity {
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
}

impl Identity {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            username: None,
            password: None,
        }
    }
}

/// Application payload, independent of wire framing -- the shape both
/// outbound `publish()` callers and inbound message observers see.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
    pub properties: Properties,
}

impl Message {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: Vec<u8>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            payload,
            qos,
            retain: false,
            dup: false,
            properties: Properties::new(),
        }
    }
}

/// Will message pre-registered in CONNECT, published by the broker on
/// abnormal disconnect.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Will {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
    pub properties: Properties,
}

/// Session parameters negotiated on CONNACK, spec.md §3.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectParams {
    pub max_qos: QoS,
    pub max_packet_size: Option<u32>,
    pub retain_available: bool,
    pub max_topic_alias: u16,
    pub server_keep_alive: Option<u16>,
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self {
            max_qos: QoS::ExactlyOnce,
            max_packet_size: None,
            retain_available: true,
            max_topic_alias: 65535,
            server_keep_alive: None,
        }
    }
}
