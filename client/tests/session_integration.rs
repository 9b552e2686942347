// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Drives a `Client` against a scripted fake broker over a loopback TCP
//! socket -- the closest stand-in `Transport::connect`'s TCP path allows
//! for a real socket, playing the role a `tokio::io::duplex` pair would
//! in a transport-agnostic harness.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use mqtt_client::{Client, ClientBuilder, ConnectOptions, Endpoint, Identity, Message};
use mqtt_codec::ack::SimpleAck;
use mqtt_codec::base::QoS;
use mqtt_codec::byte_array::ByteArray;
use mqtt_codec::connect_ack::{AckCode, ConnectAckPacket};
use mqtt_codec::packet::Packet;
use mqtt_codec::properties::Properties;
use mqtt_codec::protocol_version::ProtocolVersion;
use mqtt_codec::reason_code::ReasonCode;
use mqtt_codec::subscribe::{SubscribeAckPacket, SubscribeTopic};

async fn read_one(stream: &mut TcpStream) -> Packet {
    let mut buf = Vec::new();
    loop {
        let mut ba = ByteArray::new(&buf);
        match Packet::decode(&mut ba, ProtocolVersion::V5) {
            Ok(packet) => return packet,
            Err(_) => {
                let mut chunk = [0u8; 1024];
                let n = stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "peer closed before a full frame arrived");
                buf.extend_from_slice(&chunk[..n]);
            }
        }
    }
}

async fn write_one(stream: &mut TcpStream, packet: &Packet) {
    let mut buf = Vec::new();
    packet.encode(&mut buf, ProtocolVersion::V5).unwrap();
    stream.write_all(&buf).await.unwrap();
}

fn connack(session_present: bool) -> Packet {
    Packet::ConnectAck(ConnectAckPacket {
        session_present,
        reason_code: AckCode::V5(ReasonCode::Success),
        properties: Properties::new(),
    })
}

#[tokio::test]
async fn open_completes_once_connack_arrives() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let connect = read_one(&mut stream).await;
        assert!(matches!(connect, Packet::Connect(_)));
        write_one(&mut stream, &connack(false)).await;
        stream
    });

    let mut endpoint = Endpoint::tcp("127.0.0.1");
    if let Endpoint::Tcp { port: p, .. } = &mut endpoint {
        *p = port;
    }
    let client = ClientBuilder::new(endpoint, ProtocolVersion::V5, Identity::new("test-open"))
        .options(ConnectOptions::builder().connect_timeout(Duration::from_secs(2)).build().unwrap())
        .build();

    client.open(true, None).await.unwrap();
    broker.await.unwrap();
}

#[tokio::test]
async fn publish_qos1_resolves_once_puback_arrives() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _connect = read_one(&mut stream).await;
        write_one(&mut stream, &connack(false)).await;

        let publish = read_one(&mut stream).await;
        let Packet::Publish(publish) = publish else { panic!("expected PUBLISH") };
        let id = publish.packet_id.unwrap();
        write_one(&mut stream, &Packet::PublishAck(SimpleAck::new(id))).await;
        stream
    });

    let mut endpoint = Endpoint::tcp("127.0.0.1");
    if let Endpoint::Tcp { port: p, .. } = &mut endpoint {
        *p = port;
    }
    let client = ClientBuilder::new(endpoint, ProtocolVersion::V5, Identity::new("test-publish"))
        .options(ConnectOptions::builder().connect_timeout(Duration::from_secs(2)).build().unwrap())
        .build();
    client.open(true, None).await.unwrap();

    let message = Message::new("a/b", b"hello".to_vec(), QoS::AtLeastOnce);
    client.publish(message).await.unwrap();
    broker.await.unwrap();
}

#[tokio::test]
async fn subscribe_resolves_with_the_brokers_suback() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _connect = read_one(&mut stream).await;
        write_one(&mut stream, &connack(false)).await;

        let subscribe = read_one(&mut stream).await;
        let Packet::Subscribe(subscribe) = subscribe else { panic!("expected SUBSCRIBE") };
        let ack = SubscribeAckPacket::new(subscribe.packet_id, vec![ReasonCode::GrantedQoS1]);
        write_one(&mut stream, &Packet::SubscribeAck(ack)).await;
        stream
    });

    let mut endpoint = Endpoint::tcp("127.0.0.1");
    if let Endpoint::Tcp { port: p, .. } = &mut endpoint {
        *p = port;
    }
    let client = ClientBuilder::new(endpoint, ProtocolVersion::V5, Identity::new("test-subscribe"))
        .options(ConnectOptions::builder().connect_timeout(Duration::from_secs(2)).build().unwrap())
        .build();
    client.open(true, None).await.unwrap();

    let ack = client
        .subscribe(vec![SubscribeTopic::new("a/b", QoS::AtLeastOnce)])
        .await
        .unwrap();
    assert_eq!(ack.reason_codes, vec![ReasonCode::GrantedQoS1]);
    broker.await.unwrap();
}

#[tokio::test]
async fn an_unsolicited_publish_reaches_the_notification_channel() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _connect = read_one(&mut stream).await;
        write_one(&mut stream, &connack(false)).await;

        let mut publish = mqtt_codec::publish::PublishPacket::new("news", QoS::AtMostOnce, b"hi".to_vec()).unwrap();
        publish.packet_id = None;
        write_one(&mut stream, &Packet::Publish(publish)).await;
        stream
    });

    let mut endpoint = Endpoint::tcp("127.0.0.1");
    if let Endpoint::Tcp { port: p, .. } = &mut endpoint {
        *p = port;
    }
    let client = ClientBuilder::new(endpoint, ProtocolVersion::V5, Identity::new("test-notify"))
        .options(ConnectOptions::builder().connect_timeout(Duration::from_secs(2)).build().unwrap())
        .build();
    let mut notifications = client.notifications();
    client.open(true, None).await.unwrap();

    loop {
        match notifications.recv().await.unwrap() {
            mqtt_client::Notification::Message(message) => {
                assert_eq!(message.topic, "news");
                break;
            }
            _ => continue,
        }
    }
    broker.await.unwrap();
}
