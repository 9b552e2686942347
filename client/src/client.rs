// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The minimal public entry point onto the session core, SPEC_FULL.md's
//! "public client facade": `open`/`publish`/`subscribe`/`unsubscribe`/
//! `close` as plain `async fn`s over the [`Command`] channel, plus a
//! handle to subscribe for [`Notification`]s. Topic filter helpers,
//! auto-resubscription and similar ergonomics stay out of scope (spec.md
//! §1) -- this is the shim that makes the session core an actual crate
//! entry point, nothing more.

use tokio::sync::{broadcast, mpsc, oneshot};

use mqtt_codec::protocol_version::ProtocolVersion;
use mqtt_codec::reason_code::ReasonCode;
use mqtt_codec::subscribe::{SubscribeAckPacket, SubscribeTopic};
use mqtt_codec::unsubscribe::UnsubscribeAckPacket;

use crate::auth::AuthFlow;
use crate::connect_options::ConnectOptions;
use crate::endpoint::Endpoint;
use crate::error::ErrorKind;
use crate::message::{Identity, Message, Will};
use crate::notification::{Notification, Notifier};
use crate::reachability::ReachabilityMonitor;
use crate::retrier::Retrier;
use crate::session::{self, Command, SessionConfig};

/// A client bound to one endpoint and protocol version for its whole
/// lifetime, spec.md §3 "Lifecycle". Cloning shares the same underlying
/// session core -- every clone talks to the same command channel.
#[derive(Clone)]
pub struct Client {
    commands: mpsc::Sender<Command>,
    notifier: Notifier,
}

/// Construction parameters for [`Client::new`], gathering the pieces
/// spec.md §3/§6 requires before a session core can be spawned.
pub struct ClientBuilder {
    endpoint: Endpoint,
    version: ProtocolVersion,
    identity: Identity,
    options: ConnectOptions,
    auth_flow: Option<AuthFlow>,
    retrier: Retrier,
    monitor: Option<Box<dyn ReachabilityMonitor>>,
}

impl ClientBuilder {
    #[must_use]
    pub fn new(endpoint: Endpoint, version: ProtocolVersion, identity: Identity) -> Self {
        Self {
            endpoint,
            version,
            identity,
            options: ConnectOptions::default(),
            auth_flow: None,
            retrier: Retrier::with_policy(crate::retrier::Policy::Equals(std::time::Duration::from_secs(1)), None),
            monitor: None,
        }
    }

    #[must_use]
    pub fn options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn auth_flow(mut self, auth_flow: AuthFlow) -> Self {
        self.auth_flow = Some(auth_flow);
        self
    }

    #[must_use]
    pub fn retrier(mut self, retrier: Retrier) -> Self {
        self.retrier = retrier;
        self
    }

    #[must_use]
    pub fn monitor(mut self, monitor: Box<dyn ReachabilityMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Spawn the session core task and return the facade bound to it.
    /// This does not open a connection -- call [`Client::open`] next.
    #[must_use]
    pub fn build(self) -> Client {
        let notifier = Notifier::new();
        let config = SessionConfig {
            endpoint: self.endpoint,
            version: self.version,
            identity: self.identity,
            options: self.options,
            auth_flow: self.auth_flow,
            retrier: self.retrier,
            monitor: self.monitor,
        };
        let commands = session::spawn(config, notifier.clone());
        Client { commands, notifier }
    }
}

impl Client {
    /// Open the connection: builds and sends CONNECT, and (for v5 with
    /// an `authflow` configured) drives the enhanced-auth handshake,
    /// spec.md §4.7. Resolves once CONNACK (or the auth loop's terminal
    /// CONNACK) is accepted.
    ///
    /// # Errors
    /// `ErrorKind::AlreadyOpened` if called while opening or opened;
    /// otherwise whatever the handshake failed with.
    pub async fn open(&self, clean_start: bool, will: Option<Will>) -> Result<(), ErrorKind> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Open { clean_start, will, reply }).await?;
        rx.await.unwrap_or(Err(ErrorKind::Unconnected))
    }

    /// Publish `message`. Resolves immediately for QoS 0; for QoS 1/2 it
    /// resolves once the flow's terminal acknowledgement arrives, spec.md
    /// §4.8.
    ///
    /// # Errors
    /// `ErrorKind::Unconnected` if not opened; `ErrorKind::PublishFailed`
    /// on a non-success terminal reason code.
    pub async fn publish(&self, message: Message) -> Result<(), ErrorKind> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Publish { message, reply }).await?;
        rx.await.unwrap_or(Err(ErrorKind::Unconnected))
    }

    /// Subscribe to `topics`, resolving with the broker's SUBACK.
    ///
    /// # Errors
    /// `ErrorKind::Unconnected` if not opened.
    pub async fn subscribe(&self, topics: Vec<SubscribeTopic>) -> Result<SubscribeAckPacket, ErrorKind> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Subscribe { topics, reply }).await?;
        rx.await.unwrap_or(Err(ErrorKind::Unconnected))
    }

    /// Unsubscribe from `topics`, resolving with the broker's UNSUBACK.
    ///
    /// # Errors
    /// `ErrorKind::Unconnected` if not opened.
    pub async fn unsubscribe(&self, topics: Vec<String>) -> Result<UnsubscribeAckPacket, ErrorKind> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Unsubscribe { topics, reply }).await?;
        rx.await.unwrap_or(Err(ErrorKind::Unconnected))
    }

    /// Close the connection with `reason_code`, spec.md §4.7. Best-effort
    /// DISCONNECT is sent first; this does not itself trigger a
    /// reconnect.
    ///
    /// # Errors
    /// `ErrorKind::AlreadyClosed` if already closing or closed.
    pub async fn close(&self, reason_code: ReasonCode) -> Result<(), ErrorKind> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Close { reason_code, reply }).await?;
        rx.await.unwrap_or(Err(ErrorKind::Unconnected))
    }

    /// Subscribe to status/message/error notifications, spec.md §6
    /// "Observable surface". Each call gets an independent receiver;
    /// lagging receivers see [`tokio::sync::broadcast::error::RecvError::Lagged`].
    #[must_use]
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    async fn send(&self, command: Command) -> Result<(), ErrorKind> {
        self.commands.send(command).await.map_err(|_| ErrorKind::Unconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_against_an_unreachable_host_resolves_with_an_error() {
        let client = ClientBuilder::new(
            Endpoint::tcp("127.0.0.1"),
            ProtocolVersion::V5,
            Identity::new("test-client"),
        )
        .options(
            ConnectOptions::builder()
                .connect_timeout(std::time::Duration::from_millis(200))
                .build()
                .unwrap(),
        )
        .build();
        let result = client.open(true, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn operations_before_open_fail_unconnected() {
        let client = ClientBuilder::new(Endpoint::tcp("127.0.0.1"), ProtocolVersion::V5, Identity::new("c")).build();
        let result = client
            .publish(Message::new("t", b"hi".to_vec(), mqtt_codec::base::QoS::AtMostOnce))
            .await;
        assert_eq!(result, Err(ErrorKind::Unconnected));
    }
}
