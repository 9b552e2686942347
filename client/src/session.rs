// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The session core, spec.md §4: a single actor task that owns the
//! transport, both task tables, the inflight table, the pinger and the
//! retrier. Every connection operation -- open, publish, subscribe,
//! unsubscribe, close -- is a [`Command`] sent over an `mpsc` channel and
//! answered on a `oneshot`; this is the one mutex the whole client has,
//! realised as "nothing else touches this state" rather than a lock.

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::sleep;

use mqtt_codec::ack::SimpleAck;
use mqtt_codec::auth::AuthPacket;
use mqtt_codec::base::QoS;
use mqtt_codec::connect::ConnectPacket;
use mqtt_codec::connect::Will as WireWill;
use mqtt_codec::connect_ack::AckCode;
use mqtt_codec::disconnect::DisconnectPacket;
use mqtt_codec::packet::Packet;
use mqtt_codec::properties::{Properties, Property, PropertyType};
use mqtt_codec::protocol_version::ProtocolVersion;
use mqtt_codec::publish::PublishPacket;
use mqtt_codec::reason_code::ReasonCode;
use mqtt_codec::subscribe::{SubscribeAckPacket, SubscribePacket, SubscribeTopic};
use mqtt_codec::unsubscribe::{UnsubscribeAckPacket, UnsubscribePacket};

use crate::auth::AuthFlow;
use crate::connect_options::ConnectOptions;
use crate::endpoint::Endpoint;
use crate::error::ErrorKind;
use crate::id_pool::IdentifierPool;
use crate::inflight::{InflightState, InflightTable};
use crate::message::{ConnectParams, Identity, Message, Will};
use crate::notification::{Notification, Notifier};
use crate::pinger::{PingAction, Pinger};
use crate::reachability::{NetworkStatus, ReachabilityMonitor};
use crate::retrier::Retrier;
use crate::status::{CloseReason, Status};
use crate::task_table::TaskTable;
use crate::transport::Transport;

/// A request the public facade sends to the session core.
pub enum Command {
    Open {
        clean_start: bool,
        will: Option<Will>,
        reply: oneshot::Sender<Result<(), ErrorKind>>,
    },
    Close {
        reason_code: ReasonCode,
        reply: oneshot::Sender<Result<(), ErrorKind>>,
    },
    Publish {
        message: Message,
        reply: oneshot::Sender<Result<(), ErrorKind>>,
    },
    Subscribe {
        topics: Vec<SubscribeTopic>,
        reply: oneshot::Sender<Result<SubscribeAckPacket, ErrorKind>>,
    },
    Unsubscribe {
        topics: Vec<String>,
        reply: oneshot::Sender<Result<UnsubscribeAckPacket, ErrorKind>>,
    },
}

/// Fixed parameters the session core is built with and never changes
/// across reconnects.
pub struct SessionConfig {
    pub endpoint: Endpoint,
    pub version: ProtocolVersion,
    pub identity: Identity,
    pub options: ConnectOptions,
    pub auth_flow: Option<AuthFlow>,
    pub retrier: Retrier,
    pub monitor: Option<Box<dyn ReachabilityMonitor>>,
}

/// Spawn the session core task, returning the command channel the
/// facade sends through.
#[must_use]
pub fn spawn(config: SessionConfig, notifier: Notifier) -> mpsc::Sender<Command> {
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(async move {
        let mut core = SessionCore::new(config, notifier, rx);
        core.run().await;
    });
    tx
}

struct SessionCore {
    endpoint: Endpoint,
    version: ProtocolVersion,
    identity: Identity,
    options: ConnectOptions,
    auth_flow: Option<AuthFlow>,
    retrier: Retrier,
    monitor: Option<Box<dyn ReachabilityMonitor>>,
    notifier: Notifier,
    commands: mpsc::Receiver<Command>,

    status: Status,
    transport: Option<Transport>,
    tasks: TaskTable,
    inflight: InflightTable,
    ids: IdentifierPool,
    pinger: Option<Pinger>,
    connect_params: ConnectParams,
    pending_will: Option<Will>,
    pending_clean_start: bool,
    open_reply: Option<oneshot::Sender<Result<(), ErrorKind>>>,
    close_reply: Option<oneshot::Sender<Result<(), ErrorKind>>>,
    reconnect_at: Option<Instant>,
    connect_deadline: Option<Instant>,
    monitor_rx: Option<watch::Receiver<NetworkStatus>>,
    has_opened_once: bool,
}

impl SessionCore {
    fn new(config: SessionConfig, notifier: Notifier, commands: mpsc::Receiver<Command>) -> Self {
        let monitor_rx = config.monitor.as_deref().map(ReachabilityMonitor::subscribe);
        Self {
            endpoint: config.endpoint,
            version: config.version,
            identity: config.identity,
            options: config.options,
            auth_flow: config.auth_flow,
            retrier: config.retrier,
            monitor: config.monitor,
            notifier,
            commands,
            status: Status::default(),
            transport: None,
            tasks: TaskTable::new(),
            inflight: InflightTable::new(),
            ids: IdentifierPool::new(),
            pinger: None,
            connect_params: ConnectParams::default(),
            pending_will: None,
            pending_clean_start: true,
            open_reply: None,
            close_reply: None,
            reconnect_at: None,
            connect_deadline: None,
            monitor_rx,
            has_opened_once: false,
        }
    }

    async fn run(&mut self) {
        loop {
            let ping_deadline = self
                .pinger
                .as_ref()
                .map_or(Duration::from_secs(3600), Pinger::next_deadline);
            let reconnect_deadline = self
                .reconnect_at
                .map_or(Duration::from_secs(3600), |at| at.saturating_duration_since(Instant::now()));
            let retransmit_deadline = self.inflight.earliest_deadline().map_or(Duration::from_secs(3600), |at| {
                at.saturating_duration_since(Instant::now())
            });
            let connect_deadline = self
                .connect_deadline
                .map_or(Duration::from_secs(3600), |at| at.saturating_duration_since(Instant::now()));

            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            self.teardown(CloseReason::ClientClose(ReasonCode::Success)).await;
                            return;
                        }
                    }
                }
                result = async {
                    match self.transport.as_mut() {
                        Some(t) => t.recv_packet(self.version).await,
                        None => std::future::pending::<Result<Packet, ErrorKind>>().await,
                    }
                }, if self.transport.is_some() => {
                    self.handle_transport_result(result).await;
                }
                () = sleep(ping_deadline), if self.status.is_opened() && self.options.ping_enabled() => {
                    self.handle_ping_tick().await;
                }
                () = sleep(reconnect_deadline), if self.reconnect_at.is_some() => {
                    self.reconnect_at = None;
                    self.reconnect_now().await;
                }
                () = sleep(retransmit_deadline), if self.status.is_opened() => {
                    self.handle_retransmit_tick().await;
                }
                () = sleep(connect_deadline), if self.connect_deadline.is_some() => {
                    self.connect_deadline = None;
                    self.fail_open(ErrorKind::Timeout).await;
                }
                status = async {
                    match self.monitor_rx.as_mut() {
                        Some(rx) => {
                            let _ = rx.changed().await;
                            Some(*rx.borrow())
                        }
                        None => std::future::pending::<Option<NetworkStatus>>().await,
                    }
                }, if self.monitor_rx.is_some() => {
                    if let Some(status) = status {
                        self.handle_reachability_change(status).await;
                    }
                }
            }
        }
    }

    // -- command handling ------------------------------------------------

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Open { clean_start, will, reply } => self.handle_open(clean_start, will, reply).await,
            Command::Close { reason_code, reply } => self.handle_close(reason_code, reply).await,
            Command::Publish { message, reply } => self.handle_publish(message, reply).await,
            Command::Subscribe { topics, reply } => self.handle_subscribe(topics, reply).await,
            Command::Unsubscribe { topics, reply } => self.handle_unsubscribe(topics, reply).await,
        }
    }

    async fn handle_open(
        &mut self,
        clean_start: bool,
        will: Option<Will>,
        reply: oneshot::Sender<Result<(), ErrorKind>>,
    ) {
        if !self.status.is_closed() {
            let _ = reply.send(Err(ErrorKind::AlreadyOpened));
            return;
        }
        self.pending_clean_start = clean_start;
        self.pending_will = will;
        self.open_reply = Some(reply);
        self.has_opened_once = true;
        self.attempt_open().await;
    }

    /// Rebuild CONNECT for a reconnect, spec.md §4.7: `cleanSession =
    /// false` so the broker resumes the session, and the will cleared so
    /// an abnormal disconnect doesn't re-publish it on every retry.
    async fn reconnect_now(&mut self) {
        self.pending_clean_start = false;
        self.pending_will = None;
        self.attempt_open().await;
    }

    /// The keep-alive interval actually in force: the broker's
    /// `serverKeepAlive` override from a prior CONNACK, or the configured
    /// default if none was negotiated yet, spec.md §4.7.
    fn effective_keep_alive(&self) -> Duration {
        self.connect_params
            .server_keep_alive
            .map_or(self.options.keep_alive(), |secs| Duration::from_secs(u64::from(secs)))
    }

    async fn attempt_open(&mut self) {
        self.set_status(Status::Opening);
        match Transport::connect(
            &self.endpoint,
            self.options.connect_timeout(),
            self.options.ping_enabled(),
            self.effective_keep_alive(),
        )
        .await
        {
            Ok(transport) => {
                self.transport = Some(transport);
                self.connect_deadline = Some(Instant::now() + self.options.connect_timeout());
                if let Err(err) = self.send_connect().await {
                    self.fail_open(err).await;
                }
            }
            Err(err) => self.fail_open(err).await,
        }
    }

    async fn send_connect(&mut self) -> Result<(), ErrorKind> {
        let mut packet = ConnectPacket::new(self.version, &self.identity.client_id)
            .map_err(ErrorKind::from)?;
        packet.keep_alive = u16::try_from(self.effective_keep_alive().as_secs()).unwrap_or(u16::MAX);
        packet.clean_start = self.pending_clean_start;
        packet.username = self.identity.username.clone();
        packet.password = self.identity.password.clone();
        packet.will = self.pending_will.as_ref().map(|will| WireWill {
            properties: will.properties.clone(),
            topic: will.topic.clone(),
            payload: will.payload.clone(),
            qos: will.qos,
            retain: will.retain,
        });

        let (tx, rx) = oneshot::channel();
        self.tasks.set_connect(tx);
        self.write_packet(&Packet::Connect(packet)).await?;

        let _ = rx; // resolved from handle_transport_result via resolve_connect
        Ok(())
    }

    async fn handle_close(&mut self, reason_code: ReasonCode, reply: oneshot::Sender<Result<(), ErrorKind>>) {
        if self.status.is_closed() {
            let _ = reply.send(Err(ErrorKind::AlreadyClosed));
            return;
        }
        self.close_reply = Some(reply);
        if self.status.is_opening() {
            // spec.md §4.7: closing while still opening skips the
            // best-effort DISCONNECT (there is no opened connection to
            // send it over) and tears down immediately.
            self.teardown(CloseReason::ClientClose(reason_code)).await;
            return;
        }
        self.set_status(Status::Closing);
        let disconnect = DisconnectPacket::with_reason(reason_code);
        let _ = self.write_packet(&Packet::Disconnect(disconnect)).await;
        self.teardown(CloseReason::ClientClose(reason_code)).await;
    }

    /// Validate a QoS >= 0 publish against the negotiated `ConnectParams`,
    /// spec.md §4.8: max QoS, retain availability, topic alias bounds, a
    /// present topic, and (v5) no subscription-identifier property on an
    /// outgoing publish -- that property is broker-to-client only.
    fn validate_outbound_publish(&self, message: &Message) -> Result<(), crate::error::PacketError> {
        use crate::error::PacketError;
        if message.topic.is_empty() {
            return Err(PacketError::MissingTopic);
        }
        if message.qos > self.connect_params.max_qos {
            return Err(PacketError::QoSAboveMax);
        }
        if message.retain && !self.connect_params.retain_available {
            return Err(PacketError::RetainUnavailable);
        }
        if let Some(Property::TopicAlias(alias)) = message.properties.find(PropertyType::TopicAlias) {
            if alias.value() == 0 || alias.value() > self.connect_params.max_topic_alias {
                return Err(PacketError::TopicAliasOutOfRange);
            }
        }
        if message.properties.find(PropertyType::SubscriptionIdentifier).is_some() {
            return Err(PacketError::SubscriptionIdentifierInOutgoingPublish);
        }
        Ok(())
    }

    async fn handle_publish(&mut self, message: Message, reply: oneshot::Sender<Result<(), ErrorKind>>) {
        if !self.status.is_opened() {
            let _ = reply.send(Err(ErrorKind::Unconnected));
            return;
        }
        if let Err(err) = self.validate_outbound_publish(&message) {
            let _ = reply.send(Err(ErrorKind::PacketError(err)));
            return;
        }

        let mut publish = match PublishPacket::new(&message.topic, message.qos, message.payload.clone()) {
            Ok(p) => p,
            Err(e) => {
                let _ = reply.send(Err(ErrorKind::from(e)));
                return;
            }
        };
        publish.retain = message.retain;
        publish.properties = message.properties.clone();

        match message.qos {
            QoS::AtMostOnce => {
                if self.write_packet(&Packet::Publish(publish)).await.is_err() {
                    let _ = reply.send(Err(ErrorKind::Unconnected));
                    return;
                }
                let _ = reply.send(Ok(()));
            }
            QoS::AtLeastOnce | QoS::ExactlyOnce => {
                let id = self.ids.next();
                publish.packet_id = Some(id);
                let state = if message.qos == QoS::AtLeastOnce {
                    InflightState::AwaitingPubAck
                } else {
                    InflightState::AwaitingPubRec
                };
                let deadline = Instant::now() + self.options.publish_timeout();
                self.inflight
                    .insert_outbound(id, Packet::Publish(publish.clone()), state, deadline);
                let (tx, rx) = oneshot::channel();
                self.tasks.insert_active(id, tx);
                forward_typed(rx, reply, publish_outcome);
                if self.write_packet(&Packet::Publish(publish)).await.is_err() {
                    self.inflight.remove_outbound(id);
                    self.tasks.resolve_active(id, Err(ErrorKind::Unconnected));
                }
            }
        }
    }

    async fn handle_subscribe(
        &mut self,
        topics: Vec<SubscribeTopic>,
        reply: oneshot::Sender<Result<SubscribeAckPacket, ErrorKind>>,
    ) {
        if !self.status.is_opened() {
            let _ = reply.send(Err(ErrorKind::Unconnected));
            return;
        }
        let id = self.ids.next();
        let packet = SubscribePacket::new(id, topics);
        let (tx, rx) = oneshot::channel();
        self.tasks.insert_active(id, tx);
        if self.write_packet(&Packet::Subscribe(packet)).await.is_err() {
            self.tasks.resolve_active(id, Err(ErrorKind::Unconnected));
        }
        forward_typed(rx, reply, |p| match p {
            Packet::SubscribeAck(ack) => Ok(ack),
            _ => Err(ErrorKind::UnexpectPacket),
        });
    }

    async fn handle_unsubscribe(
        &mut self,
        topics: Vec<String>,
        reply: oneshot::Sender<Result<UnsubscribeAckPacket, ErrorKind>>,
    ) {
        if !self.status.is_opened() {
            let _ = reply.send(Err(ErrorKind::Unconnected));
            return;
        }
        let id = self.ids.next();
        let packet = UnsubscribePacket::new(id, topics);
        let (tx, rx) = oneshot::channel();
        self.tasks.insert_active(id, tx);
        if self.write_packet(&Packet::Unsubscribe(packet)).await.is_err() {
            self.tasks.resolve_active(id, Err(ErrorKind::Unconnected));
        }
        forward_typed(rx, reply, |p| match p {
            Packet::UnsubscribeAck(ack) => Ok(ack),
            _ => Err(ErrorKind::UnexpectPacket),
        });
    }

    // -- transport-driven events ------------------------------------------

    async fn handle_transport_result(&mut self, result: Result<Packet, ErrorKind>) {
        match result {
            Ok(packet) => self.handle_incoming(packet).await,
            Err(err) => self.handle_transport_error(err).await,
        }
    }

    async fn handle_transport_error(&mut self, err: ErrorKind) {
        let report = match &err {
            ErrorKind::NetworkError(kind) => self
                .transport
                .as_mut()
                .is_none_or(|t| t.note_network_error(*kind)),
            _ => true,
        };
        if !report {
            return;
        }
        self.notifier.notify(Notification::Error(err.clone()));
        self.teardown(CloseReason::TransportError(err)).await;
    }

    /// spec.md §4.9 ties PINGREQ suppression to bytes *sent*, so only
    /// `write_packet` updates the pinger's activity clock -- inbound
    /// traffic must not defer a PINGREQ that's otherwise due.
    async fn handle_incoming(&mut self, packet: Packet) {
        match packet {
            Packet::ConnectAck(ack) => self.handle_connack(ack).await,
            Packet::Auth(auth) => self.handle_auth(auth).await,
            Packet::PingResponse => {
                if let Some(pinger) = &mut self.pinger {
                    pinger.record_pong(Instant::now());
                }
                self.tasks.resolve_ping(Ok(Packet::PingResponse));
            }
            Packet::PublishAck(ack) => {
                self.inflight.remove_outbound(ack.packet_id);
                self.tasks.resolve_active(ack.packet_id, Ok(Packet::PublishAck(ack)));
            }
            Packet::PublishReceived(ack) => self.handle_pubrec(ack).await,
            Packet::PublishRelease(ack) => self.handle_pubrel(ack).await,
            Packet::PublishComplete(ack) => {
                self.inflight.remove_outbound(ack.packet_id);
                self.tasks.resolve_active(ack.packet_id, Ok(Packet::PublishComplete(ack)));
            }
            Packet::SubscribeAck(ack) => {
                self.tasks.resolve_active(ack.packet_id, Ok(Packet::SubscribeAck(ack)));
            }
            Packet::UnsubscribeAck(ack) => {
                self.tasks.resolve_active(ack.packet_id, Ok(Packet::UnsubscribeAck(ack)));
            }
            Packet::Publish(publish) => self.handle_publish_from_broker(publish).await,
            Packet::Disconnect(disconnect) => {
                self.notifier
                    .notify(Notification::Error(ErrorKind::ServerClose(disconnect.reason_code)));
                self.teardown(CloseReason::ServerClose(disconnect.reason_code)).await;
            }
            Packet::Connect(_) | Packet::Subscribe(_) | Packet::Unsubscribe(_) | Packet::PingRequest => {
                // A client never receives these; drop silently.
            }
        }
    }

    async fn handle_connack(&mut self, ack: mqtt_codec::connect_ack::ConnectAckPacket) {
        if !ack.is_success() {
            let code = match ack.reason_code {
                AckCode::V311(code) => crate::error::ConnectFailureCode::V311(code),
                AckCode::V5(code) => crate::error::ConnectFailureCode::V5(code),
            };
            self.fail_open(ErrorKind::ConnectFailed(Some(code))).await;
            return;
        }
        self.connect_deadline = None;
        self.apply_connect_params(&ack.properties);
        self.pinger = Some(Pinger::new(self.effective_keep_alive(), self.options.ping_timeout(), Instant::now()));
        self.retrier.reset();
        self.set_status(Status::Opened);
        if ack.session_present {
            let deadline = Instant::now() + self.options.publish_timeout();
            for (id, packet) in self.inflight.outbound_packets_for_resend() {
                let resend = mark_dup(packet);
                let _ = self.write_packet(&resend).await;
                self.inflight.refresh_outbound_deadline(id, deadline);
            }
        } else {
            self.inflight.clear();
        }
        if let Some(reply) = self.open_reply.take() {
            let _ = reply.send(Ok(()));
        }
        self.tasks.resolve_connect(Ok(Packet::ConnectAck(ack)));
    }

    fn apply_connect_params(&mut self, properties: &Properties) {
        if let Some(Property::AssignedClientIdentifier(id)) = properties.find(PropertyType::AssignedClientIdentifier) {
            self.identity.client_id = id.as_ref().to_string();
        }
        if let Some(Property::ServerKeepAlive(v)) = properties.find(PropertyType::ServerKeepAlive) {
            self.connect_params.server_keep_alive = Some(v.value());
        }
        if let Some(Property::TopicAliasMaximum(v)) = properties.find(PropertyType::TopicAliasMaximum) {
            self.connect_params.max_topic_alias = v.value();
        }
        if let Some(Property::RetainAvailable(v)) = properties.find(PropertyType::RetainAvailable) {
            self.connect_params.retain_available = v.value();
        }
        if let Some(Property::MaximumQoS(qos)) = properties.find(PropertyType::MaximumQoS) {
            self.connect_params.max_qos = *qos;
        }
        if let Some(Property::MaximumPacketSize(v)) = properties.find(PropertyType::MaximumPacketSize) {
            self.connect_params.max_packet_size = Some(v.value());
        }
    }

    async fn handle_auth(&mut self, auth: AuthPacket) {
        if self.status.is_opening() {
            // Enhanced-auth continuation during the initial handshake.
            if let Some(flow) = self.auth_flow.clone() {
                let reply = flow(auth).await;
                let _ = self.write_packet(&Packet::Auth(reply)).await;
            } else {
                self.fail_open(ErrorKind::AuthflowRequired).await;
            }
        } else {
            // Broker-initiated re-authentication: there is no pending
            // local caller to resolve, so a missing authflow surfaces
            // through the error observer instead (spec.md §7).
            if let Some(flow) = self.auth_flow.clone() {
                let reply = flow(auth).await;
                let _ = self.write_packet(&Packet::Auth(reply)).await;
            } else {
                self.notifier.notify(Notification::Error(ErrorKind::AuthflowRequired));
            }
        }
    }

    async fn handle_pubrec(&mut self, ack: SimpleAck) {
        if !ack.reason_code.is_success() {
            self.inflight.remove_outbound(ack.packet_id);
            self.tasks
                .resolve_active(ack.packet_id, Ok(Packet::PublishReceived(ack.clone())));
            return;
        }
        let deadline = Instant::now() + self.options.publish_timeout();
        if !self
            .inflight
            .advance_outbound(ack.packet_id, InflightState::AwaitingPubComp, deadline)
        {
            // No outstanding PUBLISH for this identifier; v5 requires a
            // PUBREL naming it not-found, v3.1.1 drops it silently.
            if self.version.is_v5() {
                let pubrel = SimpleAck::with_reason(ack.packet_id, ReasonCode::PacketIdentifierNotFound);
                let _ = self.write_packet(&Packet::PublishRelease(pubrel)).await;
            }
            return;
        }
        let pubrel = SimpleAck::new(ack.packet_id);
        self.inflight.insert_outbound(
            ack.packet_id,
            Packet::PublishRelease(pubrel.clone()),
            InflightState::AwaitingPubComp,
            deadline,
        );
        let _ = self.write_packet(&Packet::PublishRelease(pubrel)).await;
    }

    async fn handle_pubrel(&mut self, ack: SimpleAck) {
        if let Some(packet) = self.inflight.remove_inbound(ack.packet_id) {
            if let Packet::Publish(publish) = packet {
                self.notifier.notify(Notification::Message(to_message(publish)));
            }
            let pubcomp = SimpleAck::new(ack.packet_id);
            let _ = self.write_packet(&Packet::PublishComplete(pubcomp)).await;
        } else if self.version.is_v5() {
            let pubcomp = SimpleAck::with_reason(ack.packet_id, ReasonCode::PacketIdentifierNotFound);
            let _ = self.write_packet(&Packet::PublishComplete(pubcomp)).await;
        }
    }

    async fn handle_publish_from_broker(&mut self, publish: PublishPacket) {
        match publish.qos {
            QoS::AtMostOnce => {
                self.notifier.notify(Notification::Message(to_message(publish)));
            }
            QoS::AtLeastOnce => {
                let Some(id) = publish.packet_id else { return };
                self.notifier.notify(Notification::Message(to_message(publish)));
                let puback = SimpleAck::new(id);
                let _ = self.write_packet(&Packet::PublishAck(puback)).await;
            }
            QoS::ExactlyOnce => {
                let Some(id) = publish.packet_id else { return };
                if self.inflight.is_duplicate_inbound(id) {
                    // Duplicate before the broker's PUBREL arrived: just
                    // re-send PUBREC, don't re-notify observers.
                    let pubrec = SimpleAck::new(id);
                    let _ = self.write_packet(&Packet::PublishReceived(pubrec)).await;
                    return;
                }
                let deadline = Instant::now() + self.options.publish_timeout();
                self.inflight
                    .insert_inbound(id, Packet::Publish(publish), InflightState::AwaitingPubRel, deadline);
                let pubrec = SimpleAck::new(id);
                let _ = self.write_packet(&Packet::PublishReceived(pubrec)).await;
            }
        }
    }

    async fn handle_ping_tick(&mut self) {
        let Some(pinger) = &mut self.pinger else { return };
        match pinger.poll(Instant::now()) {
            PingAction::Idle => {}
            PingAction::SendPing => {
                let (tx, _rx) = oneshot::channel();
                self.tasks.set_ping(tx);
                let _ = self.write_packet(&Packet::PingRequest).await;
            }
            PingAction::TimedOut => {
                self.teardown(CloseReason::PingTimeout).await;
            }
        }
    }

    /// React to an OS-level reachability transition, spec.md §4.7 and
    /// §4.11. `unavailable -> available` while not opened/opening
    /// triggers an immediate reconnect (bypassing the retrier, which
    /// never gets consulted for this path); `available -> unavailable`
    /// while opened closes with `NetworkUnavailable`.
    async fn handle_reachability_change(&mut self, status: NetworkStatus) {
        if status.is_available() {
            if self.has_opened_once && !self.status.is_opened() && !self.status.is_opening() {
                self.reconnect_at = None;
                self.reconnect_now().await;
            }
        } else if self.status.is_opened() {
            self.teardown(CloseReason::NetworkUnavailable).await;
        }
    }

    /// Re-send whatever step of each QoS >= 1 flow is currently pending
    /// once its `publish_timeout` elapses, spec.md §4.8: outbound
    /// PUBLISH/PUBREL are re-sent verbatim (no dup bit -- that's reserved
    /// for session-resumption resends, §4.7), and inbound QoS 2 flows
    /// still awaiting PUBREL get their PUBREC re-sent.
    async fn handle_retransmit_tick(&mut self) {
        let now = Instant::now();
        let publish_timeout = self.options.publish_timeout();
        for (_, packet) in self.inflight.resend_due_outbound(now, publish_timeout) {
            let _ = self.write_packet(&packet).await;
        }
        for id in self.inflight.resend_due_inbound(now, publish_timeout) {
            let pubrec = SimpleAck::new(id);
            let _ = self.write_packet(&Packet::PublishReceived(pubrec)).await;
        }
    }

    // -- shared plumbing ---------------------------------------------------

    async fn write_packet(&mut self, packet: &Packet) -> Result<(), ErrorKind> {
        let Some(transport) = &mut self.transport else {
            return Err(ErrorKind::Unconnected);
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf, self.version).map_err(ErrorKind::from)?;
        let result = transport.send(&buf).await;
        if result.is_ok() {
            self.record_activity();
        } else if let Err(ErrorKind::NetworkError(kind)) = &result {
            let report = transport.note_network_error(*kind);
            if report {
                let err = result.clone().unwrap_err();
                self.notifier.notify(Notification::Error(err.clone()));
                self.teardown(CloseReason::TransportError(err)).await;
            }
        }
        result
    }

    fn record_activity(&mut self) {
        if let Some(pinger) = &mut self.pinger {
            pinger.record_activity(Instant::now());
        }
    }

    fn set_status(&mut self, new: Status) {
        let old = std::mem::replace(&mut self.status, new.clone());
        if old != new {
            self.notifier.notify(Notification::StatusChanged { old, new });
        }
    }

    async fn fail_open(&mut self, err: ErrorKind) {
        if let Some(reply) = self.open_reply.take() {
            let _ = reply.send(Err(err.clone()));
        }
        self.teardown(CloseReason::ProtocolError(err)).await;
    }

    /// Tear down the current connection: drop the transport, clear both
    /// task tables with `reason`, drop the pinger, and either resolve the
    /// pending close or schedule a reconnect, spec.md §4.7.
    async fn teardown(&mut self, reason: CloseReason) {
        if self.status.is_closed() {
            // Already torn down -- e.g. `write_packet` observed the same
            // network failure before this call site did. Avoid acting
            // twice (in particular, scheduling a second reconnect).
            return;
        }
        self.transport = None;
        self.pinger = None;
        self.connect_deadline = None;
        self.tasks.clear_all(close_reason_error(&reason));
        self.set_status(Status::Closed(Some(reason.clone())));

        if let Some(reply) = self.close_reply.take() {
            let _ = reply.send(Ok(()));
            return;
        }

        let available = self.monitor.as_deref().map_or(true, |m| m.status().is_available());
        if available {
            if let Some(delay) = self.retrier.delay(&reason) {
                // Scheduled, not awaited here: recursing back into
                // `attempt_open` from within `teardown` would let a
                // reconnect race an in-flight caller still unwinding
                // through this same close (spec.md §4.10). The run loop
                // picks this deadline up on its next iteration.
                self.reconnect_at = Some(Instant::now() + delay);
            }
        }
    }
}

fn close_reason_error(reason: &CloseReason) -> ErrorKind {
    match reason {
        CloseReason::PingTimeout => ErrorKind::Timeout,
        CloseReason::NetworkUnavailable => ErrorKind::NetworkError(crate::error::NetworkErrorKind::NetworkDown),
        CloseReason::ServerClose(code) => ErrorKind::ServerClose(*code),
        CloseReason::ClientClose(code) => ErrorKind::ClientClose(*code),
        CloseReason::ProtocolError(err) | CloseReason::TransportError(err) => err.clone(),
        CloseReason::OtherError => ErrorKind::OtherError("session closed".to_string()),
    }
}

fn mark_dup(packet: Packet) -> Packet {
    match packet {
        Packet::Publish(mut p) => {
            p.dup = true;
            Packet::Publish(p)
        }
        other => other,
    }
}

fn to_message(publish: PublishPacket) -> Message {
    Message {
        topic: publish.topic,
        payload: publish.payload,
        qos: publish.qos,
        retain: publish.retain,
        dup: publish.dup,
        properties: publish.properties,
    }
}

/// Reduce a PUBACK/PUBREC(failure)/PUBCOMP into the plain success-or-reason
/// outcome `publish()` resolves with.
fn publish_outcome(packet: Packet) -> Result<(), ErrorKind> {
    match packet {
        Packet::PublishAck(ack) | Packet::PublishReceived(ack) | Packet::PublishComplete(ack) => {
            if ack.reason_code.is_success() {
                Ok(())
            } else {
                Err(ErrorKind::PublishFailed(ack.reason_code))
            }
        }
        _ => Err(ErrorKind::UnexpectPacket),
    }
}

fn forward_typed<T: Send + 'static>(
    rx: oneshot::Receiver<crate::task_table::TaskResult>,
    reply: oneshot::Sender<Result<T, ErrorKind>>,
    convert: impl FnOnce(Packet) -> Result<T, ErrorKind> + Send + 'static,
) {
    tokio::spawn(async move {
        let outcome = match rx.await {
            Ok(Ok(packet)) => convert(packet),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ErrorKind::Unconnected),
        };
        let _ = reply.send(outcome);
    });
}
