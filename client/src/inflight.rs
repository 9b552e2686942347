// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use mqtt_codec::base::PacketId;
use mqtt_codec::packet::Packet;

/// One in-progress QoS >= 1 delivery flow, spec.md §4.8. Tracks which
/// step of the handshake is outstanding so a retransmit or an unexpected
/// reply can be checked against it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InflightState {
    /// Outbound QoS 1, PUBLISH sent, awaiting PUBACK.
    AwaitingPubAck,

    /// Outbound QoS 2, PUBLISH sent, awaiting PUBREC.
    AwaitingPubRec,

    /// Outbound QoS 2, PUBREC received, PUBREL sent, awaiting PUBCOMP.
    AwaitingPubComp,

    /// Inbound QoS 2, PUBLISH received and PUBREC sent, awaiting PUBREL
    /// before the application is notified.
    AwaitingPubRel,
}

#[derive(Clone, Debug)]
struct Entry {
    packet: Packet,
    state: InflightState,
    /// When this step is next due for retransmission, spec.md §4.8's
    /// "on timeout, re-send the current step". Inbound entries use this
    /// for the PUBREC-resend-while-awaiting-PUBREL case.
    deadline: Instant,
}

/// Tracks packets that have been sent or received but not yet fully
/// acknowledged, keyed by packet identifier -- spec.md §4.8. Separate
/// maps for client-originated and broker-originated flows since v3.1.1
/// and v5.0 both allow a given identifier to appear in both directions
/// simultaneously.
#[derive(Default)]
pub struct InflightTable {
    outbound: HashMap<PacketId, Entry>,
    inbound: HashMap<PacketId, Entry>,
}

impl InflightTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_outbound(&mut self, id: PacketId, packet: Packet, state: InflightState, deadline: Instant) {
        self.outbound.insert(id, Entry { packet, state, deadline });
    }

    pub fn insert_inbound(&mut self, id: PacketId, packet: Packet, state: InflightState, deadline: Instant) {
        self.inbound.insert(id, Entry { packet, state, deadline });
    }

    #[must_use]
    pub fn outbound_state(&self, id: PacketId) -> Option<&InflightState> {
        self.outbound.get(&id).map(|e| &e.state)
    }

    #[must_use]
    pub fn inbound_state(&self, id: PacketId) -> Option<&InflightState> {
        self.inbound.get(&id).map(|e| &e.state)
    }

    pub fn advance_outbound(&mut self, id: PacketId, state: InflightState, deadline: Instant) -> bool {
        self.outbound
            .get_mut(&id)
            .map(|e| {
                e.state = state;
                e.deadline = deadline;
            })
            .is_some()
    }

    pub fn advance_inbound(&mut self, id: PacketId, state: InflightState, deadline: Instant) -> bool {
        self.inbound
            .get_mut(&id)
            .map(|e| {
                e.state = state;
                e.deadline = deadline;
            })
            .is_some()
    }

    pub fn remove_outbound(&mut self, id: PacketId) -> Option<Packet> {
        self.outbound.remove(&id).map(|e| e.packet)
    }

    pub fn remove_inbound(&mut self, id: PacketId) -> Option<Packet> {
        self.inbound.remove(&id).map(|e| e.packet)
    }

    /// Whether `id` is a duplicate inbound QoS 2 PUBLISH already tracked,
    /// per spec.md §4.8's "inbound duplicate is dropped silently, PUBREC
    /// still retransmitted" rule.
    #[must_use]
    pub fn is_duplicate_inbound(&self, id: PacketId) -> bool {
        self.inbound.contains_key(&id)
    }

    /// Packets awaiting a PUBACK/PUBREC/PUBCOMP, resent in identifier
    /// order after a reconnect with a resumed session (spec.md §4.7).
    #[must_use]
    pub fn outbound_packets_for_resend(&self) -> Vec<(PacketId, Packet)> {
        let mut ids: Vec<PacketId> = self.outbound.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
            .map(|id| (id, self.outbound[&id].packet.clone()))
            .collect()
    }

    pub fn clear(&mut self) {
        self.outbound.clear();
        self.inbound.clear();
    }

    /// Push an outbound entry's deadline out without touching its state,
    /// for after a session-resumption resend (spec.md §4.7) where the
    /// step doesn't change but the timeout window restarts.
    pub fn refresh_outbound_deadline(&mut self, id: PacketId, deadline: Instant) {
        if let Some(entry) = self.outbound.get_mut(&id) {
            entry.deadline = deadline;
        }
    }

    /// Outbound entries whose `publish_timeout` has elapsed: the current
    /// step (PUBLISH or PUBREL, whichever is pending) is re-sent verbatim
    /// per spec.md §4.8 -- no dup bit, since this is a live-session
    /// resend rather than a session-resumption one -- and the deadline
    /// pushed out by another `publish_timeout`.
    pub fn resend_due_outbound(&mut self, now: Instant, publish_timeout: Duration) -> Vec<(PacketId, Packet)> {
        let mut due = Vec::new();
        for (id, entry) in &mut self.outbound {
            if entry.deadline <= now {
                entry.deadline = now + publish_timeout;
                due.push((*id, entry.packet.clone()));
            }
        }
        due
    }

    /// Inbound QoS 2 identifiers still awaiting PUBREL past
    /// `publish_timeout`: the session core re-sends PUBREC for each,
    /// spec.md §4.8.
    pub fn resend_due_inbound(&mut self, now: Instant, publish_timeout: Duration) -> Vec<PacketId> {
        let mut due = Vec::new();
        for (id, entry) in &mut self.inbound {
            if entry.deadline <= now {
                entry.deadline = now + publish_timeout;
                due.push(*id);
            }
        }
        due
    }

    /// The earliest pending deadline across both tables, for scheduling
    /// the session core's retransmit timer. `None` when nothing is
    /// inflight.
    #[must_use]
    pub fn earliest_deadline(&self) -> Option<Instant> {
        self.outbound
            .values()
            .chain(self.inbound.values())
            .map(|e| e.deadline)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy() -> Packet {
        Packet::PingRequest
    }

    #[test]
    fn tracks_independent_outbound_and_inbound_state() {
        let now = Instant::now();
        let timeout = Duration::from_secs(5);
        let mut table = InflightTable::new();
        table.insert_outbound(1, dummy(), InflightState::AwaitingPubAck, now + timeout);
        table.insert_inbound(1, dummy(), InflightState::AwaitingPubRel, now + timeout);
        assert_eq!(table.outbound_state(1), Some(&InflightState::AwaitingPubAck));
        assert_eq!(table.inbound_state(1), Some(&InflightState::AwaitingPubRel));
    }

    #[test]
    fn duplicate_inbound_detected_until_removed() {
        let now = Instant::now();
        let timeout = Duration::from_secs(5);
        let mut table = InflightTable::new();
        assert!(!table.is_duplicate_inbound(7));
        table.insert_inbound(7, dummy(), InflightState::AwaitingPubRel, now + timeout);
        assert!(table.is_duplicate_inbound(7));
        table.remove_inbound(7);
        assert!(!table.is_duplicate_inbound(7));
    }

    #[test]
    fn resend_list_is_sorted_by_identifier() {
        let now = Instant::now();
        let timeout = Duration::from_secs(5);
        let mut table = InflightTable::new();
        table.insert_outbound(9, dummy(), InflightState::AwaitingPubAck, now + timeout);
        table.insert_outbound(2, dummy(), InflightState::AwaitingPubRec, now + timeout);
        let ids: Vec<PacketId> = table
            .outbound_packets_for_resend()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![2, 9]);
    }

    #[test]
    fn outbound_entry_resends_once_past_its_deadline() {
        let now = Instant::now();
        let timeout = Duration::from_millis(100);
        let mut table = InflightTable::new();
        table.insert_outbound(3, dummy(), InflightState::AwaitingPubAck, now + timeout);
        assert!(table.resend_due_outbound(now, timeout).is_empty());
        let due = table.resend_due_outbound(now + timeout, timeout);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].0, 3);
        // Deadline pushed out: not due again immediately.
        assert!(table.resend_due_outbound(now + timeout, timeout).is_empty());
    }

    #[test]
    fn inbound_entry_resends_pubrec_past_its_deadline() {
        let now = Instant::now();
        let timeout = Duration::from_millis(50);
        let mut table = InflightTable::new();
        table.insert_inbound(11, dummy(), InflightState::AwaitingPubRel, now + timeout);
        let due = table.resend_due_inbound(now + timeout, timeout);
        assert_eq!(due, vec![11]);
    }

    #[test]
    fn earliest_deadline_is_the_minimum_across_both_tables() {
        let now = Instant::now();
        let mut table = InflightTable::new();
        assert_eq!(table.earliest_deadline(), None);
        table.insert_outbound(1, dummy(), InflightState::AwaitingPubAck, now + Duration::from_secs(5));
        table.insert_inbound(2, dummy(), InflightState::AwaitingPubRel, now + Duration::from_secs(1));
        assert_eq!(table.earliest_deadline(), Some(now + Duration::from_secs(1)));
    }
}
