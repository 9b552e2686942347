// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::collections::HashMap;

use tokio::sync::oneshot;

use mqtt_codec::base::PacketId;
use mqtt_codec::packet::Packet;

use crate::error::ErrorKind;

/// What a pending client operation is waiting for: either the correlated
/// reply packet, or the error the session core closed with.
pub type TaskResult = Result<Packet, ErrorKind>;

/// The receiving half an awaiting caller holds.
pub type Completer = oneshot::Sender<TaskResult>;

/// Resolve `completer`, ignoring the "receiver dropped" case -- spec.md
/// §3 "the last to resolve wins (idempotent)": a caller that already gave
/// up on its `Receiver` is not an error for the session core.
fn resolve(completer: Completer, result: TaskResult) {
    let _ = completer.send(result);
}

/// Correlates outbound control packets awaiting a broker reply, keyed by
/// packet identifier (spec.md §4.6's "active" table -- PUBACK, PUBREC,
/// SUBACK, UNSUBACK, PUBCOMP) plus two dedicated slots for CONNECT and
/// PINGREQ, which carry no identifier. PUBREL has no entry here: it is a
/// broker-initiated continuation of the inbound QoS 2 flow the inflight
/// table already tracks, and AUTH during re-authentication is answered
/// directly from the configured `AuthFlow` rather than through a pending
/// local caller, so spec.md §4.6's "passive" table and AUTH slot have no
/// local caller to correlate against and are not modelled as completers
/// here. Replacing an entry for the same key does **not** resolve the
/// displaced completer -- the broker's next reply correlates to the new
/// request (spec.md §3, "duplicate-identifier tie-break").
#[derive(Default)]
pub struct TaskTable {
    active: HashMap<PacketId, Completer>,
    connect: Option<Completer>,
    ping: Option<Completer>,
}

impl TaskTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_active(&mut self, id: PacketId, completer: Completer) {
        self.active.insert(id, completer);
    }

    pub fn set_connect(&mut self, completer: Completer) {
        self.connect = Some(completer);
    }

    pub fn set_ping(&mut self, completer: Completer) {
        self.ping = Some(completer);
    }

    /// Resolve and remove the active-table entry for `id`, if any.
    pub fn resolve_active(&mut self, id: PacketId, result: TaskResult) -> bool {
        self.active.remove(&id).is_some_and(|c| {
            resolve(c, result);
            true
        })
    }

    pub fn resolve_connect(&mut self, result: TaskResult) -> bool {
        self.connect.take().is_some_and(|c| {
            resolve(c, result);
            true
        })
    }

    pub fn resolve_ping(&mut self, result: TaskResult) -> bool {
        self.ping.take().is_some_and(|c| {
            resolve(c, result);
            true
        })
    }

    /// Resolve every outstanding completer with `err` and drop them --
    /// spec.md §4.7's "clear both task tables". Each completer resolves
    /// exactly once.
    pub fn clear_all(&mut self, err: ErrorKind) {
        for (_, completer) in self.active.drain() {
            resolve(completer, Err(err.clone()));
        }
        if let Some(completer) = self.connect.take() {
            resolve(completer, Err(err.clone()));
        }
        if let Some(completer) = self.ping.take() {
            resolve(completer, Err(err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replacing_active_entry_does_not_resolve_old_completer() {
        let mut table = TaskTable::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        table.insert_active(1, tx1);
        table.insert_active(1, tx2);
        drop(table);
        assert!(rx1.await.is_err());
        assert!(rx2.await.is_err());
    }

    #[tokio::test]
    async fn clear_all_resolves_every_completer_once() {
        let mut table = TaskTable::new();
        let (tx, rx) = oneshot::channel();
        table.insert_active(5, tx);
        table.clear_all(ErrorKind::Unconnected);
        assert_eq!(rx.await.unwrap(), Err(ErrorKind::Unconnected));
    }
}
