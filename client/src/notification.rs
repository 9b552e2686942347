// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use tokio::sync::broadcast;

use crate::error::ErrorKind;
use crate::message::Message;
use crate::status::Status;

/// Default capacity of a client's notification channel. An observer that
/// falls behind by more than this many events starts missing them --
/// `subscribe`'s `Receiver` reports that via `RecvError::Lagged`.
const CHANNEL_CAPACITY: usize = 256;

/// Everything the session core pushes to observers, spec.md §5: status
/// transitions, inbound application messages, and connection-wide
/// errors not tied to a single pending call.
#[derive(Clone, Debug)]
pub enum Notification {
    StatusChanged { old: Status, new: Status },
    Message(Message),
    Error(ErrorKind),
}

/// One broadcast channel per client instance. Cloning a `Notifier` shares
/// the same underlying channel; the session core holds the sending half,
/// `Client::subscribe` hands out new receivers.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Default for Notifier {
    fn default() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }
}

impl Notifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Send to every current subscriber. No-op if there are none.
    pub fn notify(&self, notification: Notification) {
        let _ = self.tx.send(notification);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_notifications_sent_after_they_subscribe() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        notifier.notify(Notification::Error(ErrorKind::Unconnected));
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, Notification::Error(ErrorKind::Unconnected)));
    }

    #[tokio::test]
    async fn notify_with_no_subscribers_does_not_panic() {
        let notifier = Notifier::new();
        notifier.notify(Notification::Error(ErrorKind::Unconnected));
    }
}
