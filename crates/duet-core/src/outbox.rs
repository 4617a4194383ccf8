//! Per-member send capability.
//!
//! An [`Outbox`] is the write side of a connection as seen by the registry.
//! Delivery never blocks: the payload is queued for the connection's writer,
//! or skipped if the writer has gone away.

use std::sync::Arc;
use tokio::sync::mpsc;

/// A payload shared between every peer it is delivered to.
pub type Payload = Arc<str>;

/// Receiving half of an [`Outbox`], drained by the connection's writer.
pub type OutboxReceiver = mpsc::UnboundedReceiver<Payload>;

/// Send capability for a single connected client.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Payload>,
}

impl Outbox {
    /// Create an outbox and the receiver its writer drains.
    #[must_use]
    pub fn channel() -> (Self, OutboxReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Whether the connection behind this outbox can still take payloads.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a payload for delivery.
    ///
    /// Returns `false` when the connection is no longer ready; nothing is
    /// retried.
    pub fn deliver(&self, payload: Payload) -> bool {
        if !self.is_open() {
            return false;
        }
        self.tx.send(payload).is_ok()
    }

    /// Whether two outboxes feed the same connection.
    #[must_use]
    pub fn same_connection(&self, other: &Outbox) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deliver_to_open_outbox() {
        let (outbox, mut rx) = Outbox::channel();
        assert!(outbox.is_open());

        assert!(outbox.deliver(Payload::from("hello")));
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
    }

    #[test]
    fn test_deliver_to_closed_outbox_is_skipped() {
        let (outbox, rx) = Outbox::channel();
        drop(rx);

        assert!(!outbox.is_open());
        assert!(!outbox.deliver(Payload::from("lost")));
    }

    #[test]
    fn test_same_connection() {
        let (a, _rx_a) = Outbox::channel();
        let (b, _rx_b) = Outbox::channel();

        assert!(a.same_connection(&a.clone()));
        assert!(!a.same_connection(&b));
    }
}
