//! Per-connection relay logic.
//!
//! [`RelayService`] drives one connection from admission through message
//! relay to teardown:
//!
//! ```text
//! Connecting ──▶ Rejected(InvalidRoom | RoomFull | ServerFull)
//!     │
//!     └──▶ Admitted ──(inbound payloads)──▶ Closed
//! ```

use crate::metrics;
use duet_core::{
    AdmissionError, MemberHandle, Outbox, OutboxReceiver, Payload, RegistryConfig, RoomRegistry,
};
use duet_protocol::{codec, RejectReason, RelayCodec, ServerFrame};
use duet_transport::Connection;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// How a connection's session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Refused before joining a room.
    Rejected(RejectReason),
    /// Admitted, relayed for a while, then torn down.
    Closed,
}

/// Map an admission failure to the reason reported to the client.
#[must_use]
pub fn reject_reason(err: &AdmissionError) -> RejectReason {
    match err {
        AdmissionError::InvalidRoom(_) => RejectReason::InvalidRoom,
        AdmissionError::RoomFull(_) => RejectReason::RoomFull,
        AdmissionError::CapacityExceeded(_) => RejectReason::ServerFull,
    }
}

/// Removes its member from the registry when dropped.
///
/// Ties teardown to the session's scope, so it runs exactly once whether the
/// session ends by close, error, or the task being cancelled.
struct Membership<'a> {
    registry: &'a RoomRegistry,
    handle: MemberHandle,
}

impl Drop for Membership<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.handle);
        metrics::set_active_rooms(self.registry.room_count());
        debug!(
            room = %self.handle.token(),
            member = %self.handle.member(),
            "Member left room"
        );
    }
}

/// Room admission, message relay, and teardown for every connection.
pub struct RelayService {
    registry: RoomRegistry,
    codec: RelayCodec,
}

impl RelayService {
    /// Create a relay service.
    #[must_use]
    pub fn new(registry_config: RegistryConfig, codec: RelayCodec) -> Self {
        Self {
            registry: RoomRegistry::with_config(registry_config),
            codec,
        }
    }

    /// Get the room registry.
    #[must_use]
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Run one connection to completion.
    ///
    /// `room` is the token from the connection's request; `None` or empty
    /// means no room was named.
    pub async fn handle<C: Connection>(&self, mut conn: C, room: Option<String>) -> SessionOutcome {
        let _metrics_guard = metrics::ConnectionMetricsGuard::new();

        let Some(token) = room.filter(|r| !r.is_empty()) else {
            debug!(connection = %conn.id(), "No room token supplied");
            return reject(&mut conn, RejectReason::InvalidRoom).await;
        };

        let (outbox, outbound) = Outbox::channel();
        let handle = match self.registry.admit(&token, outbox) {
            Ok(handle) => handle,
            Err(e) => {
                debug!(connection = %conn.id(), room = %token, error = %e, "Admission refused");
                return reject(&mut conn, reject_reason(&e)).await;
            }
        };

        metrics::record_admission();
        metrics::set_active_rooms(self.registry.room_count());
        debug!(
            connection = %conn.id(),
            remote = ?conn.remote_addr(),
            room = %token,
            member = %handle.member(),
            "Connection admitted"
        );

        let membership = Membership {
            registry: &self.registry,
            handle,
        };

        self.pump(&mut conn, &membership.handle, outbound).await;

        drop(membership);
        if conn.is_open() {
            let _ = conn.close().await;
        }

        debug!(connection = %conn.id(), "Connection closed");
        SessionOutcome::Closed
    }

    /// Message pump: forward peers' payloads out, relay inbound payloads.
    async fn pump<C: Connection>(
        &self,
        conn: &mut C,
        handle: &MemberHandle,
        mut outbound: OutboxReceiver,
    ) {
        loop {
            tokio::select! {
                biased;

                // Payloads relayed to us by the other member
                Some(payload) = outbound.recv() => {
                    if let Err(e) = conn.send_text(payload.to_string()).await {
                        warn!(connection = %conn.id(), error = %e, "Failed to write to client");
                        metrics::record_error("send");
                        break;
                    }
                }

                incoming = conn.recv() => {
                    match incoming {
                        Ok(Some(text)) => {
                            self.relay(handle, &text);
                        }
                        Ok(None) => {
                            debug!(connection = %conn.id(), "Client closed connection");
                            break;
                        }
                        Err(e) => {
                            warn!(connection = %conn.id(), error = %e, "Transport error");
                            metrics::record_error("transport");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Validate one inbound payload and deliver it to the sender's peers.
    ///
    /// Returns the number of peers the payload was handed to. Malformed
    /// payloads and peers that are not ready are skipped silently.
    pub fn relay(&self, handle: &MemberHandle, text: &str) -> usize {
        let start = Instant::now();

        let envelope = match self.codec.envelope(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(
                    room = %handle.token(),
                    member = %handle.member(),
                    bytes = text.len(),
                    error = %e,
                    "Dropping invalid payload"
                );
                metrics::record_dropped(e.label());
                return 0;
            }
        };

        let payload: Payload = Arc::from(envelope);
        let mut delivered = 0;
        for peer in self.registry.peers_of(handle) {
            if peer.deliver(Arc::clone(&payload)) {
                delivered += 1;
            } else {
                trace!(room = %handle.token(), "Skipping peer that is not ready");
                metrics::record_skipped_delivery();
            }
        }

        metrics::record_message(payload.len(), delivered);
        metrics::record_latency(start.elapsed().as_secs_f64());
        trace!(room = %handle.token(), recipients = delivered, "Relayed");

        delivered
    }
}

impl Default for RelayService {
    fn default() -> Self {
        Self::new(RegistryConfig::default(), RelayCodec::default())
    }
}

/// Send a rejection frame directly on the connection and close it.
async fn reject<C: Connection>(conn: &mut C, reason: RejectReason) -> SessionOutcome {
    metrics::record_rejection(reason.label());

    match codec::encode(&ServerFrame::rejection(reason)) {
        Ok(text) => {
            if let Err(e) = conn.send_text(text).await {
                debug!(connection = %conn.id(), error = %e, "Failed to send rejection");
            }
        }
        Err(e) => warn!(error = %e, "Failed to encode rejection"),
    }

    if let Err(e) = conn.close().await {
        debug!(connection = %conn.id(), error = %e, "Failed to close rejected connection");
    }

    SessionOutcome::Rejected(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_transport::memory::{self, MemoryClient};
    use std::time::Duration;
    use tokio::task::JoinHandle;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn spawn_session(
        relay: &Arc<RelayService>,
        room: Option<&str>,
    ) -> (MemoryClient, JoinHandle<SessionOutcome>) {
        let (conn, client) = memory::pair();
        let relay = Arc::clone(relay);
        let room = room.map(str::to_string);
        let task = tokio::spawn(async move { relay.handle(conn, room).await });
        (client, task)
    }

    async fn wait_for_members(relay: &RelayService, token: &str, count: usize) {
        tokio::time::timeout(TIMEOUT, async {
            while relay.registry().member_count(token) != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("room never reached expected member count");
    }

    async fn recv(client: &mut MemoryClient) -> Option<String> {
        tokio::time::timeout(TIMEOUT, client.recv())
            .await
            .expect("timed out waiting for frame")
    }

    #[tokio::test]
    async fn test_missing_room_is_rejected() {
        let relay = Arc::new(RelayService::default());
        let (mut client, task) = spawn_session(&relay, None);

        assert_eq!(recv(&mut client).await.unwrap(), r#"{"error":"Invalid room"}"#);
        assert_eq!(recv(&mut client).await, None);
        assert_eq!(
            task.await.unwrap(),
            SessionOutcome::Rejected(RejectReason::InvalidRoom)
        );
        assert_eq!(relay.registry().room_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_room_is_rejected() {
        let relay = Arc::new(RelayService::default());
        let (mut client, task) = spawn_session(&relay, Some(""));

        assert_eq!(recv(&mut client).await.unwrap(), r#"{"error":"Invalid room"}"#);
        assert_eq!(
            task.await.unwrap(),
            SessionOutcome::Rejected(RejectReason::InvalidRoom)
        );
    }

    #[tokio::test]
    async fn test_pair_relays_without_echo() {
        let relay = Arc::new(RelayService::default());
        let (mut alice, _ta) = spawn_session(&relay, Some("room"));
        let (mut bob, _tb) = spawn_session(&relay, Some("room"));
        wait_for_members(&relay, "room", 2).await;

        alice.send(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(recv(&mut bob).await.unwrap(), r#"{"message":{"text":"hi"}}"#);

        bob.send(r#"{"text":"hey"}"#).unwrap();
        assert_eq!(recv(&mut alice).await.unwrap(), r#"{"message":{"text":"hey"}}"#);

        // Nobody hears their own message
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(alice.try_recv().is_none());
        assert!(bob.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_third_connection_is_rejected() {
        let relay = Arc::new(RelayService::default());
        let (_alice, _ta) = spawn_session(&relay, Some("room"));
        let (_bob, _tb) = spawn_session(&relay, Some("room"));
        wait_for_members(&relay, "room", 2).await;

        let (mut carol, tc) = spawn_session(&relay, Some("room"));
        assert_eq!(recv(&mut carol).await.unwrap(), r#"{"error":"Room is full"}"#);
        assert_eq!(recv(&mut carol).await, None);
        assert_eq!(
            tc.await.unwrap(),
            SessionOutcome::Rejected(RejectReason::RoomFull)
        );
        assert_eq!(relay.registry().member_count("room"), 2);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped() {
        let relay = Arc::new(RelayService::default());
        let (mut alice, ta) = spawn_session(&relay, Some("room"));
        let (mut bob, _tb) = spawn_session(&relay, Some("room"));
        wait_for_members(&relay, "room", 2).await;

        alice.send("definitely not json").unwrap();
        alice.send(r#"{"seq":2}"#).unwrap();

        // Only the valid payload arrives, and alice stays connected
        assert_eq!(recv(&mut bob).await.unwrap(), r#"{"message":{"seq":2}}"#);
        assert!(!ta.is_finished());
        assert_eq!(relay.registry().member_count("room"), 2);
    }

    #[tokio::test]
    async fn test_oversize_payload_is_dropped() {
        let relay = Arc::new(RelayService::new(
            RegistryConfig::default(),
            RelayCodec::new(16),
        ));
        let (alice, _ta) = spawn_session(&relay, Some("room"));
        let (mut bob, _tb) = spawn_session(&relay, Some("room"));
        wait_for_members(&relay, "room", 2).await;

        alice.send(format!(r#"{{"text":"{}"}}"#, "x".repeat(64))).unwrap();
        alice.send("[1]").unwrap();

        assert_eq!(recv(&mut bob).await.unwrap(), r#"{"message":[1]}"#);
    }

    #[tokio::test]
    async fn test_disconnect_tears_down_and_frees_token() {
        let relay = Arc::new(RelayService::default());
        let (mut alice, ta) = spawn_session(&relay, Some("room"));
        let (mut bob, tb) = spawn_session(&relay, Some("room"));
        wait_for_members(&relay, "room", 2).await;

        bob.disconnect();
        assert_eq!(tb.await.unwrap(), SessionOutcome::Closed);
        assert_eq!(relay.registry().member_count("room"), 1);

        // No leave notification, and later messages reach nobody
        let handle_count = relay.registry().stats().member_count;
        assert_eq!(handle_count, 1);
        alice.send(r#"{"alone":true}"#).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(alice.try_recv().is_none());
        assert!(!ta.is_finished());

        alice.disconnect();
        assert_eq!(ta.await.unwrap(), SessionOutcome::Closed);
        assert!(!relay.registry().room_exists("room"));

        // The token can be used for a fresh room
        let (_dave, _td) = spawn_session(&relay, Some("room"));
        wait_for_members(&relay, "room", 1).await;
    }

    #[tokio::test]
    async fn test_teardown_without_messages() {
        let relay = Arc::new(RelayService::default());
        let (mut alice, ta) = spawn_session(&relay, Some("quiet"));
        wait_for_members(&relay, "quiet", 1).await;

        alice.disconnect();
        assert_eq!(ta.await.unwrap(), SessionOutcome::Closed);
        assert_eq!(relay.registry().room_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_session_still_tears_down() {
        let relay = Arc::new(RelayService::default());
        let (_alice, ta) = spawn_session(&relay, Some("room"));
        wait_for_members(&relay, "room", 1).await;

        ta.abort();
        let _ = ta.await;
        assert!(!relay.registry().room_exists("room"));
    }

    #[tokio::test]
    async fn test_relay_counts_ready_peers() {
        let relay = RelayService::default();
        let (a, _rx_a) = Outbox::channel();
        let (b, rx_b) = Outbox::channel();

        let ha = relay.registry().admit("room", a).unwrap();
        let _hb = relay.registry().admit("room", b).unwrap();

        assert_eq!(relay.relay(&ha, "{}"), 1);
        assert_eq!(relay.relay(&ha, "{"), 0);

        // A peer whose writer is gone is skipped, not an error
        drop(rx_b);
        assert_eq!(relay.relay(&ha, "{}"), 0);
    }

    #[test]
    fn test_reject_reason_mapping() {
        assert_eq!(
            reject_reason(&AdmissionError::RoomFull("x".into())),
            RejectReason::RoomFull
        );
        assert_eq!(
            reject_reason(&AdmissionError::CapacityExceeded(1)),
            RejectReason::ServerFull
        );
        assert_eq!(
            reject_reason(&AdmissionError::InvalidRoom("empty")),
            RejectReason::InvalidRoom
        );
    }
}
