//! In-memory transport.
//!
//! [`pair`] returns a server-side [`MemoryConnection`] and the [`MemoryClient`]
//! that drives it. Used to exercise the relay loop without sockets.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::traits::{Connection, ConnectionId, TransportError};

/// Create a connected server/client pair.
#[must_use]
pub fn pair() -> (MemoryConnection, MemoryClient) {
    let (to_server, from_client) = mpsc::unbounded_channel();
    let (to_client, from_server) = mpsc::unbounded_channel();

    let conn = MemoryConnection {
        id: ConnectionId::generate(),
        inbound: from_client,
        outbound: Some(to_client),
    };
    let client = MemoryClient {
        outbound: Some(to_server),
        inbound: from_server,
    };
    (conn, client)
}

/// Server side of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        Ok(self.inbound.recv().await)
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let tx = self
            .outbound
            .as_ref()
            .ok_or(TransportError::ConnectionClosed)?;
        tx.send(text)
            .map_err(|_| TransportError::SendFailed("client dropped".into()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.outbound = None;
        Ok(())
    }

    fn remote_addr(&self) -> Option<String> {
        Some("memory".to_string())
    }

    fn is_open(&self) -> bool {
        self.outbound.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

/// Client side of an in-memory connection.
pub struct MemoryClient {
    outbound: Option<mpsc::UnboundedSender<String>>,
    inbound: mpsc::UnboundedReceiver<String>,
}

impl MemoryClient {
    /// Send a text payload to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the client has disconnected or the server side is gone.
    pub fn send(&self, text: impl Into<String>) -> Result<(), TransportError> {
        let tx = self
            .outbound
            .as_ref()
            .ok_or(TransportError::ConnectionClosed)?;
        tx.send(text.into())
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Receive the next payload from the server.
    ///
    /// Returns `None` once the server has closed the connection.
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    /// Receive a payload if one is already queued.
    pub fn try_recv(&mut self) -> Option<String> {
        self.inbound.try_recv().ok()
    }

    /// Close the client side; the server observes a clean close.
    pub fn disconnect(&mut self) {
        self.outbound = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_roundtrip() {
        let (mut conn, mut client) = pair();

        client.send("ping").unwrap();
        assert_eq!(conn.recv().await.unwrap(), Some("ping".to_string()));

        conn.send_text("pong".to_string()).await.unwrap();
        assert_eq!(client.recv().await, Some("pong".to_string()));
    }

    #[tokio::test]
    async fn test_client_disconnect_ends_stream() {
        let (mut conn, mut client) = pair();

        client.disconnect();
        assert_eq!(conn.recv().await.unwrap(), None);
        assert!(client.send("late").is_err());
    }

    #[tokio::test]
    async fn test_server_close() {
        let (mut conn, mut client) = pair();
        assert!(conn.is_open());

        conn.close().await.unwrap();
        assert!(!conn.is_open());
        assert!(conn.send_text("late".to_string()).await.is_err());
        assert_eq!(client.recv().await, None);

        // Closing twice is fine
        conn.close().await.unwrap();
    }
}
