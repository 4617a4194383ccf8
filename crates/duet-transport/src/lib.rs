//! # duet-transport
//!
//! Connection abstraction for the Duet relay.
//!
//! - **WebSocket** - axum WebSocket upgraded from an HTTP request
//! - **Memory** - an in-process pair, for tests and benchmarks
//!
//! ```rust,ignore
//! use duet_transport::Connection;
//!
//! async fn echo(mut conn: impl Connection) {
//!     while let Ok(Some(text)) = conn.recv().await {
//!         let _ = conn.send_text(text).await;
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{Connection, ConnectionId, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnection;
