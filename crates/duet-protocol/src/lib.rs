//! # duet-protocol
//!
//! Wire protocol definitions for the Duet pairwise relay.
//!
//! Clients exchange JSON text frames. The server relays whatever a client
//! sends, wrapped in an envelope, and otherwise only ever speaks to report
//! why a connection was refused.
//!
//! ## Frames
//!
//! - `{"message": <payload>}` - a payload from the other room member
//! - `{"error": "Invalid room"}` - no room token was given
//! - `{"error": "Room is full"}` - the room already holds two members
//!
//! ## Example
//!
//! ```rust
//! use duet_protocol::codec;
//!
//! let envelope = codec::relay_envelope(r#"{"text":"hi"}"#).unwrap();
//! assert_eq!(envelope, r#"{"message":{"text":"hi"}}"#);
//! assert!(codec::relay_envelope("not json").is_err());
//! ```

pub mod codec;
pub mod frames;

pub use codec::{encode, parse_payload, relay_envelope, ProtocolError, RelayCodec};
pub use frames::{CreateRoomResponse, RejectReason, ServerFrame};
