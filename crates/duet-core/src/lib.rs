//! # duet-core
//!
//! Room membership for the Duet pairwise relay.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Room** - A capacity-2 group of connections under one opaque token
//! - **RoomRegistry** - Atomic admit / remove / peer lookup across all rooms
//! - **Outbox** - Non-blocking send capability of one admitted connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  admit / remove  ┌──────────────┐       ┌─────────────┐
//! │  Connection │─────────────────▶│ RoomRegistry │──────▶│    Room     │
//! └─────────────┘                  └──────────────┘       └─────────────┘
//!        ▲                                │ peers_of             │
//!        │          deliver               ▼                      ▼
//!        └──────────────────────────  Outbox  ◀──────────── Member (≤ 2)
//! ```

pub mod outbox;
pub mod registry;
pub mod room;

pub use outbox::{Outbox, OutboxReceiver, Payload};
pub use registry::{AdmissionError, MemberHandle, RegistryConfig, RegistryStats, RoomRegistry};
pub use room::{Member, MemberId, Room, RoomToken, ROOM_CAPACITY};
