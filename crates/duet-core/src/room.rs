//! Room abstraction for Duet.
//!
//! A room pairs at most two connections under one opaque token.

use crate::outbox::Outbox;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Maximum number of members a room can hold.
pub const ROOM_CAPACITY: usize = 2;

/// A room token.
pub type RoomToken = String;

/// Validate a room token.
///
/// Tokens are opaque; any non-empty string is accepted.
///
/// # Errors
///
/// Returns an error message if the token is empty.
pub fn validate_room_token(token: &str) -> Result<(), &'static str> {
    if token.is_empty() {
        return Err("Room token cannot be empty");
    }
    Ok(())
}

static NEXT_MEMBER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an admitted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId(u64);

impl MemberId {
    /// Allocate a fresh member id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_MEMBER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "member_{}", self.0)
    }
}

/// One connection admitted into a room.
#[derive(Debug, Clone)]
pub struct Member {
    id: MemberId,
    outbox: Outbox,
}

impl Member {
    /// Create a new member.
    #[must_use]
    pub fn new(id: MemberId, outbox: Outbox) -> Self {
        Self { id, outbox }
    }

    /// Get the member id.
    #[must_use]
    pub fn id(&self) -> MemberId {
        self.id
    }

    /// Get the member's send capability.
    #[must_use]
    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }
}

/// A capacity-bounded relay group.
#[derive(Debug)]
pub struct Room {
    /// Room token.
    token: RoomToken,
    /// Members in admission order.
    members: Vec<Member>,
}

impl Room {
    /// Create an empty room.
    #[must_use]
    pub fn new(token: impl Into<RoomToken>) -> Self {
        Self {
            token: token.into(),
            members: Vec::with_capacity(ROOM_CAPACITY),
        }
    }

    /// Get the room token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Get the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the room has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Check if the room has reached [`ROOM_CAPACITY`].
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.members.len() >= ROOM_CAPACITY
    }

    /// Check if a member is in this room.
    #[must_use]
    pub fn contains(&self, id: MemberId) -> bool {
        self.members.iter().any(|m| m.id == id)
    }

    /// Append a member.
    ///
    /// Returns the member back if the room is already full.
    pub fn push(&mut self, member: Member) -> Result<(), Member> {
        if self.is_full() {
            return Err(member);
        }
        debug!(room = %self.token, member = %member.id, "Member added");
        self.members.push(member);
        Ok(())
    }

    /// Remove a member.
    ///
    /// Returns `true` if the member was present.
    pub fn remove(&mut self, id: MemberId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m.id != id);
        let removed = self.members.len() != before;
        if removed {
            debug!(room = %self.token, member = %id, "Member removed");
        }
        removed
    }

    /// Outboxes of every member except `id`, in admission order.
    ///
    /// Returns `None` if `id` is not a member of this room.
    #[must_use]
    pub fn peers_of(&self, id: MemberId) -> Option<Vec<Outbox>> {
        if !self.contains(id) {
            return None;
        }
        Some(
            self.members
                .iter()
                .filter(|m| m.id != id)
                .map(|m| m.outbox.clone())
                .collect(),
        )
    }
}
