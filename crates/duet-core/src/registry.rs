//! Process-wide room registry.
//!
//! The registry is the single source of truth for room membership. Rooms live
//! in a sharded [`DashMap`], so every operation locks only the shard that
//! holds its token and unrelated rooms never contend on one global lock.

use crate::outbox::Outbox;
use crate::room::{validate_room_token, Member, MemberId, Room, RoomToken};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Admission errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// Room token is not acceptable.
    #[error("Invalid room: {0}")]
    InvalidRoom(&'static str),

    /// Room already holds the maximum number of members.
    #[error("Room is full: {0}")]
    RoomFull(String),

    /// Opening another room would exceed the configured room limit.
    #[error("Maximum rooms reached ({0})")]
    CapacityExceeded(usize),
}

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum number of rooms that may exist at once.
    pub max_rooms: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_rooms: 10_000 }
    }
}

/// Reference to one admitted member.
///
/// Handed out by [`RoomRegistry::admit`] and passed back for every later
/// operation on that member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberHandle {
    token: RoomToken,
    member: MemberId,
}

impl MemberHandle {
    /// Get the room token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Get the member id.
    #[must_use]
    pub fn member(&self) -> MemberId {
        self.member
    }
}

/// The room registry.
pub struct RoomRegistry {
    /// Rooms indexed by token. Empty rooms are never stored.
    rooms: DashMap<RoomToken, Room>,
    /// Configuration.
    config: RegistryConfig,
}

impl RoomRegistry {
    /// Create a new registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        info!("Creating room registry with config: {:?}", config);
        Self {
            rooms: DashMap::new(),
            config,
        }
    }

    /// Admit a connection into the room named by `token`.
    ///
    /// The room is created if it does not exist. The capacity check and the
    /// append happen under one entry lock, so two racing admissions can never
    /// both take the last slot.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::RoomFull`] if the room already has two
    /// members, or another variant if the token or room limit rejects it.
    pub fn admit(&self, token: &str, outbox: Outbox) -> Result<MemberHandle, AdmissionError> {
        validate_room_token(token).map_err(AdmissionError::InvalidRoom)?;

        // Soft limit: checked before taking the entry lock, since `len` reads
        // every shard.
        if !self.rooms.contains_key(token) && self.rooms.len() >= self.config.max_rooms {
            return Err(AdmissionError::CapacityExceeded(self.config.max_rooms));
        }

        let mut room = self.rooms.entry(token.to_string()).or_insert_with(|| {
            debug!(room = %token, "Creating new room");
            Room::new(token)
        });

        let member = MemberId::next();
        if room.push(Member::new(member, outbox)).is_err() {
            debug!(room = %token, "Admission refused, room is full");
            return Err(AdmissionError::RoomFull(token.to_string()));
        }

        debug!(room = %token, member = %member, members = room.len(), "User joined room");

        Ok(MemberHandle {
            token: token.to_string(),
            member,
        })
    }

    /// Remove a member, deleting its room once empty.
    ///
    /// Idempotent: removing an already-removed handle does nothing. Returns
    /// `true` if the member was present.
    pub fn remove(&self, handle: &MemberHandle) -> bool {
        match self.rooms.entry(handle.token.clone()) {
            Entry::Occupied(mut entry) => {
                let removed = entry.get_mut().remove(handle.member);
                if entry.get().is_empty() {
                    entry.remove();
                    debug!(room = %handle.token, "Deleted empty room");
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Outboxes of every other member of the handle's room.
    ///
    /// Computed at call time from current membership. A handle that has been
    /// removed has no peers.
    #[must_use]
    pub fn peers_of(&self, handle: &MemberHandle) -> Vec<Outbox> {
        let peers = self
            .rooms
            .get(&handle.token)
            .and_then(|room| room.peers_of(handle.member))
            .unwrap_or_default();
        trace!(room = %handle.token, member = %handle.member, peers = peers.len(), "Resolved peers");
        peers
    }

    /// Check if a room exists.
    #[must_use]
    pub fn room_exists(&self, token: &str) -> bool {
        self.rooms.contains_key(token)
    }

    /// Get the member count for a room.
    #[must_use]
    pub fn member_count(&self, token: &str) -> usize {
        self.rooms.get(token).map(|r| r.len()).unwrap_or(0)
    }

    /// Check if a handle is still admitted.
    #[must_use]
    pub fn is_member(&self, handle: &MemberHandle) -> bool {
        self.rooms
            .get(&handle.token)
            .map(|r| r.contains(handle.member))
            .unwrap_or(false)
    }

    /// Get the number of rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Get all room tokens.
    #[must_use]
    pub fn room_tokens(&self) -> Vec<String> {
        self.rooms.iter().map(|e| e.key().clone()).collect()
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for room in self.rooms.iter() {
            stats.room_count += 1;
            stats.member_count += room.len();
            if room.is_full() {
                stats.full_rooms += 1;
            }
        }
        stats
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of live rooms.
    pub room_count: usize,
    /// Number of admitted members across all rooms.
    pub member_count: usize,
    /// Number of rooms holding two members.
    pub full_rooms: usize,
}
