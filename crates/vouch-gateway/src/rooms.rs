use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error};

use vouch_types::events::{RoomEvent, room_key};
use vouch_types::models::ChallengeId;

/// An event addressed to one room, serialized once for every subscriber.
#[derive(Debug, Clone)]
pub struct RoomMessage {
    pub room: String,
    pub json: Arc<str>,
}

/// Fan-out hub for per-challenge rooms.
///
/// Every connection subscribes to the same broadcast channel and drops the
/// messages for rooms it has not joined. Publishing never waits on delivery.
#[derive(Clone)]
pub struct Rooms {
    inner: Arc<RoomsInner>,
}

struct RoomsInner {
    broadcast_tx: broadcast::Sender<RoomMessage>,
}

impl Rooms {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(RoomsInner { broadcast_tx }),
        }
    }

    /// Subscribe to every room's traffic. Filter with a [`Membership`].
    pub fn subscribe(&self) -> broadcast::Receiver<RoomMessage> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish an event to `challenge_{id}`. Returns how many connections
    /// were listening (not how many had joined the room).
    pub fn publish(&self, challenge_id: ChallengeId, event: &RoomEvent) -> usize {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize room event for challenge {}: {}", challenge_id, e);
                return 0;
            }
        };

        let room = room_key(challenge_id);
        match self.inner.broadcast_tx.send(RoomMessage {
            room: room.clone(),
            json: json.into(),
        }) {
            Ok(receivers) => {
                debug!("Published to {} ({} connections)", room, receivers);
                receivers
            }
            Err(_) => {
                debug!("Published to {} with no connections", room);
                0
            }
        }
    }
}

impl Default for Rooms {
    fn default() -> Self {
        Self::new()
    }
}

/// Rooms joined by a single connection.
#[derive(Debug, Default)]
pub struct Membership {
    rooms: HashSet<String>,
}

impl Membership {
    /// Returns false if the room was already joined.
    pub fn join(&mut self, challenge_id: ChallengeId) -> bool {
        self.rooms.insert(room_key(challenge_id))
    }

    pub fn leave(&mut self, challenge_id: ChallengeId) -> bool {
        self.rooms.remove(&room_key(challenge_id))
    }

    pub fn contains(&self, room: &str) -> bool {
        self.rooms.contains(room)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
