use serde::{Deserialize, Serialize};

use crate::models::{ChallengeId, ChallengeStatus, Message, MessageSnapshot, UserId};

/// Name of the broadcast room for one challenge.
pub fn room_key(challenge_id: ChallengeId) -> String {
    format!("challenge_{}", challenge_id)
}

/// Events pushed from the server over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum RoomEvent {
    /// Sent only to the connection that joined
    Joined { challenge_id: ChallengeId },

    /// A challenge changed status (including the reset to pending on a coach change)
    ChallengeStatusUpdated {
        challenge_id: ChallengeId,
        status: ChallengeStatus,
    },

    /// Sent right after the pending reset when a challenge changes coach
    CoachReassigned {
        challenge_id: ChallengeId,
        coach_id: UserId,
    },

    /// The challenge and its messages are gone
    ChallengeDeleted { challenge_id: ChallengeId },

    /// Full replacement list of a challenge's messages
    UpdateMessages {
        challenge_id: ChallengeId,
        revision: i64,
        messages: Vec<Message>,
    },

    /// `user_id` read every message of the challenge they did not author
    MessagesRead {
        challenge_id: ChallengeId,
        user_id: UserId,
    },

    /// The connection fell behind and dropped events; re-fetch
    Resync,
}

impl RoomEvent {
    /// The challenge this event is scoped to, if any.
    pub fn challenge_id(&self) -> Option<ChallengeId> {
        match self {
            Self::Joined { challenge_id }
            | Self::ChallengeStatusUpdated { challenge_id, .. }
            | Self::CoachReassigned { challenge_id, .. }
            | Self::ChallengeDeleted { challenge_id }
            | Self::UpdateMessages { challenge_id, .. }
            | Self::MessagesRead { challenge_id, .. } => Some(*challenge_id),
            Self::Resync => None,
        }
    }

    pub fn update_messages(snapshot: MessageSnapshot) -> Self {
        Self::UpdateMessages {
            challenge_id: snapshot.challenge_id,
            revision: snapshot.revision,
            messages: snapshot.messages,
        }
    }
}

/// Commands sent from the client over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum RoomCommand {
    JoinRoom { challenge_id: ChallengeId },
    LeaveRoom { challenge_id: ChallengeId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_wire_format() {
        let event = RoomEvent::ChallengeStatusUpdated {
            challenge_id: 3,
            status: ChallengeStatus::Active,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "challengeStatusUpdated",
                "data": { "challenge_id": 3, "status": "active" }
            })
        );
    }

    #[test]
    fn command_wire_format() {
        let cmd: RoomCommand =
            serde_json::from_str(r#"{"type":"joinRoom","data":{"challenge_id":9}}"#).unwrap();
        assert_eq!(cmd, RoomCommand::JoinRoom { challenge_id: 9 });
    }

    #[test]
    fn room_keys() {
        assert_eq!(room_key(12), "challenge_12");
        assert_eq!(RoomEvent::Resync.challenge_id(), None);
        assert_eq!(
            RoomEvent::MessagesRead { challenge_id: 4, user_id: 1 }.challenge_id(),
            Some(4)
        );
        assert_eq!(
            RoomEvent::ChallengeDeleted { challenge_id: 6 }.challenge_id(),
            Some(6)
        );
    }
}
