use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type ChallengeId = i64;
pub type MessageId = i64;
pub type NotificationId = i64;

/// Public view of a user. The credential never leaves the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    Daily,
    Weekly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "Daily",
            Self::Weekly => "Weekly",
        }
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Daily" => Ok(Self::Daily),
            "Weekly" => Ok(Self::Weekly),
            other => Err(format!("unknown frequency '{}'", other)),
        }
    }
}

/// Approval state of a challenge.
///
/// `pending -> active` and `pending -> rejected` are the intended transitions.
/// A coach change always puts the challenge back to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Pending,
    Active,
    Rejected,
}

impl ChallengeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChallengeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown challenge status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: ChallengeId,
    pub title: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub frequency: Frequency,
    pub proof_requirements: String,
    pub status: ChallengeStatus,
    /// The challenger.
    pub user_id: UserId,
    /// The reviewer.
    pub coach_id: UserId,
    pub created_at: DateTime<Utc>,
    /// Orthogonal to `status`: an archived challenge keeps its last status.
    pub archived: bool,
}

impl Challenge {
    pub fn involves(&self, user_id: UserId) -> bool {
        self.user_id == user_id || self.coach_id == user_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub challenge_id: ChallengeId,
    /// Author.
    pub user_id: UserId,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub is_proof: bool,
    /// Only meaningful while `is_proof` is set.
    pub is_validated: bool,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// The full, ordered message list of one challenge at a given revision.
///
/// `revision` is bumped by the store on every message mutation of the
/// challenge, so two snapshots of the same challenge can always be ordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSnapshot {
    pub challenge_id: ChallengeId,
    pub revision: i64,
    pub messages: Vec<Message>,
}

impl MessageSnapshot {
    pub fn max_message_id(&self) -> Option<MessageId> {
        self.messages.iter().map(|m| m.id).max()
    }
}

/// A validated challenge ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChallenge {
    pub title: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub frequency: Frequency,
    pub proof_requirements: String,
    pub user_id: UserId,
    pub coach_id: UserId,
}

/// A validated message ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub challenge_id: ChallengeId,
    pub user_id: UserId,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub is_proof: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_names_are_lowercase() {
        let json = serde_json::to_string(&ChallengeStatus::Active).unwrap();
        assert_eq!(json, "\"active\"");
        assert_eq!("rejected".parse::<ChallengeStatus>(), Ok(ChallengeStatus::Rejected));
        assert!("Active".parse::<ChallengeStatus>().is_err());
    }

    #[test]
    fn frequency_wire_names_are_capitalized() {
        let json = serde_json::to_string(&Frequency::Weekly).unwrap();
        assert_eq!(json, "\"Weekly\"");
        assert_eq!("Daily".parse::<Frequency>(), Ok(Frequency::Daily));
    }
}
