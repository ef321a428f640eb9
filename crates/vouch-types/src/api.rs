use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{
    ChallengeId, ChallengeStatus, Frequency, Message, NewChallenge, NewMessage, UserId,
};

// -- Auth --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsernameResponse {
    pub username: String,
}

/// `?user_id=` query. Kept as a string so a malformed id is reported as a
/// validation error instead of a generic query rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserIdQuery {
    pub user_id: Option<String>,
}

impl UserIdQuery {
    pub fn parse(&self) -> Result<UserId, String> {
        let raw = self
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "user_id is required".to_string())?;
        raw.parse::<UserId>()
            .map_err(|_| format!("invalid user_id '{}'", raw))
    }
}

// -- Challenges --

/// Body of `POST /api/challenges`. Every field is optional on the wire so a
/// missing one is reported by name rather than as a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreateChallengeRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub frequency: Option<Frequency>,
    pub proof_requirements: Option<String>,
    #[serde(rename = "user_id")]
    pub user_id: Option<UserId>,
    pub coach_id: Option<UserId>,
}

impl CreateChallengeRequest {
    /// Checks presence of every field and returns the typed record.
    pub fn into_new_challenge(self) -> Result<NewChallenge, String> {
        let mut missing = Vec::new();

        let title = non_blank(self.title, "title", &mut missing);
        let description = non_blank(self.description, "description", &mut missing);
        let proof_requirements =
            non_blank(self.proof_requirements, "proofRequirements", &mut missing);
        if self.start_date.is_none() {
            missing.push("startDate");
        }
        if self.end_date.is_none() {
            missing.push("endDate");
        }
        if self.frequency.is_none() {
            missing.push("frequency");
        }
        if self.user_id.is_none() {
            missing.push("user_id");
        }
        if self.coach_id.is_none() {
            missing.push("coachId");
        }

        match (
            title,
            description,
            proof_requirements,
            self.start_date,
            self.end_date,
            self.frequency,
            self.user_id,
            self.coach_id,
        ) {
            (
                Some(title),
                Some(description),
                Some(proof_requirements),
                Some(start_date),
                Some(end_date),
                Some(frequency),
                Some(user_id),
                Some(coach_id),
            ) => Ok(NewChallenge {
                title,
                description,
                start_date,
                end_date,
                frequency,
                proof_requirements,
                user_id,
                coach_id,
            }),
            _ => Err(format!("Missing required fields: {}", missing.join(", "))),
        }
    }
}

fn non_blank(
    value: Option<String>,
    name: &'static str,
    missing: &mut Vec<&'static str>,
) -> Option<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Some(v),
        _ => {
            missing.push(name);
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateStatusRequest {
    pub status: ChallengeStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ReassignCoachRequest {
    pub coach_id: UserId,
}

// -- Messages --

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PostMessageRequest {
    #[serde(rename = "user_id")]
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_proof: Option<bool>,
}

impl PostMessageRequest {
    /// Blank text and image url count as absent; at least one must remain.
    pub fn into_new_message(self, challenge_id: ChallengeId) -> Result<NewMessage, String> {
        let text = self.text.filter(|t| !t.trim().is_empty());
        let image_url = self.image_url.filter(|u| !u.trim().is_empty());
        if text.is_none() && image_url.is_none() {
            return Err("A message needs text or an image".into());
        }
        Ok(NewMessage {
            challenge_id,
            user_id: self.user_id,
            text,
            image_url,
            is_proof: self.is_proof.unwrap_or(false),
        })
    }
}

/// Response header carrying the message revision of a returned list.
/// Lets a client order a fetched list against `updateMessages` broadcasts.
pub const MESSAGES_REVISION_HEADER: &str = "x-messages-revision";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostMessageResponse {
    pub success: bool,
    pub message: Message,
    /// Full ordered list of the challenge after the insert.
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ValidateMessageRequest {
    pub is_validated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SetProofRequest {
    pub is_proof: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkReadRequest {
    pub user_id: UserId,
}

// -- Uploads --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    pub original_name: Option<String>,
    pub mime_type: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub image_url: String,
    pub file_info: FileInfo,
}

// -- Errors --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
