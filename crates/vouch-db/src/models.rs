//! Row decoding. The store writes timestamps as RFC 3339 text and dates as
//! `YYYY-MM-DD`; anything else is reported as a conversion failure.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

use vouch_types::models::{Challenge, ChallengeStatus, Frequency, Message, Notification, User};

/// Full user row, including the credential hash. Never serialized.
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    pub fn to_user(&self) -> User {
        User {
            id: self.id,
            username: self.username.clone(),
        }
    }
}

pub(crate) const USER_COLUMNS: &str = "id, username, password, created_at";

pub(crate) const CHALLENGE_COLUMNS: &str = "id, title, description, start_date, end_date, \
     frequency, proof_requirements, status, user_id, coach_id, created_at, archived";

pub(crate) const MESSAGE_COLUMNS: &str =
    "id, challenge_id, user_id, text, image_url, is_proof, is_validated, created_at, is_read";

pub(crate) const NOTIFICATION_COLUMNS: &str = "id, user_id, message, read, created_at";

pub(crate) fn user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        created_at: timestamp(row, 3)?,
    })
}

pub(crate) fn challenge(row: &Row<'_>) -> rusqlite::Result<Challenge> {
    Ok(Challenge {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        start_date: date(row, 3)?,
        end_date: date(row, 4)?,
        frequency: parsed::<Frequency>(row, 5)?,
        proof_requirements: row.get(6)?,
        status: parsed::<ChallengeStatus>(row, 7)?,
        user_id: row.get(8)?,
        coach_id: row.get(9)?,
        created_at: timestamp(row, 10)?,
        archived: row.get(11)?,
    })
}

pub(crate) fn message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        challenge_id: row.get(1)?,
        user_id: row.get(2)?,
        text: row.get(3)?,
        image_url: row.get(4)?,
        is_proof: row.get(5)?,
        is_validated: row.get(6)?,
        created_at: timestamp(row, 7)?,
        is_read: row.get(8)?,
    })
}

pub(crate) fn notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        message: row.get(2)?,
        read: row.get(3)?,
        created_at: timestamp(row, 4)?,
    })
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Rows written by hand with datetime('now') have no zone or fraction
            chrono::NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| conversion_failure(idx, e))
}

fn date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| conversion_failure(idx, e))
}

fn parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_failure(idx, e))
}

fn conversion_failure<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}
