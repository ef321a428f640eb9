use rusqlite::{Connection, OptionalExtension};

use vouch_types::models::{Challenge, ChallengeId, ChallengeStatus, NewChallenge, UserId};

use crate::models::{self, CHALLENGE_COLUMNS};
use crate::{Database, Result, StoreError};

impl Database {
    /// Inserts with `status = pending` and `archived = false`; the store
    /// assigns `id` and `created_at`.
    pub fn insert_challenge(&self, new: &NewChallenge) -> Result<Challenge> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO challenges
                    (title, description, start_date, end_date, frequency, proof_requirements,
                     status, user_id, coach_id, archived)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?8, 0)",
                rusqlite::params![
                    new.title,
                    new.description,
                    new.start_date.format("%Y-%m-%d").to_string(),
                    new.end_date.format("%Y-%m-%d").to_string(),
                    new.frequency.as_str(),
                    new.proof_requirements,
                    new.user_id,
                    new.coach_id,
                ],
            )?;
            let id = conn.last_insert_rowid();
            require_challenge(conn, id)
        })
    }

    pub fn get_challenge(&self, id: ChallengeId) -> Result<Option<Challenge>> {
        self.with_conn(|conn| query_challenge(conn, id))
    }

    /// Challenges where the user is the challenger or the coach, newest first.
    pub fn list_challenges_for_user(&self, user_id: UserId) -> Result<Vec<Challenge>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CHALLENGE_COLUMNS} FROM challenges
                 WHERE user_id = ?1 OR coach_id = ?1
                 ORDER BY created_at DESC, id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], models::challenge)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns the status the challenge had before the update alongside the
    /// updated row.
    pub fn update_challenge_status(
        &self,
        id: ChallengeId,
        status: ChallengeStatus,
    ) -> Result<(ChallengeStatus, Challenge)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let previous = require_challenge(&tx, id)?.status;
            tx.execute(
                "UPDATE challenges SET status = ?2 WHERE id = ?1",
                rusqlite::params![id, status.as_str()],
            )?;
            let updated = require_challenge(&tx, id)?;
            tx.commit()?;
            Ok((previous, updated))
        })
    }

    /// Sets the coach and restarts the approval cycle.
    pub fn reassign_coach(&self, id: ChallengeId, coach_id: UserId) -> Result<Challenge> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE challenges SET coach_id = ?2, status = 'pending' WHERE id = ?1",
                rusqlite::params![id, coach_id],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("challenge", id));
            }
            require_challenge(conn, id)
        })
    }

    /// Sets `archived`. Returns whether the flag actually flipped, so callers
    /// can treat a repeat archive as a no-op.
    pub fn archive_challenge(&self, id: ChallengeId) -> Result<(bool, Challenge)> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE challenges SET archived = 1 WHERE id = ?1 AND archived = 0",
                [id],
            )?;
            let challenge = require_challenge(conn, id)?;
            Ok((changed > 0, challenge))
        })
    }

    /// Removes the challenge. Its messages and reminders go with it.
    pub fn delete_challenge(&self, id: ChallengeId) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM challenges WHERE id = ?1", [id])?;
            if changed == 0 {
                return Err(StoreError::not_found("challenge", id));
            }
            Ok(())
        })
    }
}

pub(crate) fn query_challenge(conn: &Connection, id: ChallengeId) -> Result<Option<Challenge>> {
    let sql = format!("SELECT {CHALLENGE_COLUMNS} FROM challenges WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], models::challenge).optional()?)
}

fn require_challenge(conn: &Connection, id: ChallengeId) -> Result<Challenge> {
    query_challenge(conn, id)?.ok_or(StoreError::not_found("challenge", id))
}
