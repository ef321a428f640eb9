use rusqlite::{Connection, OptionalExtension};

use vouch_types::models::{ChallengeId, Message, MessageId, MessageSnapshot, NewMessage, UserId};

use crate::models::{self, MESSAGE_COLUMNS};
use crate::{Database, Result, StoreError};

impl Database {
    /// Inserts the message and re-reads the challenge's full list inside one
    /// transaction, so the returned snapshot always contains the new row.
    pub fn insert_message_and_list(&self, new: &NewMessage) -> Result<(Message, MessageSnapshot)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            bump_revision(&tx, new.challenge_id)?;
            tx.execute(
                "INSERT INTO messages (challenge_id, user_id, text, image_url, is_proof, is_validated, is_read)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, 0)",
                rusqlite::params![
                    new.challenge_id,
                    new.user_id,
                    new.text,
                    new.image_url,
                    new.is_proof,
                ],
            )?;
            let id = tx.last_insert_rowid();
            let message = require_message(&tx, id)?;
            let snapshot = query_snapshot(&tx, new.challenge_id)?;
            tx.commit()?;
            Ok((message, snapshot))
        })
    }

    /// Ordered by `created_at`, then identity.
    pub fn list_messages(&self, challenge_id: ChallengeId) -> Result<MessageSnapshot> {
        self.with_conn(|conn| query_snapshot(conn, challenge_id))
    }

    pub fn get_message(&self, id: MessageId) -> Result<Option<Message>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Sets `is_proof` and forces `is_read = false`. Clearing the proof flag
    /// also clears `is_validated`.
    pub fn set_message_proof(&self, id: MessageId, is_proof: bool) -> Result<(Message, MessageSnapshot)> {
        self.update_message_flag(
            id,
            "UPDATE messages
             SET is_proof = ?2,
                 is_validated = CASE WHEN ?2 THEN is_validated ELSE 0 END,
                 is_read = 0
             WHERE id = ?1",
            is_proof,
        )
    }

    /// Sets `is_validated` and forces `is_read = false`.
    pub fn set_message_validated(
        &self,
        id: MessageId,
        is_validated: bool,
    ) -> Result<(Message, MessageSnapshot)> {
        self.update_message_flag(
            id,
            "UPDATE messages SET is_validated = ?2, is_read = 0 WHERE id = ?1",
            is_validated,
        )
    }

    /// Marks read every message of the challenge not authored by `reader_id`.
    /// Returns how many rows flipped and the resulting list.
    pub fn mark_messages_read(
        &self,
        challenge_id: ChallengeId,
        reader_id: UserId,
    ) -> Result<(usize, MessageSnapshot)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            query_revision(&tx, challenge_id)?;
            let changed = tx.execute(
                "UPDATE messages SET is_read = 1
                 WHERE challenge_id = ?1 AND user_id != ?2 AND is_read = 0",
                rusqlite::params![challenge_id, reader_id],
            )?;
            if changed > 0 {
                bump_revision(&tx, challenge_id)?;
            }
            let snapshot = query_snapshot(&tx, challenge_id)?;
            tx.commit()?;
            Ok((changed, snapshot))
        })
    }

    fn update_message_flag(
        &self,
        id: MessageId,
        sql: &str,
        value: bool,
    ) -> Result<(Message, MessageSnapshot)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(sql, rusqlite::params![id, value])?;
            if changed == 0 {
                return Err(StoreError::not_found("message", id));
            }
            let message = require_message(&tx, id)?;
            bump_revision(&tx, message.challenge_id)?;
            let snapshot = query_snapshot(&tx, message.challenge_id)?;
            tx.commit()?;
            Ok((message, snapshot))
        })
    }
}

fn query_message(conn: &Connection, id: MessageId) -> Result<Option<Message>> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], models::message).optional()?)
}

fn require_message(conn: &Connection, id: MessageId) -> Result<Message> {
    query_message(conn, id)?.ok_or(StoreError::not_found("message", id))
}

fn query_revision(conn: &Connection, challenge_id: ChallengeId) -> Result<i64> {
    conn.query_row(
        "SELECT message_revision FROM challenges WHERE id = ?1",
        [challenge_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or(StoreError::not_found("challenge", challenge_id))
}

fn bump_revision(conn: &Connection, challenge_id: ChallengeId) -> Result<()> {
    let changed = conn.execute(
        "UPDATE challenges SET message_revision = message_revision + 1 WHERE id = ?1",
        [challenge_id],
    )?;
    if changed == 0 {
        return Err(StoreError::not_found("challenge", challenge_id));
    }
    Ok(())
}

fn query_snapshot(conn: &Connection, challenge_id: ChallengeId) -> Result<MessageSnapshot> {
    let revision = query_revision(conn, challenge_id)?;
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE challenge_id = ?1
         ORDER BY created_at ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let messages = stmt
        .query_map([challenge_id], models::message)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(MessageSnapshot {
        challenge_id,
        revision,
        messages,
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use vouch_types::models::{Frequency, NewChallenge};

    use super::*;

    struct Fixture {
        db: Database,
        challenger: UserId,
        coach: UserId,
        challenge_id: ChallengeId,
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let challenger = db.create_user("challenger", "hash").unwrap().id;
        let coach = db.create_user("coach", "hash").unwrap().id;
        let challenge_id = db
            .insert_challenge(&NewChallenge {
                title: "Read".into(),
                description: "A chapter a day".into(),
                start_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
                frequency: Frequency::Weekly,
                proof_requirements: "Photo of the page".into(),
                user_id: challenger,
                coach_id: coach,
            })
            .unwrap()
            .id;
        Fixture {
            db,
            challenger,
            coach,
            challenge_id,
        }
    }

    fn text(f: &Fixture, user_id: UserId, body: &str) -> NewMessage {
        NewMessage {
            challenge_id: f.challenge_id,
            user_id,
            text: Some(body.into()),
            image_url: None,
            is_proof: false,
        }
    }

    #[test]
    fn insert_returns_full_ordered_list() {
        let f = fixture();
        f.db.insert_message_and_list(&text(&f, f.challenger, "hi")).unwrap();
        let (msg, snapshot) = f.db.insert_message_and_list(&text(&f, f.coach, "hello")).unwrap();

        assert!(!msg.is_read);
        assert_eq!(snapshot.revision, 2);
        let texts: Vec<_> = snapshot.messages.iter().map(|m| m.text.clone().unwrap()).collect();
        assert_eq!(texts, vec!["hi", "hello"]);
        assert_eq!(snapshot.max_message_id(), Some(msg.id));
        assert_eq!(f.db.list_messages(f.challenge_id).unwrap(), snapshot);
    }

    #[test]
    fn insert_into_unknown_challenge_is_not_found() {
        let f = fixture();
        let mut new = text(&f, f.challenger, "hi");
        new.challenge_id = 999;
        assert!(matches!(
            f.db.insert_message_and_list(&new),
            Err(StoreError::NotFound { entity: "challenge", id: 999 })
        ));
    }

    #[test]
    fn flag_updates_force_unread() {
        let f = fixture();
        let (msg, _) = f.db.insert_message_and_list(&text(&f, f.challenger, "proof")).unwrap();
        f.db.mark_messages_read(f.challenge_id, f.coach).unwrap();

        let (msg, snapshot) = f.db.set_message_proof(msg.id, true).unwrap();
        assert!(msg.is_proof);
        assert!(!msg.is_read);
        assert_eq!(snapshot.messages[0], msg);

        f.db.mark_messages_read(f.challenge_id, f.coach).unwrap();
        let (msg, _) = f.db.set_message_validated(msg.id, true).unwrap();
        assert!(msg.is_validated);
        assert!(!msg.is_read);
    }

    #[test]
    fn clearing_proof_clears_validation() {
        let f = fixture();
        let (msg, _) = f.db.insert_message_and_list(&text(&f, f.challenger, "proof")).unwrap();
        f.db.set_message_proof(msg.id, true).unwrap();
        f.db.set_message_validated(msg.id, true).unwrap();

        let (msg, _) = f.db.set_message_proof(msg.id, false).unwrap();
        assert!(!msg.is_proof);
        assert!(!msg.is_validated);
    }

    #[test]
    fn unknown_message_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.db.set_message_validated(31337, true),
            Err(StoreError::NotFound { entity: "message", .. })
        ));
    }

    #[test]
    fn mark_read_skips_own_messages() {
        let f = fixture();
        f.db.insert_message_and_list(&text(&f, f.challenger, "mine")).unwrap();
        f.db.insert_message_and_list(&text(&f, f.coach, "theirs")).unwrap();

        let (changed, snapshot) = f.db.mark_messages_read(f.challenge_id, f.challenger).unwrap();
        assert_eq!(changed, 1);
        for m in &snapshot.messages {
            assert_eq!(m.is_read, m.user_id != f.challenger);
        }

        // Nothing left to flip: the revision stays put
        let (changed, again) = f.db.mark_messages_read(f.challenge_id, f.challenger).unwrap();
        assert_eq!(changed, 0);
        assert_eq!(again.revision, snapshot.revision);
    }
}
