//! Challenge and message state transitions.
//!
//! Every operation validates its input, writes through the store, and then
//! publishes the resulting state to the challenge's room. Store calls run on
//! the blocking pool under a bounded timeout.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use vouch_db::Database;
use vouch_gateway::Rooms;
use vouch_types::events::RoomEvent;
use vouch_types::models::{
    Challenge, ChallengeId, ChallengeStatus, Message, MessageId, MessageSnapshot, NewChallenge,
    NewMessage, Notification, NotificationId, User, UserId,
};

use crate::credentials;
use crate::error::ApiError;

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct ChallengeService {
    db: Arc<Database>,
    rooms: Rooms,
    store_timeout: Duration,
}

impl ChallengeService {
    pub fn new(db: Arc<Database>, rooms: Rooms) -> Self {
        Self {
            db,
            rooms,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn rooms(&self) -> &Rooms {
        &self.rooms
    }

    /// Run a store call off the async runtime. A call that outlives the
    /// timeout is reported as [`ApiError::Timeout`]; the blocking task itself
    /// still runs to completion.
    async fn store<F, T>(&self, op: &'static str, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> vouch_db::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let task = tokio::task::spawn_blocking(move || f(&db));
        match tokio::time::timeout(self.store_timeout, task).await {
            Err(_) => {
                error!("Store call {} timed out after {:?}", op, self.store_timeout);
                Err(ApiError::Timeout)
            }
            Ok(Err(e)) => Err(ApiError::Internal(format!("{} join error: {}", op, e))),
            Ok(Ok(result)) => result.map_err(ApiError::from),
        }
    }

    // -- Users --

    pub async fn register(&self, username: &str, password: &str) -> Result<User, ApiError> {
        let username = username.trim().to_string();
        if username.len() < 3 || username.len() > 32 {
            return Err(ApiError::Validation(
                "Username must be between 3 and 32 characters".into(),
            ));
        }
        if password.len() < 8 {
            return Err(ApiError::Validation(
                "Password must be at least 8 characters".into(),
            ));
        }

        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || credentials::hash_password(&password))
            .await
            .map_err(|e| ApiError::Internal(format!("hash join error: {}", e)))??;

        let name = username.clone();
        let user = self
            .store("create_user", move |db| db.create_user(&name, &hash))
            .await
            .map_err(|e| match e {
                ApiError::Conflict(_) => ApiError::Conflict(format!("Username '{}' is taken", username)),
                other => other,
            })?;

        info!("Registered user {} ({})", user.username, user.id);
        Ok(user)
    }

    /// Check credentials against the stored hash.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User, ApiError> {
        let name = username.to_string();
        let password = password.to_string();
        let user = self
            .store("authenticate", move |db| {
                let Some(row) = db.get_user_by_username(&name)? else {
                    return Ok(None);
                };
                if credentials::verify_password(&row.password, &password) {
                    Ok(Some(row.to_user()))
                } else {
                    Ok(None)
                }
            })
            .await?;

        match user {
            Some(user) => {
                info!("User {} ({}) logged in", user.username, user.id);
                Ok(user)
            }
            None => {
                warn!("Failed login for '{}'", username);
                Err(ApiError::Authentication)
            }
        }
    }

    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        self.store("list_users", |db| db.list_users()).await
    }

    pub async fn username_by_id(&self, user_id: UserId) -> Result<String, ApiError> {
        self.store("username_by_id", move |db| db.get_username_by_id(user_id))
            .await
    }

    // -- Challenges --

    pub async fn create_challenge(&self, new: NewChallenge) -> Result<Challenge, ApiError> {
        if new.end_date < new.start_date {
            return Err(ApiError::Validation(
                "endDate must not be before startDate".into(),
            ));
        }
        if new.user_id == new.coach_id {
            return Err(ApiError::Validation(
                "A challenger cannot coach their own challenge".into(),
            ));
        }

        let (user_id, coach_id) = (new.user_id, new.coach_id);
        let (user, coach) = self
            .store("lookup_participants", move |db| {
                Ok((db.get_user_by_id(user_id)?, db.get_user_by_id(coach_id)?))
            })
            .await?;
        if user.is_none() {
            return Err(ApiError::InvalidReference(format!("Unknown user {}", user_id)));
        }
        if coach.is_none() {
            return Err(ApiError::InvalidReference(format!("Unknown coach {}", coach_id)));
        }

        let challenge = self
            .store("insert_challenge", move |db| db.insert_challenge(&new))
            .await?;

        info!(
            "Challenge {} '{}' created by {} for coach {}",
            challenge.id, challenge.title, challenge.user_id, challenge.coach_id
        );
        Ok(challenge)
    }

    pub async fn list_challenges(&self, user_id: UserId) -> Result<Vec<Challenge>, ApiError> {
        self.store("list_challenges", move |db| db.list_challenges_for_user(user_id))
            .await
    }

    /// Accept or reject a challenge. Any source status is accepted; only
    /// `pending` is the intended one.
    pub async fn update_status(
        &self,
        challenge_id: ChallengeId,
        status: ChallengeStatus,
    ) -> Result<Challenge, ApiError> {
        if status == ChallengeStatus::Pending {
            return Err(ApiError::Validation(
                "Status must be 'active' or 'rejected'".into(),
            ));
        }

        let (previous, challenge) = self
            .store("update_challenge_status", move |db| {
                db.update_challenge_status(challenge_id, status)
            })
            .await?;

        if previous != ChallengeStatus::Pending {
            warn!(
                "Challenge {} moved {} -> {} (expected a pending source)",
                challenge_id, previous, status
            );
        } else {
            info!("Challenge {} moved {} -> {}", challenge_id, previous, status);
        }

        let verb = match status {
            ChallengeStatus::Active => "accepted",
            _ => "rejected",
        };
        self.notify(
            challenge.user_id,
            format!("Your challenge \"{}\" was {}", challenge.title, verb),
        )
        .await;

        self.rooms.publish(
            challenge_id,
            &RoomEvent::ChallengeStatusUpdated {
                challenge_id,
                status: challenge.status,
            },
        );
        Ok(challenge)
    }

    /// Hand the challenge to another coach. Always restarts approval.
    pub async fn reassign_coach(
        &self,
        challenge_id: ChallengeId,
        coach_id: UserId,
    ) -> Result<Challenge, ApiError> {
        let (challenge, coach) = self
            .store("lookup_reassign", move |db| {
                Ok((db.get_challenge(challenge_id)?, db.get_user_by_id(coach_id)?))
            })
            .await?;
        let challenge = challenge
            .ok_or_else(|| ApiError::NotFound(format!("Challenge {} not found", challenge_id)))?;
        if coach.is_none() {
            return Err(ApiError::InvalidReference(format!("Unknown coach {}", coach_id)));
        }
        if challenge.user_id == coach_id {
            return Err(ApiError::Validation(
                "A challenger cannot coach their own challenge".into(),
            ));
        }

        let challenge = self
            .store("reassign_coach", move |db| db.reassign_coach(challenge_id, coach_id))
            .await?;
        info!("Challenge {} reassigned to coach {}", challenge_id, coach_id);

        self.notify(
            coach_id,
            format!("You are now the coach of \"{}\"", challenge.title),
        )
        .await;

        self.rooms.publish(
            challenge_id,
            &RoomEvent::ChallengeStatusUpdated {
                challenge_id,
                status: challenge.status,
            },
        );
        self.rooms.publish(
            challenge_id,
            &RoomEvent::CoachReassigned {
                challenge_id,
                coach_id,
            },
        );
        Ok(challenge)
    }

    /// Hide a challenge from default views. Archiving twice is a no-op.
    pub async fn archive(&self, challenge_id: ChallengeId) -> Result<Challenge, ApiError> {
        let (changed, challenge) = self
            .store("archive_challenge", move |db| db.archive_challenge(challenge_id))
            .await?;

        if changed {
            info!("Challenge {} archived", challenge_id);
            self.notify(
                challenge.user_id,
                format!("Challenge \"{}\" was archived", challenge.title),
            )
            .await;
        }
        Ok(challenge)
    }

    /// Remove a challenge together with its messages.
    pub async fn delete(&self, challenge_id: ChallengeId) -> Result<(), ApiError> {
        self.store("delete_challenge", move |db| db.delete_challenge(challenge_id))
            .await?;
        info!("Challenge {} deleted", challenge_id);

        self.rooms
            .publish(challenge_id, &RoomEvent::ChallengeDeleted { challenge_id });
        Ok(())
    }

    // -- Messages --

    pub async fn list_messages(&self, challenge_id: ChallengeId) -> Result<MessageSnapshot, ApiError> {
        self.store("list_messages", move |db| db.list_messages(challenge_id))
            .await
    }

    /// Store a message and publish the challenge's full list. Returns the new
    /// message and that list at the revision it was committed under.
    pub async fn post_message(
        &self,
        new: NewMessage,
    ) -> Result<(Message, MessageSnapshot), ApiError> {
        let (challenge_id, user_id) = (new.challenge_id, new.user_id);
        let (challenge, author) = self
            .store("lookup_post", move |db| {
                Ok((db.get_challenge(challenge_id)?, db.get_user_by_id(user_id)?))
            })
            .await?;
        if challenge.is_none() {
            return Err(ApiError::NotFound(format!("Challenge {} not found", challenge_id)));
        }
        if author.is_none() {
            return Err(ApiError::InvalidReference(format!("Unknown user {}", user_id)));
        }

        let (message, snapshot) = self
            .store("insert_message", move |db| db.insert_message_and_list(&new))
            .await?;
        info!(
            "Message {} posted to challenge {} by {}{}",
            message.id,
            challenge_id,
            user_id,
            if message.is_proof { " (proof)" } else { "" }
        );

        self.rooms
            .publish(challenge_id, &RoomEvent::update_messages(snapshot.clone()));
        Ok((message, snapshot))
    }

    pub async fn set_proof(&self, message_id: MessageId, is_proof: bool) -> Result<Message, ApiError> {
        let (message, snapshot) = self
            .store("set_message_proof", move |db| db.set_message_proof(message_id, is_proof))
            .await?;
        info!("Message {} proof flag set to {}", message_id, is_proof);

        self.rooms
            .publish(message.challenge_id, &RoomEvent::update_messages(snapshot));
        Ok(message)
    }

    /// Only a proof can be validated; un-validating is always allowed.
    pub async fn validate(&self, message_id: MessageId, is_validated: bool) -> Result<Message, ApiError> {
        if is_validated {
            let current = self
                .store("get_message", move |db| db.get_message(message_id))
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("Message {} not found", message_id)))?;
            if !current.is_proof {
                return Err(ApiError::Validation(
                    "Only a proof message can be validated".into(),
                ));
            }
        }

        let (message, snapshot) = self
            .store("set_message_validated", move |db| {
                db.set_message_validated(message_id, is_validated)
            })
            .await?;
        info!("Message {} validated flag set to {}", message_id, is_validated);

        self.rooms
            .publish(message.challenge_id, &RoomEvent::update_messages(snapshot));
        Ok(message)
    }

    /// `user_id` has read everything the other party wrote.
    pub async fn mark_read(
        &self,
        challenge_id: ChallengeId,
        user_id: UserId,
    ) -> Result<MessageSnapshot, ApiError> {
        let (changed, snapshot) = self
            .store("mark_messages_read", move |db| db.mark_messages_read(challenge_id, user_id))
            .await?;
        if changed > 0 {
            info!("User {} read {} messages in challenge {}", user_id, changed, challenge_id);
        }

        self.rooms.publish(
            challenge_id,
            &RoomEvent::MessagesRead {
                challenge_id,
                user_id,
            },
        );
        Ok(snapshot)
    }

    // -- Notifications --

    pub async fn notifications(&self, user_id: UserId) -> Result<Vec<Notification>, ApiError> {
        self.store("list_notifications", move |db| db.list_notifications(user_id))
            .await
    }

    pub async fn mark_notification_read(&self, id: NotificationId) -> Result<Notification, ApiError> {
        self.store("mark_notification_read", move |db| db.mark_notification_read(id))
            .await
    }

    /// Best-effort side effect of a state change.
    async fn notify(&self, user_id: UserId, text: String) {
        if let Err(e) = self
            .store("insert_notification", move |db| db.insert_notification(user_id, &text))
            .await
        {
            warn!("Could not notify user {}: {}", user_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tokio::sync::broadcast;
    use vouch_gateway::RoomMessage;
    use vouch_types::models::Frequency;

    use super::*;

    struct Fixture {
        service: ChallengeService,
        events: broadcast::Receiver<RoomMessage>,
        challenger: UserId,
        coach: UserId,
    }

    async fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let rooms = Rooms::new();
        let events = rooms.subscribe();
        let service = ChallengeService::new(db, rooms);
        let challenger = service.register("challenger", "password1").await.unwrap().id;
        let coach = service.register("coach", "password2").await.unwrap().id;
        Fixture {
            service,
            events,
            challenger,
            coach,
        }
    }

    fn thirty_days(user_id: UserId, coach_id: UserId) -> NewChallenge {
        NewChallenge {
            title: "30 Days".into(),
            description: "Push-ups every morning".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
            frequency: Frequency::Daily,
            proof_requirements: "Video".into(),
            user_id,
            coach_id,
        }
    }

    fn text(challenge_id: ChallengeId, user_id: UserId, body: &str) -> NewMessage {
        NewMessage {
            challenge_id,
            user_id,
            text: Some(body.into()),
            image_url: None,
            is_proof: false,
        }
    }

    fn next_event(rx: &mut broadcast::Receiver<RoomMessage>) -> (String, RoomEvent) {
        let msg = rx.try_recv().expect("an event was published");
        (msg.room.clone(), serde_json::from_str(&msg.json).unwrap())
    }

    #[tokio::test]
    async fn created_challenges_are_pending_with_fresh_ids() {
        let f = fixture().await;
        let a = f.service.create_challenge(thirty_days(f.challenger, f.coach)).await.unwrap();
        let b = f.service.create_challenge(thirty_days(f.challenger, f.coach)).await.unwrap();

        assert_eq!(a.status, ChallengeStatus::Pending);
        assert!(!a.archived);
        assert_ne!(a.id, b.id);

        let listed = f.service.list_challenges(f.challenger).await.unwrap();
        assert_eq!(listed.iter().filter(|c| c.id == a.id).count(), 1);
    }

    #[tokio::test]
    async fn create_rejects_bad_references_and_self_coaching() {
        let f = fixture().await;
        let err = f.service.create_challenge(thirty_days(f.challenger, 999)).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidReference(_)));

        let err = f
            .service
            .create_challenge(thirty_days(f.challenger, f.challenger))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let mut backwards = thirty_days(f.challenger, f.coach);
        backwards.end_date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let err = f.service.create_challenge(backwards).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn status_update_broadcasts_and_notifies() {
        let mut f = fixture().await;
        let c = f.service.create_challenge(thirty_days(f.challenger, f.coach)).await.unwrap();

        let updated = f.service.update_status(c.id, ChallengeStatus::Active).await.unwrap();
        assert_eq!(updated.status, ChallengeStatus::Active);

        let (room, event) = next_event(&mut f.events);
        assert_eq!(room, format!("challenge_{}", c.id));
        assert_eq!(
            event,
            RoomEvent::ChallengeStatusUpdated {
                challenge_id: c.id,
                status: ChallengeStatus::Active
            }
        );

        let listed = f.service.list_challenges(f.challenger).await.unwrap();
        assert_eq!(listed[0].status, ChallengeStatus::Active);

        let notes = f.service.notifications(f.challenger).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].message.contains("accepted"));
    }

    #[tokio::test]
    async fn status_update_rejects_pending_and_unknown_ids() {
        let f = fixture().await;
        let c = f.service.create_challenge(thirty_days(f.challenger, f.coach)).await.unwrap();
        assert!(matches!(
            f.service.update_status(c.id, ChallengeStatus::Pending).await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            f.service.update_status(404, ChallengeStatus::Rejected).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn reassign_always_resets_to_pending() {
        let mut f = fixture().await;
        let other = f.service.register("other-coach", "password3").await.unwrap().id;
        for status in [ChallengeStatus::Active, ChallengeStatus::Rejected] {
            let c = f.service.create_challenge(thirty_days(f.challenger, f.coach)).await.unwrap();
            f.service.update_status(c.id, status).await.unwrap();
            while f.events.try_recv().is_ok() {}

            let c = f.service.reassign_coach(c.id, other).await.unwrap();
            assert_eq!(c.status, ChallengeStatus::Pending);
            assert_eq!(c.coach_id, other);

            let (_, event) = next_event(&mut f.events);
            assert_eq!(
                event,
                RoomEvent::ChallengeStatusUpdated {
                    challenge_id: c.id,
                    status: ChallengeStatus::Pending
                }
            );
            let (_, event) = next_event(&mut f.events);
            assert_eq!(
                event,
                RoomEvent::CoachReassigned {
                    challenge_id: c.id,
                    coach_id: other
                }
            );
        }
        let notes = f.service.notifications(other).await.unwrap();
        assert_eq!(notes.len(), 2);
    }

    #[tokio::test]
    async fn archive_is_idempotent() {
        let f = fixture().await;
        let c = f.service.create_challenge(thirty_days(f.challenger, f.coach)).await.unwrap();
        f.service.update_status(c.id, ChallengeStatus::Active).await.unwrap();

        let first = f.service.archive(c.id).await.unwrap();
        let second = f.service.archive(c.id).await.unwrap();
        assert!(first.archived && second.archived);
        assert_eq!(second.status, ChallengeStatus::Active);

        let archive_notes = f
            .service
            .notifications(f.challenger)
            .await
            .unwrap()
            .into_iter()
            .filter(|n| n.message.contains("archived"))
            .count();
        assert_eq!(archive_notes, 1);
    }

    #[tokio::test]
    async fn posting_returns_and_broadcasts_the_full_list() {
        let mut f = fixture().await;
        let c = f.service.create_challenge(thirty_days(f.challenger, f.coach)).await.unwrap();

        f.service.post_message(text(c.id, f.challenger, "hi")).await.unwrap();
        let (msg, snapshot) = f.service.post_message(text(c.id, f.coach, "hello")).await.unwrap();
        assert!(!msg.is_read);
        assert_eq!(snapshot.revision, 2);
        let list = snapshot.messages;
        let texts: Vec<_> = list.iter().map(|m| m.text.as_deref().unwrap()).collect();
        assert_eq!(texts, vec!["hi", "hello"]);

        let _ = next_event(&mut f.events);
        let (_, event) = next_event(&mut f.events);
        match event {
            RoomEvent::UpdateMessages { challenge_id, revision, messages } => {
                assert_eq!(challenge_id, c.id);
                assert_eq!(revision, 2);
                assert_eq!(messages, list);
            }
            other => panic!("unexpected event {:?}", other),
        }

        let fetched = f.service.list_messages(c.id).await.unwrap();
        assert_eq!(fetched.revision, 2);
        assert_eq!(fetched.messages, list);
    }

    #[tokio::test]
    async fn posting_to_missing_challenge_is_not_found() {
        let f = fixture().await;
        let err = f.service.post_message(text(77, f.challenger, "hi")).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn proof_and_validation_force_unread() {
        let f = fixture().await;
        let c = f.service.create_challenge(thirty_days(f.challenger, f.coach)).await.unwrap();
        let (msg, _) = f.service.post_message(text(c.id, f.challenger, "done!")).await.unwrap();

        // Validating a non-proof is refused
        assert!(matches!(
            f.service.validate(msg.id, true).await,
            Err(ApiError::Validation(_))
        ));

        f.service.mark_read(c.id, f.coach).await.unwrap();
        let msg = f.service.set_proof(msg.id, true).await.unwrap();
        assert!(msg.is_proof && !msg.is_read);

        f.service.mark_read(c.id, f.coach).await.unwrap();
        let msg = f.service.validate(msg.id, true).await.unwrap();
        assert!(msg.is_validated && !msg.is_read);

        assert!(matches!(
            f.service.set_proof(9999, true).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn mark_read_only_touches_the_other_party() {
        let mut f = fixture().await;
        let c = f.service.create_challenge(thirty_days(f.challenger, f.coach)).await.unwrap();
        f.service.post_message(text(c.id, f.challenger, "mine")).await.unwrap();
        f.service.post_message(text(c.id, f.coach, "theirs")).await.unwrap();
        while f.events.try_recv().is_ok() {}

        let snapshot = f.service.mark_read(c.id, f.challenger).await.unwrap();
        assert_eq!(snapshot.revision, 3);
        for m in &snapshot.messages {
            assert_eq!(m.is_read, m.user_id == f.coach);
        }

        let (_, event) = next_event(&mut f.events);
        assert_eq!(
            event,
            RoomEvent::MessagesRead {
                challenge_id: c.id,
                user_id: f.challenger
            }
        );
    }

    #[tokio::test]
    async fn login_checks_the_hash() {
        let f = fixture().await;
        let user = f.service.authenticate("coach", "password2").await.unwrap();
        assert_eq!(user.id, f.coach);
        assert!(matches!(
            f.service.authenticate("coach", "wrong-pass").await,
            Err(ApiError::Authentication)
        ));
        assert!(matches!(
            f.service.authenticate("ghost", "password2").await,
            Err(ApiError::Authentication)
        ));
        assert!(matches!(
            f.service.register("coach", "password9").await,
            Err(ApiError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_messages_and_tells_the_room() {
        let mut f = fixture().await;
        let c = f.service.create_challenge(thirty_days(f.challenger, f.coach)).await.unwrap();
        f.service.post_message(text(c.id, f.challenger, "hi")).await.unwrap();
        while f.events.try_recv().is_ok() {}

        f.service.delete(c.id).await.unwrap();
        let (room, event) = next_event(&mut f.events);
        assert_eq!(room, format!("challenge_{}", c.id));
        assert_eq!(event, RoomEvent::ChallengeDeleted { challenge_id: c.id });

        assert!(matches!(f.service.list_messages(c.id).await, Err(ApiError::NotFound(_))));
        assert!(matches!(f.service.delete(c.id).await, Err(ApiError::NotFound(_))));
    }
}
