//! Optimistic editing on top of [`SyncState`].
//!
//! Each edit is applied locally first, then sent. A successful response
//! overwrites the local copy with the server's. A failed call is logged and
//! the local edit stays in place, so the caller can retry or re-fetch with one
//! of the `resync_*` methods.

use chrono::Utc;
use tracing::{debug, warn};

use vouch_types::api::{CreateChallengeRequest, PostMessageRequest};
use vouch_types::events::RoomEvent;
use vouch_types::models::{
    Challenge, ChallengeId, ChallengeStatus, Message, MessageId, NewChallenge, Notification,
    NotificationId, UserId,
};

use crate::client::ChallengeApi;
use crate::error::ClientError;
use crate::state::{Action, Draft, SyncState};

pub struct Session<A> {
    api: A,
    state: SyncState,
    /// Local challenges get negative ids until the server assigns one.
    next_temp_id: ChallengeId,
    next_draft_id: u64,
}

impl<A: ChallengeApi> Session<A> {
    pub fn new(api: A, user_id: UserId) -> Self {
        Self {
            api,
            state: SyncState::new(user_id),
            next_temp_id: -1,
            next_draft_id: 1,
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    // -- Recovery --

    pub async fn resync_challenges(&mut self) -> Result<(), ClientError> {
        let fetched = self.api.list_challenges(self.state.user_id()).await?;
        self.state.apply(Action::ChallengesFetched(fetched));
        Ok(())
    }

    pub async fn resync_messages(&mut self, challenge_id: ChallengeId) -> Result<(), ClientError> {
        let snapshot = self.api.list_messages(challenge_id).await?;
        self.state.apply(Action::MessagesFetched {
            challenge_id,
            revision: Some(snapshot.revision),
            messages: snapshot.messages,
        });
        Ok(())
    }

    pub async fn resync_notifications(&mut self) -> Result<(), ClientError> {
        let notifications = self.api.notifications(self.state.user_id()).await?;
        self.state.apply(Action::NotificationsFetched(notifications));
        Ok(())
    }

    /// Re-fetch challenges, every thread already held, and notifications.
    pub async fn resync_all(&mut self) -> Result<(), ClientError> {
        self.resync_challenges().await?;
        let held: Vec<ChallengeId> = self
            .state
            .visible_challenges()
            .iter()
            .chain(self.state.archived_challenges().iter())
            .map(|c| c.id)
            .filter(|id| *id > 0 && self.state.thread(*id).is_some())
            .collect();
        for challenge_id in held {
            self.resync_messages(challenge_id).await?;
        }
        self.resync_notifications().await
    }

    /// Apply an event received from a joined room.
    pub async fn handle_event(&mut self, event: RoomEvent) -> Result<(), ClientError> {
        match event {
            RoomEvent::Resync => {
                debug!("Room socket fell behind, re-fetching");
                self.resync_all().await
            }
            RoomEvent::ChallengeStatusUpdated { challenge_id, .. }
                if self.state.challenge(challenge_id).is_none() =>
            {
                self.resync_challenges().await
            }
            // Handed to us: only a fetch has the rest of the row
            RoomEvent::CoachReassigned {
                challenge_id,
                coach_id,
            } if coach_id == self.state.user_id()
                && self.state.challenge(challenge_id).is_none() =>
            {
                self.resync_challenges().await
            }
            other => {
                self.state.apply(Action::Event(other));
                Ok(())
            }
        }
    }

    // -- Challenges --

    pub async fn create_challenge(
        &mut self,
        req: CreateChallengeRequest,
    ) -> Result<Challenge, ClientError> {
        // Only a complete request gets a local row; the server reports the rest
        let temp_id = match req.clone().into_new_challenge() {
            Ok(new) => {
                let temp_id = self.next_temp_id;
                self.next_temp_id -= 1;
                self.state
                    .apply(Action::CreateLocally(local_challenge(temp_id, new)));
                Some(temp_id)
            }
            Err(_) => None,
        };

        match self.api.create_challenge(&req).await {
            Ok(challenge) => {
                let action = match temp_id {
                    Some(temp_id) => Action::CreateConfirmed {
                        temp_id,
                        challenge: challenge.clone(),
                    },
                    None => Action::ChallengeStored(challenge.clone()),
                };
                self.state.apply(action);
                Ok(challenge)
            }
            Err(e) => Err(self.rejected("create challenge", None, e)),
        }
    }

    pub async fn set_status(
        &mut self,
        challenge_id: ChallengeId,
        status: ChallengeStatus,
    ) -> Result<Challenge, ClientError> {
        self.state.apply(Action::SetStatus {
            challenge_id,
            status,
        });
        let result = self.api.update_status(challenge_id, status).await;
        self.reconcile_challenge("update status", challenge_id, result)
    }

    pub async fn accept(&mut self, challenge_id: ChallengeId) -> Result<Challenge, ClientError> {
        self.set_status(challenge_id, ChallengeStatus::Active).await
    }

    pub async fn reject(&mut self, challenge_id: ChallengeId) -> Result<Challenge, ClientError> {
        self.set_status(challenge_id, ChallengeStatus::Rejected).await
    }

    pub async fn reassign_coach(
        &mut self,
        challenge_id: ChallengeId,
        coach_id: UserId,
    ) -> Result<Challenge, ClientError> {
        self.state.apply(Action::ReassignCoach {
            challenge_id,
            coach_id,
        });
        let result = self.api.reassign_coach(challenge_id, coach_id).await;
        self.reconcile_challenge("reassign coach", challenge_id, result)
    }

    pub async fn archive(&mut self, challenge_id: ChallengeId) -> Result<Challenge, ClientError> {
        self.state.apply(Action::Archive { challenge_id });
        let result = self.api.archive(challenge_id).await;
        self.reconcile_challenge("archive", challenge_id, result)
    }

    pub async fn delete_challenge(&mut self, challenge_id: ChallengeId) -> Result<(), ClientError> {
        match self.api.delete_challenge(challenge_id).await {
            Ok(()) => {
                self.state.apply(Action::ChallengeRemoved(challenge_id));
                Ok(())
            }
            Err(e) => Err(self.rejected("delete challenge", Some(challenge_id), e)),
        }
    }

    fn reconcile_challenge(
        &mut self,
        op: &str,
        challenge_id: ChallengeId,
        result: Result<Challenge, ClientError>,
    ) -> Result<Challenge, ClientError> {
        match result {
            Ok(challenge) => {
                self.state.apply(Action::ChallengeStored(challenge.clone()));
                Ok(challenge)
            }
            Err(e) => Err(self.rejected(op, Some(challenge_id), e)),
        }
    }

    // -- Messages --

    /// Post a message as the signed-in user. Returns the stored message.
    pub async fn post_message(
        &mut self,
        challenge_id: ChallengeId,
        text: Option<String>,
        image_url: Option<String>,
        is_proof: bool,
    ) -> Result<Message, ClientError> {
        let local_id = self.next_draft_id;
        self.next_draft_id += 1;
        let draft = Draft {
            local_id,
            user_id: self.state.user_id(),
            text,
            image_url,
            is_proof,
            created_at: Utc::now(),
            failed: false,
        };
        self.state.apply(Action::PostDraft {
            challenge_id,
            draft: draft.clone(),
        });
        self.send_draft(challenge_id, draft).await
    }

    /// Send a failed draft again.
    pub async fn retry_draft(
        &mut self,
        challenge_id: ChallengeId,
        local_id: u64,
    ) -> Result<Option<Message>, ClientError> {
        let draft = self
            .state
            .thread(challenge_id)
            .and_then(|t| t.drafts.iter().find(|d| d.local_id == local_id))
            .cloned();
        match draft {
            Some(draft) => self.send_draft(challenge_id, draft).await.map(Some),
            None => Ok(None),
        }
    }

    async fn send_draft(
        &mut self,
        challenge_id: ChallengeId,
        draft: Draft,
    ) -> Result<Message, ClientError> {
        let req = PostMessageRequest {
            user_id: draft.user_id,
            text: draft.text,
            image_url: draft.image_url,
            is_proof: Some(draft.is_proof),
        };
        match self.api.post_message(challenge_id, &req).await {
            Ok((message, snapshot)) => {
                self.state.apply(Action::DraftConfirmed {
                    challenge_id,
                    local_id: draft.local_id,
                    revision: Some(snapshot.revision),
                    messages: snapshot.messages,
                });
                Ok(message)
            }
            Err(e) => {
                self.state.apply(Action::DraftFailed {
                    challenge_id,
                    local_id: draft.local_id,
                });
                Err(self.rejected("post message", None, e))
            }
        }
    }

    pub async fn set_proof(
        &mut self,
        message_id: MessageId,
        is_proof: bool,
    ) -> Result<Message, ClientError> {
        self.state.apply(Action::SetProof {
            message_id,
            is_proof,
        });
        let result = self.api.set_proof(message_id, is_proof).await;
        self.reconcile_message("set proof", result).await
    }

    pub async fn validate(
        &mut self,
        message_id: MessageId,
        is_validated: bool,
    ) -> Result<Message, ClientError> {
        self.state.apply(Action::Validate {
            message_id,
            is_validated,
        });
        let result = self.api.validate(message_id, is_validated).await;
        self.reconcile_message("validate", result).await
    }

    /// A single message carries no list revision, so the thread is re-read
    /// afterwards to get past any broadcast that predates the edit.
    async fn reconcile_message(
        &mut self,
        op: &str,
        result: Result<Message, ClientError>,
    ) -> Result<Message, ClientError> {
        match result {
            Ok(message) => {
                self.state.apply(Action::MessageStored(message.clone()));
                if let Err(e) = self.resync_messages(message.challenge_id).await {
                    warn!(
                        "Could not re-read challenge {} after {}: {}",
                        message.challenge_id, op, e
                    );
                }
                Ok(message)
            }
            Err(e) => Err(self.rejected(op, None, e)),
        }
    }

    /// Mark the other party's messages in a thread as read.
    pub async fn mark_read(&mut self, challenge_id: ChallengeId) -> Result<(), ClientError> {
        let reader_id = self.state.user_id();
        self.state.apply(Action::MarkRead {
            challenge_id,
            reader_id,
        });
        match self.api.mark_read(challenge_id, reader_id).await {
            Ok(snapshot) => {
                self.state.apply(Action::MessagesFetched {
                    challenge_id,
                    revision: Some(snapshot.revision),
                    messages: snapshot.messages,
                });
                Ok(())
            }
            Err(e) => Err(self.rejected("mark read", Some(challenge_id), e)),
        }
    }

    // -- Notifications --

    pub async fn mark_notification_read(
        &mut self,
        id: NotificationId,
    ) -> Result<Notification, ClientError> {
        match self.api.mark_notification_read(id).await {
            Ok(notification) => {
                self.state
                    .apply(Action::NotificationStored(notification.clone()));
                Ok(notification)
            }
            Err(e) => Err(self.rejected("mark notification read", None, e)),
        }
    }

    /// A call failed. The local edit stays; a 404 on a challenge means it is
    /// gone on the server, so the local row goes too.
    fn rejected(&mut self, op: &str, challenge_id: Option<ChallengeId>, err: ClientError) -> ClientError {
        warn!("{} failed, keeping local state: {}", op, err);
        if let (Some(challenge_id), Some(404)) = (challenge_id, err.status()) {
            self.state.apply(Action::ChallengeRemoved(challenge_id));
        }
        err
    }
}

fn local_challenge(temp_id: ChallengeId, new: NewChallenge) -> Challenge {
    Challenge {
        id: temp_id,
        title: new.title,
        description: new.description,
        start_date: new.start_date,
        end_date: new.end_date,
        frequency: new.frequency,
        proof_requirements: new.proof_requirements,
        status: ChallengeStatus::Pending,
        user_id: new.user_id,
        coach_id: new.coach_id,
        created_at: Utc::now(),
        archived: false,
    }
}
