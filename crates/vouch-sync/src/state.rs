use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use vouch_types::events::RoomEvent;
use vouch_types::models::{
    Challenge, ChallengeId, ChallengeStatus, Message, MessageId, Notification, UserId,
};

/// Where the current copy of a challenge came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Last written by a server response or broadcast.
    Server,
    /// Carries a local edit (or creation) the server has not confirmed.
    Optimistic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedChallenge {
    pub challenge: Challenge,
    pub origin: Origin,
}

impl TrackedChallenge {
    fn server(challenge: Challenge) -> Self {
        Self {
            challenge,
            origin: Origin::Server,
        }
    }
}

/// A message posted locally and not yet part of a server snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub local_id: u64,
    pub user_id: UserId,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub is_proof: bool,
    pub created_at: DateTime<Utc>,
    /// The post was rejected; the draft stays so it can be retried.
    pub failed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Thread {
    pub messages: Vec<Message>,
    /// Revision of the newest list applied. Unknown until a list that
    /// carries one arrives.
    pub revision: Option<i64>,
    pub drafts: Vec<Draft>,
}

impl Thread {
    pub fn mark(&self) -> SnapshotMark {
        SnapshotMark::of(&self.messages, self.revision)
    }
}

/// What the ordering rule needs to know about a message list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotMark {
    pub max_message_id: Option<MessageId>,
    pub revision: Option<i64>,
}

impl SnapshotMark {
    pub fn of(messages: &[Message], revision: Option<i64>) -> Self {
        Self {
            max_message_id: messages.iter().map(|m| m.id).max(),
            revision,
        }
    }
}

/// Should `incoming` replace `held`?
///
/// The higher max message id wins. On an equal max id the higher revision
/// wins. When either side carries no revision the incoming list is taken,
/// since there is nothing to order it by.
pub fn snapshot_supersedes(held: SnapshotMark, incoming: SnapshotMark) -> bool {
    match incoming.max_message_id.cmp(&held.max_message_id) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => match (held.revision, incoming.revision) {
            (Some(held), Some(incoming)) => incoming >= held,
            _ => true,
        },
    }
}

/// Merge a fetched challenge list into the local one.
///
/// Fetched rows replace local rows by id. Unconfirmed creates (negative
/// temp ids) survive. Any row with a server id the fetch no longer returns is
/// dropped, pending edit or not: the server deleted it or handed it away.
pub fn merge_challenges(
    local: &BTreeMap<ChallengeId, TrackedChallenge>,
    fetched: Vec<Challenge>,
) -> BTreeMap<ChallengeId, TrackedChallenge> {
    let mut merged: BTreeMap<ChallengeId, TrackedChallenge> = local
        .iter()
        .filter(|(id, tracked)| **id < 0 && tracked.origin == Origin::Optimistic)
        .map(|(id, tracked)| (*id, tracked.clone()))
        .collect();

    for challenge in fetched {
        merged.insert(challenge.id, TrackedChallenge::server(challenge));
    }
    merged
}

/// Everything that can change [`SyncState`].
#[derive(Debug, Clone)]
pub enum Action {
    // -- Authoritative data --
    ChallengesFetched(Vec<Challenge>),
    ChallengeStored(Challenge),
    ChallengeRemoved(ChallengeId),
    CreateConfirmed {
        temp_id: ChallengeId,
        challenge: Challenge,
    },
    MessagesFetched {
        challenge_id: ChallengeId,
        revision: Option<i64>,
        messages: Vec<Message>,
    },
    MessageStored(Message),
    DraftConfirmed {
        challenge_id: ChallengeId,
        local_id: u64,
        revision: Option<i64>,
        messages: Vec<Message>,
    },
    NotificationsFetched(Vec<Notification>),
    NotificationStored(Notification),
    Event(RoomEvent),

    // -- Optimistic edits --
    CreateLocally(Challenge),
    SetStatus {
        challenge_id: ChallengeId,
        status: ChallengeStatus,
    },
    ReassignCoach {
        challenge_id: ChallengeId,
        coach_id: UserId,
    },
    Archive {
        challenge_id: ChallengeId,
    },
    PostDraft {
        challenge_id: ChallengeId,
        draft: Draft,
    },
    DraftFailed {
        challenge_id: ChallengeId,
        local_id: u64,
    },
    SetProof {
        message_id: MessageId,
        is_proof: bool,
    },
    Validate {
        message_id: MessageId,
        is_validated: bool,
    },
    MarkRead {
        challenge_id: ChallengeId,
        reader_id: UserId,
    },
}

/// Client-side view of one user's challenges, threads and notifications.
#[derive(Debug, Clone)]
pub struct SyncState {
    user_id: UserId,
    challenges: BTreeMap<ChallengeId, TrackedChallenge>,
    threads: BTreeMap<ChallengeId, Thread>,
    notifications: Vec<Notification>,
}

impl SyncState {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            challenges: BTreeMap::new(),
            threads: BTreeMap::new(),
            notifications: Vec::new(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn apply(&mut self, action: Action) {
        match action {
            Action::ChallengesFetched(fetched) => {
                self.challenges = merge_challenges(&self.challenges, fetched);
            }
            Action::ChallengeStored(challenge) => {
                self.challenges
                    .insert(challenge.id, TrackedChallenge::server(challenge));
            }
            Action::ChallengeRemoved(challenge_id) => {
                self.challenges.remove(&challenge_id);
                self.threads.remove(&challenge_id);
            }
            Action::CreateConfirmed { temp_id, challenge } => {
                self.challenges.remove(&temp_id);
                self.challenges
                    .insert(challenge.id, TrackedChallenge::server(challenge));
            }
            Action::MessagesFetched {
                challenge_id,
                revision,
                messages,
            } => self.apply_snapshot(challenge_id, messages, revision),
            Action::MessageStored(message) => self.store_message(message),
            Action::DraftConfirmed {
                challenge_id,
                local_id,
                revision,
                messages,
            } => {
                let thread = self.threads.entry(challenge_id).or_default();
                thread.drafts.retain(|d| d.local_id != local_id);
                self.apply_snapshot(challenge_id, messages, revision);
            }
            Action::NotificationsFetched(notifications) => self.notifications = notifications,
            Action::NotificationStored(notification) => {
                match self.notifications.iter_mut().find(|n| n.id == notification.id) {
                    Some(existing) => *existing = notification,
                    None => self.notifications.insert(0, notification),
                }
            }
            Action::Event(event) => self.apply_event(event),

            Action::CreateLocally(challenge) => {
                self.challenges.insert(
                    challenge.id,
                    TrackedChallenge {
                        challenge,
                        origin: Origin::Optimistic,
                    },
                );
            }
            Action::SetStatus {
                challenge_id,
                status,
            } => self.edit_challenge(challenge_id, |c| c.status = status),
            Action::ReassignCoach {
                challenge_id,
                coach_id,
            } => self.edit_challenge(challenge_id, |c| {
                c.coach_id = coach_id;
                c.status = ChallengeStatus::Pending;
            }),
            Action::Archive { challenge_id } => {
                self.edit_challenge(challenge_id, |c| c.archived = true)
            }
            Action::PostDraft {
                challenge_id,
                draft,
            } => self.threads.entry(challenge_id).or_default().drafts.push(draft),
            Action::DraftFailed {
                challenge_id,
                local_id,
            } => {
                if let Some(draft) = self
                    .threads
                    .get_mut(&challenge_id)
                    .and_then(|t| t.drafts.iter_mut().find(|d| d.local_id == local_id))
                {
                    draft.failed = true;
                }
            }
            Action::SetProof {
                message_id,
                is_proof,
            } => self.edit_message(message_id, |m| {
                m.is_proof = is_proof;
                if !is_proof {
                    m.is_validated = false;
                }
                m.is_read = false;
            }),
            Action::Validate {
                message_id,
                is_validated,
            } => self.edit_message(message_id, |m| {
                m.is_validated = is_validated;
                m.is_read = false;
            }),
            Action::MarkRead {
                challenge_id,
                reader_id,
            } => self.mark_read(challenge_id, reader_id),
        }
    }

    fn apply_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::ChallengeStatusUpdated {
                challenge_id,
                status,
            } => {
                if let Some(tracked) = self.challenges.get_mut(&challenge_id) {
                    tracked.challenge.status = status;
                }
            }
            RoomEvent::CoachReassigned {
                challenge_id,
                coach_id,
            } => {
                let Some(tracked) = self.challenges.get_mut(&challenge_id) else {
                    return;
                };
                tracked.challenge.coach_id = coach_id;
                tracked.challenge.status = ChallengeStatus::Pending;
                if !tracked.challenge.involves(self.user_id) {
                    debug!("No longer part of challenge {}, dropping it", challenge_id);
                    self.challenges.remove(&challenge_id);
                    self.threads.remove(&challenge_id);
                }
            }
            RoomEvent::ChallengeDeleted { challenge_id } => {
                self.challenges.remove(&challenge_id);
                self.threads.remove(&challenge_id);
            }
            RoomEvent::UpdateMessages {
                challenge_id,
                revision,
                messages,
            } => self.apply_snapshot(challenge_id, messages, Some(revision)),
            RoomEvent::MessagesRead {
                challenge_id,
                user_id,
            } => self.mark_read(challenge_id, user_id),
            RoomEvent::Joined { .. } | RoomEvent::Resync => {}
        }
    }

    fn apply_snapshot(
        &mut self,
        challenge_id: ChallengeId,
        messages: Vec<Message>,
        revision: Option<i64>,
    ) {
        let thread = self.threads.entry(challenge_id).or_default();
        let incoming = SnapshotMark::of(&messages, revision);
        if !snapshot_supersedes(thread.mark(), incoming) {
            debug!(
                "Ignoring stale snapshot for challenge {} ({:?} behind {:?})",
                challenge_id,
                incoming,
                thread.mark()
            );
            return;
        }
        thread.messages = messages;
        if revision.is_some() {
            thread.revision = revision;
        }
    }

    fn store_message(&mut self, message: Message) {
        let thread = self.threads.entry(message.challenge_id).or_default();
        match thread.messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message,
            None => {
                thread.messages.push(message);
                thread
                    .messages
                    .sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            }
        }
    }

    fn edit_challenge(&mut self, challenge_id: ChallengeId, edit: impl FnOnce(&mut Challenge)) {
        if let Some(tracked) = self.challenges.get_mut(&challenge_id) {
            edit(&mut tracked.challenge);
            tracked.origin = Origin::Optimistic;
        }
    }

    fn edit_message(&mut self, message_id: MessageId, edit: impl FnOnce(&mut Message)) {
        if let Some(message) = self
            .threads
            .values_mut()
            .flat_map(|t| t.messages.iter_mut())
            .find(|m| m.id == message_id)
        {
            edit(message);
        }
    }

    /// Everything in the thread not written by `reader_id` is now read.
    fn mark_read(&mut self, challenge_id: ChallengeId, reader_id: UserId) {
        if let Some(thread) = self.threads.get_mut(&challenge_id) {
            for message in thread.messages.iter_mut().filter(|m| m.user_id != reader_id) {
                message.is_read = true;
            }
        }
    }

    // -- Views --

    pub fn challenge(&self, challenge_id: ChallengeId) -> Option<&TrackedChallenge> {
        self.challenges.get(&challenge_id)
    }

    /// Challenges not archived, newest first.
    pub fn visible_challenges(&self) -> Vec<&Challenge> {
        self.sorted_challenges(|c| !c.archived)
    }

    pub fn archived_challenges(&self) -> Vec<&Challenge> {
        self.sorted_challenges(|c| c.archived)
    }

    fn sorted_challenges(&self, keep: impl Fn(&Challenge) -> bool) -> Vec<&Challenge> {
        let mut list: Vec<&Challenge> = self
            .challenges
            .values()
            .map(|t| &t.challenge)
            .filter(|c| keep(c))
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        list
    }

    pub fn thread(&self, challenge_id: ChallengeId) -> Option<&Thread> {
        self.threads.get(&challenge_id)
    }

    pub fn messages(&self, challenge_id: ChallengeId) -> &[Message] {
        self.threads
            .get(&challenge_id)
            .map(|t| t.messages.as_slice())
            .unwrap_or_default()
    }

    /// Messages in the thread the signed-in user has not read yet.
    pub fn unread_count(&self, challenge_id: ChallengeId) -> usize {
        self.messages(challenge_id)
            .iter()
            .filter(|m| m.user_id != self.user_id && !m.is_read)
            .count()
    }

    /// Unvalidated proofs waiting on the signed-in user as coach.
    pub fn pending_proofs(&self) -> Vec<&Message> {
        self.challenges
            .values()
            .map(|t| &t.challenge)
            .filter(|c| c.coach_id == self.user_id && !c.archived)
            .flat_map(|c| self.messages(c.id))
            .filter(|m| m.is_proof && !m.is_validated)
            .collect()
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn unread_notifications(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};
    use vouch_types::models::Frequency;

    pub fn challenge(id: ChallengeId, user_id: UserId, coach_id: UserId) -> Challenge {
        Challenge {
            id,
            title: format!("Challenge {}", id),
            description: "Do the thing".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 30).unwrap(),
            frequency: Frequency::Daily,
            proof_requirements: "A photo".into(),
            status: ChallengeStatus::Pending,
            user_id,
            coach_id,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(id),
            archived: false,
        }
    }

    pub fn message(id: MessageId, challenge_id: ChallengeId, user_id: UserId) -> Message {
        Message {
            id,
            challenge_id,
            user_id,
            text: Some(format!("message {}", id)),
            image_url: None,
            is_proof: false,
            is_validated: false,
            created_at: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap() + Duration::seconds(id),
            is_read: false,
        }
    }

    fn mark(max: Option<MessageId>, revision: Option<i64>) -> SnapshotMark {
        SnapshotMark {
            max_message_id: max,
            revision,
        }
    }

    #[test]
    fn supersede_rule() {
        assert!(snapshot_supersedes(mark(Some(3), Some(9)), mark(Some(4), Some(1))));
        assert!(!snapshot_supersedes(mark(Some(4), Some(1)), mark(Some(3), Some(9))));
        assert!(snapshot_supersedes(mark(Some(4), Some(5)), mark(Some(4), Some(6))));
        assert!(!snapshot_supersedes(mark(Some(4), Some(6)), mark(Some(4), Some(5))));
        assert!(snapshot_supersedes(mark(None, None), mark(Some(1), Some(1))));
        // A list without a revision has nothing to lose to
        assert!(snapshot_supersedes(mark(Some(4), Some(6)), mark(Some(4), None)));
    }

    #[test]
    fn merge_keeps_optimistic_and_drops_vanished_server_rows() {
        let mut local = BTreeMap::new();
        local.insert(1, TrackedChallenge::server(challenge(1, 1, 2)));
        local.insert(2, TrackedChallenge::server(challenge(2, 1, 2)));
        local.insert(
            -1,
            TrackedChallenge {
                challenge: challenge(-1, 1, 2),
                origin: Origin::Optimistic,
            },
        );

        let mut fresh = challenge(1, 1, 2);
        fresh.status = ChallengeStatus::Active;
        let merged = merge_challenges(&local, vec![fresh, challenge(3, 2, 1)]);

        assert_eq!(merged.keys().copied().collect::<Vec<_>>(), vec![-1, 1, 3]);
        assert_eq!(merged[&1].challenge.status, ChallengeStatus::Active);
        assert_eq!(merged[&1].origin, Origin::Server);
        assert_eq!(merged[&-1].origin, Origin::Optimistic);
    }

    #[test]
    fn fetch_drops_edited_rows_the_server_no_longer_returns() {
        let mut state = SyncState::new(1);
        state.apply(Action::ChallengesFetched(vec![challenge(5, 1, 2)]));
        state.apply(Action::SetStatus {
            challenge_id: 5,
            status: ChallengeStatus::Active,
        });
        assert_eq!(state.challenge(5).unwrap().origin, Origin::Optimistic);

        // Deleted on the server while the edit was in flight
        state.apply(Action::ChallengesFetched(vec![]));
        assert!(state.challenge(5).is_none());
        assert!(state.visible_challenges().is_empty());
    }

    #[test]
    fn stale_broadcast_never_overwrites_fresher_snapshot() {
        let mut state = SyncState::new(1);
        let fresh = vec![message(1, 7, 1), message(2, 7, 2)];
        state.apply(Action::Event(RoomEvent::UpdateMessages {
            challenge_id: 7,
            revision: 5,
            messages: fresh.clone(),
        }));

        // Older list, arriving late
        state.apply(Action::Event(RoomEvent::UpdateMessages {
            challenge_id: 7,
            revision: 4,
            messages: vec![message(1, 7, 1)],
        }));
        assert_eq!(state.messages(7), fresh.as_slice());

        // Same messages, older revision: a flag toggle that was overtaken
        let mut toggled = fresh.clone();
        toggled[0].is_proof = true;
        state.apply(Action::Event(RoomEvent::UpdateMessages {
            challenge_id: 7,
            revision: 3,
            messages: toggled.clone(),
        }));
        assert!(!state.messages(7)[0].is_proof);

        state.apply(Action::Event(RoomEvent::UpdateMessages {
            challenge_id: 7,
            revision: 6,
            messages: toggled,
        }));
        assert!(state.messages(7)[0].is_proof);
        assert_eq!(state.thread(7).unwrap().revision, Some(6));
    }

    #[test]
    fn fetched_revision_fends_off_stale_broadcast() {
        let mut state = SyncState::new(1);
        let mut proof = message(1, 7, 1);
        proof.is_proof = true;
        state.apply(Action::MessagesFetched {
            challenge_id: 7,
            revision: Some(2),
            messages: vec![proof],
        });

        // Broadcast of the list before the proof flag was set
        state.apply(Action::Event(RoomEvent::UpdateMessages {
            challenge_id: 7,
            revision: 1,
            messages: vec![message(1, 7, 1)],
        }));
        assert!(state.messages(7)[0].is_proof);
        assert_eq!(state.thread(7).unwrap().revision, Some(2));

        // Same for the list a post returned
        state.apply(Action::DraftConfirmed {
            challenge_id: 7,
            local_id: 1,
            revision: Some(4),
            messages: vec![message(1, 7, 1), message(2, 7, 2)],
        });
        let mut stale = vec![message(1, 7, 1), message(2, 7, 2)];
        stale[1].is_read = true;
        state.apply(Action::Event(RoomEvent::UpdateMessages {
            challenge_id: 7,
            revision: 3,
            messages: stale,
        }));
        assert!(!state.messages(7)[1].is_read);
    }

    #[test]
    fn reassign_and_delete_events() {
        let mut state = SyncState::new(2);
        let mut active = challenge(7, 1, 2);
        active.status = ChallengeStatus::Active;
        state.apply(Action::ChallengesFetched(vec![active, challenge(8, 2, 3)]));
        state.apply(Action::MessagesFetched {
            challenge_id: 7,
            revision: Some(1),
            messages: vec![message(1, 7, 1)],
        });

        // Challenge 8 moves to another coach; user 2 is still its challenger
        state.apply(Action::Event(RoomEvent::CoachReassigned {
            challenge_id: 8,
            coach_id: 4,
        }));
        let kept = &state.challenge(8).unwrap().challenge;
        assert_eq!(kept.coach_id, 4);
        assert_eq!(kept.status, ChallengeStatus::Pending);

        // User 2 stops coaching challenge 7
        state.apply(Action::Event(RoomEvent::CoachReassigned {
            challenge_id: 7,
            coach_id: 3,
        }));
        assert!(state.challenge(7).is_none());
        assert!(state.thread(7).is_none());

        state.apply(Action::Event(RoomEvent::ChallengeDeleted { challenge_id: 8 }));
        assert!(state.challenge(8).is_none());
    }

    #[test]
    fn optimistic_edits_mark_the_row() {
        let mut state = SyncState::new(1);
        state.apply(Action::ChallengesFetched(vec![challenge(1, 1, 2)]));
        assert_eq!(state.challenge(1).unwrap().origin, Origin::Server);

        state.apply(Action::ReassignCoach {
            challenge_id: 1,
            coach_id: 3,
        });
        let tracked = state.challenge(1).unwrap();
        assert_eq!(tracked.origin, Origin::Optimistic);
        assert_eq!(tracked.challenge.coach_id, 3);
        assert_eq!(tracked.challenge.status, ChallengeStatus::Pending);

        state.apply(Action::Archive { challenge_id: 1 });
        assert!(state.visible_challenges().is_empty());
        assert_eq!(state.archived_challenges().len(), 1);

        let mut confirmed = challenge(1, 1, 3);
        confirmed.archived = true;
        state.apply(Action::ChallengeStored(confirmed));
        assert_eq!(state.challenge(1).unwrap().origin, Origin::Server);
    }

    #[test]
    fn visible_challenges_are_newest_first() {
        let mut state = SyncState::new(1);
        state.apply(Action::ChallengesFetched(vec![
            challenge(1, 1, 2),
            challenge(3, 1, 2),
            challenge(2, 2, 1),
        ]));
        let ids: Vec<_> = state.visible_challenges().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn read_receipts_and_unread_count() {
        let mut state = SyncState::new(1);
        state.apply(Action::MessagesFetched {
            challenge_id: 7,
            revision: Some(3),
            messages: vec![message(1, 7, 1), message(2, 7, 2), message(3, 7, 2)],
        });
        assert_eq!(state.unread_count(7), 2);

        // The other party read ours; our own unread count does not move
        state.apply(Action::Event(RoomEvent::MessagesRead {
            challenge_id: 7,
            user_id: 2,
        }));
        assert!(state.messages(7)[0].is_read);
        assert_eq!(state.unread_count(7), 2);

        state.apply(Action::MarkRead {
            challenge_id: 7,
            reader_id: 1,
        });
        assert_eq!(state.unread_count(7), 0);
    }

    #[test]
    fn proof_edits_and_pending_proofs() {
        let mut state = SyncState::new(2);
        state.apply(Action::ChallengesFetched(vec![challenge(7, 1, 2)]));
        let mut proof = message(1, 7, 1);
        proof.is_proof = true;
        state.apply(Action::MessagesFetched {
            challenge_id: 7,
            revision: Some(2),
            messages: vec![proof, message(2, 7, 1)],
        });
        assert_eq!(state.pending_proofs().len(), 1);

        state.apply(Action::Validate {
            message_id: 1,
            is_validated: true,
        });
        assert!(state.pending_proofs().is_empty());

        state.apply(Action::SetProof {
            message_id: 1,
            is_proof: false,
        });
        let first = &state.messages(7)[0];
        assert!(!first.is_proof);
        assert!(!first.is_validated);
    }

    #[test]
    fn draft_lifecycle() {
        let mut state = SyncState::new(1);
        let draft = Draft {
            local_id: 1,
            user_id: 1,
            text: Some("hi".into()),
            image_url: None,
            is_proof: false,
            created_at: Utc::now(),
            failed: false,
        };
        state.apply(Action::PostDraft {
            challenge_id: 7,
            draft,
        });
        state.apply(Action::DraftFailed {
            challenge_id: 7,
            local_id: 1,
        });
        assert!(state.thread(7).unwrap().drafts[0].failed);

        state.apply(Action::DraftConfirmed {
            challenge_id: 7,
            local_id: 1,
            revision: Some(1),
            messages: vec![message(1, 7, 1)],
        });
        let thread = state.thread(7).unwrap();
        assert!(thread.drafts.is_empty());
        assert_eq!(thread.messages.len(), 1);
    }

    #[test]
    fn removal_drops_thread() {
        let mut state = SyncState::new(1);
        state.apply(Action::ChallengesFetched(vec![challenge(7, 1, 2)]));
        state.apply(Action::MessagesFetched {
            challenge_id: 7,
            revision: None,
            messages: vec![message(1, 7, 1)],
        });
        state.apply(Action::ChallengeRemoved(7));
        assert!(state.challenge(7).is_none());
        assert!(state.thread(7).is_none());
    }
}
