use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;

use crate::estimator::{MAX_ABILITY, MIN_ABILITY};
use crate::model::ids::{ItemId, SessionId, UserId};
use crate::model::response::Response;
use crate::model::result::PlacementResult;
use crate::model::skill::SkillCategory;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("session is {status}, expected in progress")]
    NotInProgress { status: SessionStatus },

    #[error("item {got} is not the pending item (pending: {expected:?})")]
    NotPendingItem { expected: Option<ItemId>, got: ItemId },

    #[error("item {0} was already answered in this session")]
    AlreadyAnswered(ItemId),

    #[error("ability {0} is outside [-3, 3]")]
    AbilityOutOfRange(f64),

    #[error("skill counts ({counts}) do not match response count ({responses})")]
    CountMismatch { responses: usize, counts: u64 },

    #[error("result present without completed status, or completed without result")]
    ResultMismatch,

    #[error("completed_at is before started_at")]
    InvalidTimeRange,
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle state of a placement session.
///
/// `Completed` and `Abandoned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl SessionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::InProgress)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Aggregate root for one adaptive placement test.
///
/// All mutation goes through methods that keep the invariants intact:
/// ability stays in [-3, 3], skill counts sum to the response count, an item
/// is never answered twice, and a result exists iff the session completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SessionSnapshot", into = "SessionSnapshot")]
pub struct Session {
    id: SessionId,
    user_id: UserId,
    status: SessionStatus,
    ability: f64,
    responses: Vec<Response>,
    skill_counts: BTreeMap<SkillCategory, u32>,
    pending_item: Option<ItemId>,
    result: Option<PlacementResult>,
    result_published: bool,
    version: u64,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Fresh in-progress session with ability 0.0 and no history.
    #[must_use]
    pub fn new(id: SessionId, user_id: UserId, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            status: SessionStatus::InProgress,
            ability: 0.0,
            responses: Vec::new(),
            skill_counts: BTreeMap::new(),
            pending_item: None,
            result: None,
            result_published: false,
            version: 0,
            started_at,
            completed_at: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn ability(&self) -> f64 {
        self.ability
    }

    #[must_use]
    pub fn responses(&self) -> &[Response] {
        &self.responses
    }

    #[must_use]
    pub fn skill_counts(&self) -> &BTreeMap<SkillCategory, u32> {
        &self.skill_counts
    }

    #[must_use]
    pub fn pending_item(&self) -> Option<ItemId> {
        self.pending_item
    }

    #[must_use]
    pub fn result(&self) -> Option<&PlacementResult> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn result_published(&self) -> bool {
        self.result_published
    }

    /// Optimistic-concurrency version, bumped once per persisted write.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.responses.len()
    }

    /// Ids of every item already answered.
    #[must_use]
    pub fn answered_ids(&self) -> HashSet<ItemId> {
        self.responses.iter().map(|r| r.item_id).collect()
    }

    #[must_use]
    pub fn has_answered(&self, item_id: ItemId) -> bool {
        self.responses.iter().any(|r| r.item_id == item_id)
    }

    fn ensure_in_progress(&self) -> Result<(), SessionStateError> {
        if self.status == SessionStatus::InProgress {
            Ok(())
        } else {
            Err(SessionStateError::NotInProgress {
                status: self.status,
            })
        }
    }

    /// Mark `item_id` as the item currently shown to the learner.
    ///
    /// # Errors
    ///
    /// Returns `NotInProgress` on a terminal session and `AlreadyAnswered`
    /// if the item is already part of the history.
    pub fn issue_item(&mut self, item_id: ItemId) -> Result<(), SessionStateError> {
        self.ensure_in_progress()?;
        if self.has_answered(item_id) {
            return Err(SessionStateError::AlreadyAnswered(item_id));
        }
        self.pending_item = Some(item_id);
        Ok(())
    }

    /// Check that `item_id` may be answered right now, without mutating.
    ///
    /// # Errors
    ///
    /// Returns `NotInProgress` or `NotPendingItem`.
    pub fn ensure_answerable(&self, item_id: ItemId) -> Result<(), SessionStateError> {
        self.ensure_in_progress()?;
        if self.pending_item != Some(item_id) {
            return Err(SessionStateError::NotPendingItem {
                expected: self.pending_item,
                got: item_id,
            });
        }
        Ok(())
    }

    /// Append a response to the pending item and adopt its `ability_after`.
    ///
    /// # Errors
    ///
    /// Returns `NotInProgress`, `NotPendingItem`, `AlreadyAnswered` or
    /// `AbilityOutOfRange`; the session is unchanged on error.
    pub fn record_response(&mut self, response: Response) -> Result<(), SessionStateError> {
        self.ensure_answerable(response.item_id)?;
        if self.has_answered(response.item_id) {
            return Err(SessionStateError::AlreadyAnswered(response.item_id));
        }
        if !ability_in_range(response.ability_after) {
            return Err(SessionStateError::AbilityOutOfRange(response.ability_after));
        }

        self.ability = response.ability_after;
        *self.skill_counts.entry(response.skill).or_insert(0) += 1;
        self.responses.push(response);
        self.pending_item = None;
        Ok(())
    }

    /// Transition to `Completed` with the final result.
    ///
    /// # Errors
    ///
    /// Returns `NotInProgress` if the session is already terminal.
    pub fn complete(
        &mut self,
        result: PlacementResult,
        completed_at: DateTime<Utc>,
    ) -> Result<(), SessionStateError> {
        self.ensure_in_progress()?;
        if completed_at < self.started_at {
            return Err(SessionStateError::InvalidTimeRange);
        }
        self.status = SessionStatus::Completed;
        self.result = Some(result);
        self.pending_item = None;
        self.completed_at = Some(completed_at);
        Ok(())
    }

    /// Transition to `Abandoned`.
    ///
    /// Returns `Ok(false)` if the session was already abandoned.
    ///
    /// # Errors
    ///
    /// Returns `NotInProgress` for a completed session.
    pub fn abandon(&mut self) -> Result<bool, SessionStateError> {
        match self.status {
            SessionStatus::Abandoned => Ok(false),
            SessionStatus::Completed => Err(SessionStateError::NotInProgress {
                status: self.status,
            }),
            SessionStatus::InProgress => {
                self.status = SessionStatus::Abandoned;
                self.pending_item = None;
                Ok(true)
            }
        }
    }

    /// Record that the result reached the learner profile.
    pub fn mark_result_published(&mut self) {
        if self.result.is_some() {
            self.result_published = true;
        }
    }

    /// Advance the version ahead of a persisted write and return it.
    ///
    /// Stores accept a write only when the stored version is exactly one behind.
    pub fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    fn check_invariants(&self) -> Result<(), SessionStateError> {
        if !ability_in_range(self.ability) {
            return Err(SessionStateError::AbilityOutOfRange(self.ability));
        }
        let counted: u64 = self.skill_counts.values().map(|c| u64::from(*c)).sum();
        if counted != self.responses.len() as u64 {
            return Err(SessionStateError::CountMismatch {
                responses: self.responses.len(),
                counts: counted,
            });
        }
        for skill in self.skill_counts.keys() {
            let from_responses = self.responses.iter().filter(|r| r.skill == *skill).count();
            if from_responses != self.skill_counts[skill] as usize {
                return Err(SessionStateError::CountMismatch {
                    responses: self.responses.len(),
                    counts: counted,
                });
            }
        }
        let mut seen = HashSet::with_capacity(self.responses.len());
        for response in &self.responses {
            if !seen.insert(response.item_id) {
                return Err(SessionStateError::AlreadyAnswered(response.item_id));
            }
        }
        if (self.status == SessionStatus::Completed) != self.result.is_some() {
            return Err(SessionStateError::ResultMismatch);
        }
        if let Some(done) = self.completed_at {
            if done < self.started_at {
                return Err(SessionStateError::InvalidTimeRange);
            }
        }
        Ok(())
    }
}

fn ability_in_range(ability: f64) -> bool {
    ability.is_finite() && (MIN_ABILITY..=MAX_ABILITY).contains(&ability)
}

//
// ─── SERIALIZED SHAPE ──────────────────────────────────────────────────────────
//

/// Plain persisted shape of a `Session`; converting back re-checks invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub user_id: UserId,
    pub status: SessionStatus,
    pub ability: f64,
    pub responses: Vec<Response>,
    pub skill_counts: BTreeMap<SkillCategory, u32>,
    pub pending_item: Option<ItemId>,
    pub result: Option<PlacementResult>,
    #[serde(default)]
    pub result_published: bool,
    pub version: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Session> for SessionSnapshot {
    fn from(s: Session) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            status: s.status,
            ability: s.ability,
            responses: s.responses,
            skill_counts: s.skill_counts,
            pending_item: s.pending_item,
            result: s.result,
            result_published: s.result_published,
            version: s.version,
            started_at: s.started_at,
            completed_at: s.completed_at,
        }
    }
}

impl TryFrom<SessionSnapshot> for Session {
    type Error = SessionStateError;

    fn try_from(s: SessionSnapshot) -> Result<Self, Self::Error> {
        let session = Self {
            id: s.id,
            user_id: s.user_id,
            status: s.status,
            ability: s.ability,
            responses: s.responses,
            skill_counts: s.skill_counts,
            pending_item: s.pending_item,
            result: s.result,
            result_published: s.result_published,
            version: s.version,
            started_at: s.started_at,
            completed_at: s.completed_at,
        };
        session.check_invariants()?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irt::IrtParams;
    use crate::model::item::{AnswerKey, Item};
    use crate::model::result::{CompletionReason, HalfScores, ProficiencyLevel};
    use crate::model::skill::DifficultyBand;
    use crate::time::fixed_now;

    fn item(id: u64, skill: SkillCategory) -> Item {
        Item::new(
            ItemId::new(id),
            skill,
            DifficultyBand::new(3).unwrap(),
            IrtParams::default(),
            AnswerKey::ALL.to_vec(),
            AnswerKey::A,
        )
        .unwrap()
    }

    fn result() -> PlacementResult {
        PlacementResult {
            composite_score: 500,
            half_scores: HalfScores {
                listening: 250,
                reading: 250,
            },
            skill_scores: BTreeMap::new(),
            confidence_interval: 40,
            questions_answered: 1,
            level: ProficiencyLevel::Intermediate,
            completion_reason: CompletionReason::FinishedEarly,
        }
    }

    fn session() -> Session {
        Session::new(SessionId::generate(), UserId::new(7), fixed_now())
    }

    #[test]
    fn new_session_starts_in_progress_at_zero() {
        let s = session();
        assert_eq!(s.status(), SessionStatus::InProgress);
        assert_eq!(s.ability(), 0.0);
        assert!(s.responses().is_empty());
        assert!(s.result().is_none());
    }

    #[test]
    fn record_response_updates_counts_and_ability() {
        let mut s = session();
        let it = item(1, SkillCategory::L1);
        s.issue_item(it.id()).unwrap();
        s.record_response(Response::new(&it, AnswerKey::A, 12, 0.4))
            .unwrap();

        assert_eq!(s.ability(), 0.4);
        assert_eq!(s.skill_counts()[&SkillCategory::L1], 1);
        assert_eq!(s.pending_item(), None);
        assert!(s.responses()[0].is_correct);
    }

    #[test]
    fn answering_a_non_pending_item_is_rejected() {
        let mut s = session();
        let first = item(1, SkillCategory::L1);
        let other = item(2, SkillCategory::L1);
        s.issue_item(first.id()).unwrap();

        let err = s
            .record_response(Response::new(&other, AnswerKey::A, 1, 0.1))
            .unwrap_err();
        assert!(matches!(err, SessionStateError::NotPendingItem { .. }));
        assert!(s.responses().is_empty());
    }

    #[test]
    fn same_item_cannot_be_issued_twice() {
        let mut s = session();
        let it = item(1, SkillCategory::R5);
        s.issue_item(it.id()).unwrap();
        s.record_response(Response::new(&it, AnswerKey::B, 1, -0.2))
            .unwrap();
        assert!(matches!(
            s.issue_item(it.id()),
            Err(SessionStateError::AlreadyAnswered(_))
        ));
    }

    #[test]
    fn out_of_range_ability_is_rejected() {
        let mut s = session();
        let it = item(1, SkillCategory::R5);
        s.issue_item(it.id()).unwrap();
        let err = s
            .record_response(Response::new(&it, AnswerKey::A, 1, 3.5))
            .unwrap_err();
        assert!(matches!(err, SessionStateError::AbilityOutOfRange(_)));
    }

    #[test]
    fn terminal_states_do_not_transition() {
        let mut s = session();
        s.complete(result(), fixed_now()).unwrap();
        assert_eq!(s.status(), SessionStatus::Completed);
        assert!(s.complete(result(), fixed_now()).is_err());
        assert!(s.abandon().is_err());
        assert!(s.issue_item(ItemId::new(1)).is_err());

        let mut a = session();
        assert!(a.abandon().unwrap());
        assert!(!a.abandon().unwrap());
        assert!(a.complete(result(), fixed_now()).is_err());
        assert!(a.result().is_none());
    }

    #[test]
    fn publish_flag_requires_result() {
        let mut s = session();
        s.mark_result_published();
        assert!(!s.result_published());
        s.complete(result(), fixed_now()).unwrap();
        s.mark_result_published();
        assert!(s.result_published());
    }

    #[test]
    fn json_round_trip_preserves_state() {
        let mut s = session();
        for (id, skill) in [(1, SkillCategory::L1), (2, SkillCategory::Voc)] {
            let it = item(id, skill);
            s.issue_item(it.id()).unwrap();
            s.record_response(Response::new(&it, AnswerKey::A, 5, 0.1 * id as f64))
                .unwrap();
        }
        s.bump_version();

        let json = serde_json::to_string(&s).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();

        assert_eq!(back.ability(), s.ability());
        assert_eq!(back.responses().len(), s.responses().len());
        assert_eq!(back.status(), s.status());
        assert_eq!(back, s);
    }

    #[test]
    fn stored_session_with_invalid_item_params_is_rejected() {
        let mut s = session();
        let it = item(1, SkillCategory::R6);
        s.issue_item(it.id()).unwrap();
        s.record_response(Response::new(&it, AnswerKey::A, 5, 0.2)).unwrap();

        let mut json: serde_json::Value = serde_json::to_value(&s).unwrap();
        json["responses"][0]["params"]["c"] = serde_json::json!(1.5);
        assert!(serde_json::from_value::<Session>(json).is_err());
    }

    #[test]
    fn deserialize_rejects_broken_invariants() {
        let mut snapshot = SessionSnapshot::from(session());
        snapshot.ability = 4.0;
        assert!(Session::try_from(snapshot).is_err());

        let mut snapshot = SessionSnapshot::from(session());
        snapshot.skill_counts.insert(SkillCategory::L1, 2);
        assert!(matches!(
            Session::try_from(snapshot),
            Err(SessionStateError::CountMismatch { .. })
        ));

        let mut snapshot = SessionSnapshot::from(session());
        snapshot.status = SessionStatus::Completed;
        assert!(matches!(
            Session::try_from(snapshot),
            Err(SessionStateError::ResultMismatch)
        ));
    }
}
