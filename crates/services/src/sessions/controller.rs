use std::collections::HashSet;
use std::sync::Arc;

use placement_core::balancer::ContentBalancer;
use placement_core::config::EngineConfig;
use placement_core::estimator::AbilityEstimator;
use placement_core::irt::IrtModel;
use placement_core::model::{
    AnswerKey, CompletionReason, ItemId, PlacementResult, Response, Session, SessionId,
    SessionStateError, SessionStatus, UserId,
};
use placement_core::scoring::{ScoreFinalizer, ability_to_score};
use placement_core::stopping::StoppingRule;
use storage::repository::{
    ItemBank, LearnerProfileSink, SessionRepository, Storage, StorageError, UsageRecorder,
};
use tracing::{debug, info, warn};

use super::locks::SessionLocks;
use super::progress::{AnswerFeedback, AnswerOutcome, SessionProgress, StartedSession};
use crate::Clock;
use crate::error::{IllegalState, InvalidInput, PlacementError};
use crate::selector::{ItemSelector, SeededJitter, TieBreak};

/// Drives placement sessions from first item to final result.
///
/// Every mutating operation on a session holds that session's lock, and
/// every write goes through the repository's version check.
#[derive(Clone)]
pub struct SessionController {
    clock: Clock,
    config: EngineConfig,
    estimator: AbilityEstimator,
    balancer: ContentBalancer,
    stopping: StoppingRule,
    finalizer: ScoreFinalizer,
    selector: ItemSelector,
    items: Arc<dyn ItemBank>,
    usage: Arc<dyn UsageRecorder>,
    sessions: Arc<dyn SessionRepository>,
    profiles: Arc<dyn LearnerProfileSink>,
    locks: SessionLocks,
}

impl SessionController {
    /// Controller with OS-seeded tie-break jitter.
    #[must_use]
    pub fn new(clock: Clock, config: EngineConfig, storage: &Storage) -> Self {
        let tie_break: Arc<dyn TieBreak> = Arc::new(SeededJitter::new(config.jitter()));
        Self::with_tie_break(clock, config, storage, tie_break)
    }

    #[must_use]
    pub fn with_tie_break(
        clock: Clock,
        config: EngineConfig,
        storage: &Storage,
        tie_break: Arc<dyn TieBreak>,
    ) -> Self {
        let model = IrtModel::new();
        let stopping = config.stopping_rule(model);
        let scan_window = usize::try_from(config.scan_window()).unwrap_or(usize::MAX);
        Self {
            clock,
            estimator: AbilityEstimator::new(model),
            balancer: config.balancer(),
            stopping,
            finalizer: ScoreFinalizer::new(stopping),
            selector: ItemSelector::new(model, Arc::clone(&storage.items), tie_break, scan_window),
            items: Arc::clone(&storage.items),
            usage: Arc::clone(&storage.usage),
            sessions: Arc::clone(&storage.sessions),
            profiles: Arc::clone(&storage.profiles),
            locks: SessionLocks::new(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    //
    // ─── OPERATIONS ────────────────────────────────────────────────────────────
    //

    /// Open a session for `user_id` and issue its first item.
    ///
    /// A user with an unfinished session gets that session back, with its
    /// pending item, instead of a second one.
    ///
    /// # Errors
    ///
    /// Returns `PlacementError::NoItemsAvailable` for an empty bank, or
    /// `PlacementError::Storage` if the session cannot be stored.
    pub async fn start(&self, user_id: UserId) -> Result<StartedSession, PlacementError> {
        if let Some(open) = self.sessions.find_in_progress(user_id).await? {
            match self.resume(open.id()).await {
                // Finished between the lookup and the lock.
                Err(PlacementError::IllegalState(_)) => {}
                outcome => return outcome,
            }
        }

        let mut session = Session::new(SessionId::generate(), user_id, self.clock.now());
        let ladder = self.balancer.ladder(session.skill_counts());
        let item = self
            .selector
            .select(session.ability(), &HashSet::new(), &ladder)
            .await?
            .ok_or(PlacementError::NoItemsAvailable)?;

        session.issue_item(item.id())?;
        session.bump_version();
        self.sessions.create_session(&session).await?;

        info!(
            session_id = %session.id(),
            user_id = %user_id,
            item_id = %item.id(),
            "placement session started"
        );

        Ok(StartedSession {
            session_id: session.id(),
            progress: self.progress_of(&session),
            item,
        })
    }

    /// Current item and progress of an unfinished session.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an unknown session, `IllegalState` for a
    /// terminal one, and `NoItemsAvailable` if no item can be issued.
    pub async fn resume(&self, session_id: SessionId) -> Result<StartedSession, PlacementError> {
        let _lease = self.locks.acquire(session_id).await;
        let mut session = self.load(session_id).await?;
        ensure_in_progress(&session)?;

        let item = match session.pending_item() {
            Some(item_id) => self.items.get_item(item_id).await?,
            None => {
                let ladder = self.balancer.ladder(session.skill_counts());
                let item = self
                    .selector
                    .select(session.ability(), &session.answered_ids(), &ladder)
                    .await?
                    .ok_or(PlacementError::NoItemsAvailable)?;
                session.issue_item(item.id())?;
                self.persist(&mut session).await?;
                item
            }
        };

        debug!(session_id = %session_id, item_id = %item.id(), "session resumed");
        Ok(StartedSession {
            session_id,
            progress: self.progress_of(&session),
            item,
        })
    }

    /// Score the answer to the pending item and move the session forward.
    ///
    /// `selected` is the raw option letter as typed by the learner.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a malformed key, an option the item does not
    /// offer, or an unknown session or item; `IllegalState` when the session is
    /// terminal or `item_id` is not the pending item. Nothing is persisted on
    /// error.
    pub async fn submit_answer(
        &self,
        session_id: SessionId,
        item_id: ItemId,
        selected: &str,
        time_spent_secs: u32,
    ) -> Result<AnswerOutcome, PlacementError> {
        let _lease = self.locks.acquire(session_id).await;
        self.submit_locked(session_id, item_id, selected, time_spent_secs)
            .await
    }

    /// Finish a session that has at least the minimum number of answers.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` for a terminal session or one below the minimum.
    pub async fn finalize_early(
        &self,
        session_id: SessionId,
    ) -> Result<PlacementResult, PlacementError> {
        let _lease = self.locks.acquire(session_id).await;
        self.finalize_early_locked(session_id).await
    }

    /// Mark an in-progress session as abandoned.
    ///
    /// Returns `false` when the session was already abandoned.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` for a completed session.
    pub async fn abandon(&self, session_id: SessionId) -> Result<bool, PlacementError> {
        let _lease = self.locks.acquire(session_id).await;
        self.abandon_locked(session_id).await
    }

    /// Stored result of a completed session.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` unless the session is completed.
    pub async fn result(&self, session_id: SessionId) -> Result<PlacementResult, PlacementError> {
        let session = self.load(session_id).await?;
        session.result().cloned().ok_or_else(|| {
            IllegalState::NotCompleted {
                status: session.status(),
            }
            .into()
        })
    }

    /// Push a completed session's result to the learner profile if that did
    /// not happen at completion time.
    ///
    /// Returns `true` if this call applied the result.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` unless the session is completed, or
    /// `PlacementError::Storage` if the profile sink fails again.
    pub async fn publish_result(&self, session_id: SessionId) -> Result<bool, PlacementError> {
        let _lease = self.locks.acquire(session_id).await;
        let mut session = self.load(session_id).await?;
        if session.status() != SessionStatus::Completed {
            return Err(IllegalState::NotCompleted {
                status: session.status(),
            }
            .into());
        }
        if session.result_published() {
            return Ok(false);
        }
        self.publish(&mut session).await
    }

    /// Progress snapshot for any session.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an unknown session.
    pub async fn progress(&self, session_id: SessionId) -> Result<SessionProgress, PlacementError> {
        let session = self.load(session_id).await?;
        Ok(self.progress_of(&session))
    }

    /// Full session state, as last persisted.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an unknown session.
    pub async fn session(&self, session_id: SessionId) -> Result<Session, PlacementError> {
        self.load(session_id).await
    }

    //
    // ─── INTERNALS ─────────────────────────────────────────────────────────────
    //

    async fn submit_locked(
        &self,
        session_id: SessionId,
        item_id: ItemId,
        selected: &str,
        time_spent_secs: u32,
    ) -> Result<AnswerOutcome, PlacementError> {
        let mut session = self.load(session_id).await?;
        session.ensure_answerable(item_id)?;

        let key: AnswerKey = selected.parse()?;
        let item = match self.items.get_item(item_id).await {
            Ok(item) => item,
            Err(StorageError::NotFound) => return Err(InvalidInput::UnknownItem(item_id).into()),
            Err(err) => return Err(err.into()),
        };
        if !item.offers(key) {
            return Err(InvalidInput::OptionNotOffered { item: item_id, key }.into());
        }

        let is_correct = item.is_correct(key);
        let previous = session.ability();
        let ability = self.estimator.update(
            previous,
            item.params(),
            is_correct,
            session.answered_count(),
        );
        session.record_response(Response::new(&item, key, time_spent_secs, ability))?;
        debug!(
            session_id = %session_id,
            item_id = %item_id,
            is_correct,
            previous,
            ability,
            "ability updated"
        );

        let feedback = AnswerFeedback {
            is_correct,
            correct_key: item.correct_key(),
            ability,
        };

        if self.stopping.should_stop(&session) {
            let reason = if self.stopping.at_cap(&session) {
                CompletionReason::MaxItems
            } else {
                CompletionReason::PrecisionReached
            };
            let result = self.finalize(&mut session, reason).await?;
            self.record_usage(session_id, item_id, is_correct).await;
            return Ok(AnswerOutcome::Completed { feedback, result });
        }

        let ladder = self.balancer.ladder(session.skill_counts());
        let next = self
            .selector
            .select(ability, &session.answered_ids(), &ladder)
            .await?;

        let Some(next_item) = next else {
            info!(session_id = %session_id, "item bank exhausted, finalizing");
            let result = self
                .finalize(&mut session, CompletionReason::BankExhausted)
                .await?;
            self.record_usage(session_id, item_id, is_correct).await;
            return Ok(AnswerOutcome::Completed { feedback, result });
        };

        session.issue_item(next_item.id())?;
        self.persist(&mut session).await?;
        self.record_usage(session_id, item_id, is_correct).await;

        Ok(AnswerOutcome::Continue {
            feedback,
            progress: self.progress_of(&session),
            next_item,
        })
    }

    async fn finalize_early_locked(
        &self,
        session_id: SessionId,
    ) -> Result<PlacementResult, PlacementError> {
        let mut session = self.load(session_id).await?;
        ensure_in_progress(&session)?;
        if !self.stopping.can_finish(&session) {
            return Err(IllegalState::TooFewAnswers {
                answered: session.answered_count(),
                min: self.stopping.min_items(),
            }
            .into());
        }
        self.finalize(&mut session, CompletionReason::FinishedEarly)
            .await
    }

    async fn abandon_locked(&self, session_id: SessionId) -> Result<bool, PlacementError> {
        let mut session = self.load(session_id).await?;
        let changed = session.abandon()?;
        if changed {
            self.persist(&mut session).await?;
            info!(
                session_id = %session_id,
                answered = session.answered_count(),
                "placement session abandoned"
            );
        }
        Ok(changed)
    }

    /// Complete, persist, then try to publish. Publication failures are left
    /// for `publish_result`.
    async fn finalize(
        &self,
        session: &mut Session,
        reason: CompletionReason,
    ) -> Result<PlacementResult, PlacementError> {
        let result = self.finalizer.finalize(session, reason);
        session.complete(result.clone(), self.clock.now())?;
        self.persist(session).await?;

        info!(
            session_id = %session.id(),
            composite_score = result.composite_score,
            confidence_interval = result.confidence_interval,
            answered = result.questions_answered,
            reason = ?reason,
            "placement session completed"
        );

        if let Err(err) = self.publish(session).await {
            warn!(
                session_id = %session.id(),
                error = %err,
                "failed to publish placement result, left for retry"
            );
        }
        Ok(result)
    }

    async fn publish(&self, session: &mut Session) -> Result<bool, PlacementError> {
        let Some(result) = session.result().cloned() else {
            return Err(IllegalState::NotCompleted {
                status: session.status(),
            }
            .into());
        };
        let applied = self
            .profiles
            .apply_test_result(session.user_id(), session.id(), &result, self.clock.now())
            .await?;
        session.mark_result_published();
        self.persist(session).await?;
        debug!(session_id = %session.id(), applied, "placement result published");
        Ok(applied)
    }

    async fn record_usage(&self, session_id: SessionId, item_id: ItemId, is_correct: bool) {
        if let Err(err) = self.usage.record_administration(item_id, is_correct).await {
            warn!(
                session_id = %session_id,
                item_id = %item_id,
                error = %err,
                "failed to record item usage"
            );
        }
    }

    async fn load(&self, session_id: SessionId) -> Result<Session, PlacementError> {
        match self.sessions.load_session(session_id).await {
            Ok(session) => Ok(session),
            Err(StorageError::NotFound) => Err(InvalidInput::UnknownSession(session_id).into()),
            Err(err) => Err(err.into()),
        }
    }

    async fn persist(&self, session: &mut Session) -> Result<(), PlacementError> {
        session.bump_version();
        self.sessions.save_session(session).await?;
        Ok(())
    }

    fn progress_of(&self, session: &Session) -> SessionProgress {
        SessionProgress {
            answered: session.answered_count(),
            min_items: self.stopping.min_items(),
            max_items: self.stopping.max_items(),
            can_finish: self.stopping.can_finish(session),
            estimated_score: ability_to_score(session.ability()),
            standard_error: self.stopping.standard_error(session),
        }
    }
}

fn ensure_in_progress(session: &Session) -> Result<(), PlacementError> {
    if session.status() == SessionStatus::InProgress {
        return Ok(());
    }
    Err(SessionStateError::NotInProgress {
        status: session.status(),
    }
    .into())
}
