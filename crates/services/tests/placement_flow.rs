use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use placement_core::balancer::SkillQuota;
use placement_core::config::EngineConfig;
use placement_core::irt::IrtParams;
use placement_core::model::{
    AnswerKey, CompletionReason, DifficultyBand, Item, ItemId, LearnerProfile, PlacementResult,
    SessionId, SessionStatus, SkillCategory, UserId,
};
use placement_core::time::fixed_now;
use services::{AnswerOutcome, Clock, ErrorKind, NoJitter, PlacementError, SessionController};
use storage::repository::{
    InMemoryRepository, ItemBank, LearnerProfileSink, Storage, StorageError,
};

fn item(id: u64, skill: SkillCategory, b: f64) -> Item {
    let options = if skill == SkillCategory::L2 {
        vec![AnswerKey::A, AnswerKey::B, AnswerKey::C]
    } else {
        AnswerKey::ALL.to_vec()
    };
    Item::new(
        ItemId::new(id),
        skill,
        DifficultyBand::new(3).unwrap(),
        IrtParams::new(1.2, b, 0.25).unwrap(),
        options,
        AnswerKey::B,
    )
    .unwrap()
}

async fn seed(repo: &InMemoryRepository, items: &[Item]) {
    for it in items {
        repo.upsert_item(it).await.unwrap();
    }
}

/// Two skills, two items each; stops only at the cap.
fn small_config() -> EngineConfig {
    EngineConfig::new(
        2,
        4,
        0.0001,
        50,
        0.0,
        vec![
            SkillQuota::new(SkillCategory::L1, 2),
            SkillQuota::new(SkillCategory::R5, 2),
        ],
    )
    .unwrap()
}

fn controller(config: EngineConfig, storage: &Storage) -> SessionController {
    SessionController::with_tie_break(
        Clock::fixed(fixed_now()),
        config,
        storage,
        Arc::new(NoJitter),
    )
}

fn easy_bank() -> Vec<Item> {
    (1..=6)
        .map(|id| {
            let skill = if id % 2 == 0 {
                SkillCategory::R5
            } else {
                SkillCategory::L1
            };
            item(id, skill, -2.0)
        })
        .collect()
}

#[tokio::test]
async fn easy_correct_answers_complete_at_the_cap() {
    let repo = InMemoryRepository::new();
    seed(&repo, &easy_bank()).await;
    let storage = Storage::from_repository(repo.clone());
    let ctl = controller(small_config(), &storage);

    let started = ctl.start(UserId::new(1)).await.unwrap();
    assert_eq!(started.progress.answered, 0);
    assert!(!started.progress.can_finish);

    let session_id = started.session_id;
    let mut current = started.item;
    let mut seen = HashSet::new();
    let mut answered = 0;

    let result = loop {
        assert!(seen.insert(current.id()), "item offered twice");
        let outcome = ctl
            .submit_answer(session_id, current.id(), "b", 15)
            .await
            .unwrap();
        answered += 1;
        assert!(outcome.feedback().is_correct);
        match outcome {
            AnswerOutcome::Continue {
                next_item,
                progress,
                ..
            } => {
                assert_eq!(progress.answered, answered);
                current = next_item;
            }
            AnswerOutcome::Completed { result, .. } => break result,
        }
    };

    assert_eq!(answered, 4);
    assert_eq!(result.completion_reason, CompletionReason::MaxItems);
    assert_eq!(result.questions_answered, 4);
    assert_eq!(
        result.composite_score,
        result.half_scores.listening + result.half_scores.reading
    );

    let session = ctl.session(session_id).await.unwrap();
    assert_eq!(session.status(), SessionStatus::Completed);
    assert_eq!(session.skill_counts()[&SkillCategory::L1], 2);
    assert_eq!(session.skill_counts()[&SkillCategory::R5], 2);
    assert!(session.result_published());
    assert_eq!(ctl.result(session_id).await.unwrap(), result);

    let profile = storage
        .profiles
        .get_profile(UserId::new(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profile.estimated_score(), result.composite_score);

    for id in &seen {
        let it = repo.get_item(*id).await.unwrap();
        assert_eq!(it.times_shown(), 1);
        assert_eq!(it.times_correct(), 1);
    }

    let err = ctl
        .submit_answer(session_id, current.id(), "B", 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
}

#[tokio::test]
async fn empty_bank_cannot_start() {
    let storage = Storage::in_memory();
    let ctl = controller(small_config(), &storage);
    let err = ctl.start(UserId::new(1)).await.unwrap_err();
    assert!(matches!(err, PlacementError::NoItemsAvailable));
}

#[tokio::test]
async fn exhausted_bank_forces_completion() {
    let repo = InMemoryRepository::new();
    seed(
        &repo,
        &[
            item(1, SkillCategory::L1, 0.0),
            item(2, SkillCategory::R5, 0.0),
            item(3, SkillCategory::Voc, 0.5),
        ],
    )
    .await;
    let storage = Storage::from_repository(repo);
    let ctl = controller(small_config(), &storage);

    let started = ctl.start(UserId::new(2)).await.unwrap();
    let mut current = started.item;
    let mut answered = 0;
    let result = loop {
        let outcome = ctl
            .submit_answer(started.session_id, current.id(), "A", 5)
            .await
            .unwrap();
        answered += 1;
        match outcome {
            AnswerOutcome::Continue { next_item, .. } => current = next_item,
            AnswerOutcome::Completed { result, .. } => break result,
        }
    };

    assert_eq!(answered, 3);
    assert_eq!(result.completion_reason, CompletionReason::BankExhausted);
    assert!(result.skill_scores.contains_key(&SkillCategory::Voc));
}

#[tokio::test]
async fn rejected_answers_leave_session_untouched() {
    let repo = InMemoryRepository::new();
    seed(&repo, &[item(1, SkillCategory::L2, 0.0), item(2, SkillCategory::L2, 1.0)]).await;
    let storage = Storage::from_repository(repo);
    let config = EngineConfig::new(
        1,
        2,
        0.3,
        50,
        0.0,
        vec![SkillQuota::new(SkillCategory::L2, 2)],
    )
    .unwrap();
    let ctl = controller(config, &storage);

    let started = ctl.start(UserId::new(3)).await.unwrap();
    let sid = started.session_id;
    let pending = started.item.id();
    let before = ctl.session(sid).await.unwrap();

    let err = ctl.submit_answer(sid, pending, "E", 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    // Three-option item: D is not on offer.
    let err = ctl.submit_answer(sid, pending, "d", 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let other = if pending == ItemId::new(1) {
        ItemId::new(2)
    } else {
        ItemId::new(1)
    };
    let err = ctl.submit_answer(sid, other, "A", 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);

    let err = ctl
        .submit_answer(SessionId::generate(), pending, "A", 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    assert_eq!(ctl.session(sid).await.unwrap(), before);

    let outcome = ctl.submit_answer(sid, pending, " c ", 1).await.unwrap();
    assert!(!outcome.feedback().is_correct);
    assert_eq!(outcome.feedback().correct_key, AnswerKey::B);
}

#[tokio::test]
async fn finishing_early_requires_the_minimum() {
    let repo = InMemoryRepository::new();
    seed(&repo, &easy_bank()).await;
    let storage = Storage::from_repository(repo);
    let ctl = controller(small_config(), &storage);

    let started = ctl.start(UserId::new(4)).await.unwrap();
    let sid = started.session_id;

    let err = ctl.finalize_early(sid).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);

    let outcome = ctl
        .submit_answer(sid, started.item.id(), "B", 3)
        .await
        .unwrap();
    let next = outcome.next_item().unwrap().clone();
    assert!(!ctl.progress(sid).await.unwrap().can_finish);

    let outcome = ctl.submit_answer(sid, next.id(), "A", 3).await.unwrap();
    assert!(!outcome.is_completed());
    assert!(ctl.progress(sid).await.unwrap().can_finish);

    let result = ctl.finalize_early(sid).await.unwrap();
    assert_eq!(result.completion_reason, CompletionReason::FinishedEarly);
    assert_eq!(result.questions_answered, 2);

    let err = ctl.finalize_early(sid).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
}

#[tokio::test]
async fn abandon_is_idempotent_and_terminal() {
    let repo = InMemoryRepository::new();
    seed(&repo, &easy_bank()).await;
    let storage = Storage::from_repository(repo);
    let ctl = controller(small_config(), &storage);

    let started = ctl.start(UserId::new(5)).await.unwrap();
    let sid = started.session_id;

    assert!(ctl.abandon(sid).await.unwrap());
    assert!(!ctl.abandon(sid).await.unwrap());
    assert_eq!(
        ctl.session(sid).await.unwrap().status(),
        SessionStatus::Abandoned
    );

    let err = ctl
        .submit_answer(sid, started.item.id(), "B", 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert_eq!(ctl.result(sid).await.unwrap_err().kind(), ErrorKind::IllegalState);
    assert_eq!(ctl.resume(sid).await.unwrap_err().kind(), ErrorKind::IllegalState);
}

#[tokio::test]
async fn completed_session_cannot_be_abandoned() {
    let repo = InMemoryRepository::new();
    seed(&repo, &easy_bank()).await;
    let storage = Storage::from_repository(repo);
    let ctl = controller(small_config(), &storage);

    let started = ctl.start(UserId::new(6)).await.unwrap();
    let sid = started.session_id;
    let mut current = started.item;
    while let AnswerOutcome::Continue { next_item, .. } =
        ctl.submit_answer(sid, current.id(), "B", 1).await.unwrap()
    {
        current = next_item;
    }

    assert_eq!(ctl.abandon(sid).await.unwrap_err().kind(), ErrorKind::IllegalState);
}

#[tokio::test]
async fn resume_returns_the_pending_item() {
    let repo = InMemoryRepository::new();
    seed(&repo, &easy_bank()).await;
    let storage = Storage::from_repository(repo);
    let ctl = controller(small_config(), &storage);

    let started = ctl.start(UserId::new(7)).await.unwrap();
    let resumed = ctl.resume(started.session_id).await.unwrap();
    assert_eq!(resumed.item, started.item);
    assert_eq!(resumed.progress, started.progress);

    let err = ctl.resume(SessionId::generate()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

/// Profile sink that fails until switched on.
struct FlakySink {
    inner: InMemoryRepository,
    healthy: AtomicBool,
}

#[async_trait]
impl LearnerProfileSink for FlakySink {
    async fn apply_test_result(
        &self,
        user_id: UserId,
        session_id: SessionId,
        result: &PlacementResult,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("profile service down".into()));
        }
        self.inner
            .apply_test_result(user_id, session_id, result, at)
            .await
    }

    async fn get_profile(&self, user_id: UserId) -> Result<Option<LearnerProfile>, StorageError> {
        self.inner.get_profile(user_id).await
    }
}

#[tokio::test]
async fn failed_publication_can_be_retried() {
    let repo = InMemoryRepository::new();
    seed(&repo, &easy_bank()).await;
    let sink = Arc::new(FlakySink {
        inner: repo.clone(),
        healthy: AtomicBool::new(false),
    });
    let mut storage = Storage::from_repository(repo);
    storage.profiles = sink.clone();
    let ctl = controller(small_config(), &storage);

    let started = ctl.start(UserId::new(8)).await.unwrap();
    let sid = started.session_id;
    let mut current = started.item;
    let result = loop {
        match ctl.submit_answer(sid, current.id(), "B", 1).await.unwrap() {
            AnswerOutcome::Continue { next_item, .. } => current = next_item,
            AnswerOutcome::Completed { result, .. } => break result,
        }
    };

    let session = ctl.session(sid).await.unwrap();
    assert_eq!(session.status(), SessionStatus::Completed);
    assert!(!session.result_published());
    assert!(sink.get_profile(UserId::new(8)).await.unwrap().is_none());

    let err = ctl.publish_result(sid).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);

    sink.healthy.store(true, Ordering::SeqCst);
    assert!(ctl.publish_result(sid).await.unwrap());
    assert!(!ctl.publish_result(sid).await.unwrap());
    assert!(ctl.session(sid).await.unwrap().result_published());

    let profile = sink.get_profile(UserId::new(8)).await.unwrap().unwrap();
    assert_eq!(profile.estimated_score(), result.composite_score);
}

#[tokio::test]
async fn default_engine_runs_a_full_session() {
    let repo = InMemoryRepository::new();
    let mut items = Vec::new();
    let mut id = 1;
    for skill in SkillCategory::ALL {
        for band in DifficultyBand::all() {
            for offset in [-0.2, 0.0, 0.2] {
                let b = (band.nominal_irt_difficulty() + offset).clamp(-3.0, 3.0);
                items.push(
                    Item::new(
                        ItemId::new(id),
                        skill,
                        band,
                        IrtParams::new(1.1, b, 0.25).unwrap(),
                        AnswerKey::ALL.to_vec(),
                        AnswerKey::C,
                    )
                    .unwrap(),
                );
                id += 1;
            }
        }
    }
    seed(&repo, &items).await;
    let storage = Storage::from_repository(repo);
    let ctl = SessionController::new(
        Clock::fixed(fixed_now()),
        EngineConfig::default(),
        &storage,
    );

    let started = ctl.start(UserId::new(9)).await.unwrap();
    let sid = started.session_id;
    let mut current = started.item;
    let mut turn = 0u32;
    let result = loop {
        // Right on easier items, wrong on harder ones.
        let key = if current.params().b() < 0.5 { "C" } else { "A" };
        turn += 1;
        match ctl.submit_answer(sid, current.id(), key, 20).await.unwrap() {
            AnswerOutcome::Continue { next_item, progress, .. } => {
                assert!(progress.answered < 40);
                current = next_item;
            }
            AnswerOutcome::Completed { result, .. } => break result,
        }
    };

    assert!((20..=40).contains(&turn));
    assert!((10..=990).contains(&result.composite_score));
    assert!((5..=495).contains(&result.half_scores.listening));
    assert!((5..=495).contains(&result.half_scores.reading));
    assert!(matches!(
        result.completion_reason,
        CompletionReason::MaxItems | CompletionReason::PrecisionReached
    ));

    let session = ctl.session(sid).await.unwrap();
    let total: u32 = session.skill_counts().values().sum();
    assert_eq!(total as usize, session.answered_count());
    let unique: HashSet<_> = session.responses().iter().map(|r| r.item_id).collect();
    assert_eq!(unique.len(), session.answered_count());
}

#[tokio::test]
async fn start_hands_back_an_unfinished_session() {
    let repo = InMemoryRepository::new();
    seed(&repo, &easy_bank()).await;
    let storage = Storage::from_repository(repo);
    let ctl = controller(small_config(), &storage);
    let user = UserId::new(10);

    let first = ctl.start(user).await.unwrap();
    let again = ctl.start(user).await.unwrap();
    assert_eq!(again.session_id, first.session_id);
    assert_eq!(again.item, first.item);

    let outcome = ctl
        .submit_answer(first.session_id, first.item.id(), "B", 2)
        .await
        .unwrap();
    let next = outcome.next_item().unwrap().clone();
    let again = ctl.start(user).await.unwrap();
    assert_eq!(again.session_id, first.session_id);
    assert_eq!(again.item, next);
    assert_eq!(again.progress.answered, 1);

    assert!(ctl.abandon(first.session_id).await.unwrap());
    let fresh = ctl.start(user).await.unwrap();
    assert_ne!(fresh.session_id, first.session_id);
    assert_eq!(fresh.progress.answered, 0);
    assert_eq!(
        ctl.session(fresh.session_id).await.unwrap().status(),
        SessionStatus::InProgress
    );
}

#[tokio::test]
async fn completion_and_profile_use_the_controller_clock() {
    let repo = InMemoryRepository::new();
    seed(&repo, &easy_bank()).await;
    let storage = Storage::from_repository(repo);

    let mut clock = Clock::fixed(fixed_now());
    let opening =
        SessionController::with_tie_break(clock, small_config(), &storage, Arc::new(NoJitter));
    let started = opening.start(UserId::new(11)).await.unwrap();

    clock.advance(chrono::Duration::minutes(12));
    let later =
        SessionController::with_tie_break(clock, small_config(), &storage, Arc::new(NoJitter));
    let mut current = started.item;
    while let AnswerOutcome::Continue { next_item, .. } = later
        .submit_answer(started.session_id, current.id(), "B", 30)
        .await
        .unwrap()
    {
        current = next_item;
    }

    let session = later.session(started.session_id).await.unwrap();
    assert_eq!(session.started_at(), fixed_now());
    assert_eq!(session.completed_at(), Some(clock.now()));
    assert!(session.completed_at() > Some(session.started_at()));

    let profile = storage
        .profiles
        .get_profile(UserId::new(11))
        .await
        .unwrap()
        .unwrap();
    assert!(
        profile
            .skill_proficiency()
            .values()
            .all(|p| p.updated_at == clock.now())
    );
}
