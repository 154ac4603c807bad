use std::sync::Arc;

use placement_core::balancer::SkillQuota;
use placement_core::config::EngineConfig;
use placement_core::irt::IrtParams;
use placement_core::model::{AnswerKey, DifficultyBand, Item, ItemId, SkillCategory, UserId};
use placement_core::time::fixed_now;
use services::{AnswerOutcome, Clock, ErrorKind, NoJitter, SessionController};
use storage::repository::{InMemoryRepository, ItemBank, Storage};

async fn seeded_repo(count: u64) -> InMemoryRepository {
    let repo = InMemoryRepository::new();
    for id in 1..=count {
        let skill = SkillCategory::ALL[(id % 9) as usize];
        let b = (id as f64 / count as f64) * 4.0 - 2.0;
        let item = Item::new(
            ItemId::new(id),
            skill,
            DifficultyBand::new(3).unwrap(),
            IrtParams::new(1.0, b, 0.25).unwrap(),
            AnswerKey::ALL.to_vec(),
            AnswerKey::A,
        )
        .unwrap();
        repo.upsert_item(&item).await.unwrap();
    }
    repo
}

fn config() -> EngineConfig {
    EngineConfig::new(
        3,
        6,
        0.0001,
        50,
        0.0,
        vec![
            SkillQuota::new(SkillCategory::L1, 2),
            SkillQuota::new(SkillCategory::R7, 2),
            SkillQuota::new(SkillCategory::Grm, 2),
        ],
    )
    .unwrap()
}

fn controller(storage: &Storage) -> SessionController {
    SessionController::with_tie_break(
        Clock::fixed(fixed_now()),
        config(),
        storage,
        Arc::new(NoJitter),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_submissions_apply_once() {
    let storage = Storage::from_repository(seeded_repo(40).await);
    let ctl = controller(&storage);
    let started = ctl.start(UserId::new(1)).await.unwrap();
    let sid = started.session_id;
    let item_id = started.item.id();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ctl = ctl.clone();
            tokio::spawn(async move { ctl.submit_answer(sid, item_id, "A", 4).await })
        })
        .collect();

    let mut applied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => applied += 1,
            Err(err) => assert_eq!(err.kind(), ErrorKind::IllegalState),
        }
    }
    assert_eq!(applied, 1);

    let session = ctl.session(sid).await.unwrap();
    assert_eq!(session.answered_count(), 1);
    assert_eq!(storage.items.get_item(item_id).await.unwrap().times_shown(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn separate_controllers_cannot_both_write() {
    let storage = Storage::from_repository(seeded_repo(40).await);
    let first = controller(&storage);
    let second = controller(&storage);
    let started = first.start(UserId::new(2)).await.unwrap();
    let sid = started.session_id;
    let item_id = started.item.id();

    let a = tokio::spawn({
        let ctl = first.clone();
        async move { ctl.submit_answer(sid, item_id, "B", 4).await }
    });
    let b = tokio::spawn({
        let ctl = second.clone();
        async move { ctl.submit_answer(sid, item_id, "B", 4).await }
    });
    let outcomes = [a.await.unwrap(), b.await.unwrap()];

    let applied = outcomes.iter().filter(|o| o.is_ok()).count();
    assert_eq!(applied, 1);
    for err in outcomes.iter().filter_map(|o| o.as_ref().err()) {
        assert!(matches!(
            err.kind(),
            ErrorKind::IllegalState | ErrorKind::Storage
        ));
    }
    assert_eq!(first.session(sid).await.unwrap().answered_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_sessions_share_the_bank() {
    let repo = seeded_repo(60).await;
    let storage = Storage::from_repository(repo.clone());
    let ctl = controller(&storage);

    let handles: Vec<_> = (0..16u64)
        .map(|user| {
            let ctl = ctl.clone();
            tokio::spawn(async move {
                let started = ctl.start(UserId::new(user)).await.unwrap();
                let mut current = started.item;
                let mut answered = 0u64;
                loop {
                    let key = if user % 2 == 0 { "A" } else { "C" };
                    answered += 1;
                    match ctl
                        .submit_answer(started.session_id, current.id(), key, 2)
                        .await
                        .unwrap()
                    {
                        AnswerOutcome::Continue { next_item, .. } => current = next_item,
                        AnswerOutcome::Completed { .. } => return answered,
                    }
                }
            })
        })
        .collect();

    let mut total = 0;
    for handle in handles {
        let answered = handle.await.unwrap();
        assert_eq!(answered, 6);
        total += answered;
    }

    let mut shown = 0;
    for id in 1..=60 {
        shown += repo.get_item(ItemId::new(id)).await.unwrap().times_shown();
    }
    assert_eq!(shown, total);
}
