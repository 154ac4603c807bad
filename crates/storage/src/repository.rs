use async_trait::async_trait;
use chrono::{DateTime, Utc};
use placement_core::model::{
    Item, ItemId, LearnerProfile, PlacementResult, Session, SessionId, SessionStatus, SkillCategory,
    UserId,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Read access to the calibrated item bank.
///
/// Candidate queries return active items ordered by id, never including an
/// id from `excluded`.
#[async_trait]
pub trait ItemBank: Send + Sync {
    /// Up to `limit` active items for `skill` whose ids are not in `excluded`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the bank cannot be queried.
    async fn fetch_active_unanswered(
        &self,
        skill: SkillCategory,
        excluded: &HashSet<ItemId>,
        limit: usize,
    ) -> Result<Vec<Item>, StorageError>;

    /// Up to `limit` active items of any skill whose ids are not in `excluded`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the bank cannot be queried.
    async fn fetch_any_active_unanswered(
        &self,
        excluded: &HashSet<ItemId>,
        limit: usize,
    ) -> Result<Vec<Item>, StorageError>;

    /// Fetch one item by id, active or not.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_item(&self, id: ItemId) -> Result<Item, StorageError>;

    /// Insert or replace an item, including its counters.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the item cannot be stored.
    async fn upsert_item(&self, item: &Item) -> Result<(), StorageError>;
}

/// Append-only usage statistics for administered items.
#[async_trait]
pub trait UsageRecorder: Send + Sync {
    /// Atomically bump `times_shown`, and `times_correct` when `was_correct`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown item, or other storage errors.
    async fn record_administration(
        &self,
        item_id: ItemId,
        was_correct: bool,
    ) -> Result<(), StorageError>;
}

/// Durable home for placement sessions.
///
/// Writes are versioned: `save_session` only succeeds when the stored copy is
/// exactly one version behind the session being saved.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Store a brand-new session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id is already taken.
    async fn create_session(&self, session: &Session) -> Result<(), StorageError>;

    /// Load a session by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn load_session(&self, id: SessionId) -> Result<Session, StorageError>;

    /// Replace a stored session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` on a stale version and
    /// `StorageError::NotFound` if the session was never created.
    async fn save_session(&self, session: &Session) -> Result<(), StorageError>;

    /// The user's most recently started in-progress session, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn find_in_progress(&self, user_id: UserId) -> Result<Option<Session>, StorageError>;
}

/// Downstream consumer of placement results.
#[async_trait]
pub trait LearnerProfileSink: Send + Sync {
    /// Fold a result into the learner's profile.
    ///
    /// Returns `false` without touching the profile when this session's result
    /// was already applied.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the profile cannot be updated.
    async fn apply_test_result(
        &self,
        user_id: UserId,
        session_id: SessionId,
        result: &PlacementResult,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// Current profile for a learner, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the profile cannot be read.
    async fn get_profile(&self, user_id: UserId) -> Result<Option<LearnerProfile>, StorageError>;
}

//
// ─── IN-MEMORY ADAPTER ─────────────────────────────────────────────────────────
//

/// Bank entry whose counters can be bumped without holding the map lock.
#[derive(Debug, Clone)]
struct StoredItem {
    item: Item,
    times_shown: Arc<AtomicU64>,
    times_correct: Arc<AtomicU64>,
}

impl StoredItem {
    fn new(item: &Item) -> Self {
        Self {
            item: item.clone(),
            times_shown: Arc::new(AtomicU64::new(item.times_shown())),
            times_correct: Arc::new(AtomicU64::new(item.times_correct())),
        }
    }

    fn snapshot(&self) -> Result<Item, StorageError> {
        // Read `correct` first: `shown` is always bumped before it.
        let correct = self.times_correct.load(Ordering::SeqCst);
        let shown = self.times_shown.load(Ordering::SeqCst);
        self.item
            .with_counters(shown, correct)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    items: Arc<Mutex<BTreeMap<ItemId, StoredItem>>>,
    sessions: Arc<Mutex<HashMap<SessionId, Session>>>,
    profiles: Arc<Mutex<HashMap<UserId, LearnerProfile>>>,
    applied_results: Arc<Mutex<HashSet<SessionId>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn collect_candidates(
        &self,
        skill: Option<SkillCategory>,
        excluded: &HashSet<ItemId>,
        limit: usize,
    ) -> Result<Vec<Item>, StorageError> {
        let guard = self
            .items
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .values()
            .filter(|stored| stored.item.is_active())
            .filter(|stored| skill.is_none_or(|s| stored.item.skill() == s))
            .filter(|stored| !excluded.contains(&stored.item.id()))
            .take(limit)
            .map(StoredItem::snapshot)
            .collect()
    }
}

#[async_trait]
impl ItemBank for InMemoryRepository {
    async fn fetch_active_unanswered(
        &self,
        skill: SkillCategory,
        excluded: &HashSet<ItemId>,
        limit: usize,
    ) -> Result<Vec<Item>, StorageError> {
        self.collect_candidates(Some(skill), excluded, limit)
    }

    async fn fetch_any_active_unanswered(
        &self,
        excluded: &HashSet<ItemId>,
        limit: usize,
    ) -> Result<Vec<Item>, StorageError> {
        self.collect_candidates(None, excluded, limit)
    }

    async fn get_item(&self, id: ItemId) -> Result<Item, StorageError> {
        let guard = self
            .items
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(&id).ok_or(StorageError::NotFound)?.snapshot()
    }

    async fn upsert_item(&self, item: &Item) -> Result<(), StorageError> {
        let mut guard = self
            .items
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(item.id(), StoredItem::new(item));
        Ok(())
    }
}

#[async_trait]
impl UsageRecorder for InMemoryRepository {
    async fn record_administration(
        &self,
        item_id: ItemId,
        was_correct: bool,
    ) -> Result<(), StorageError> {
        let (shown, correct) = {
            let guard = self
                .items
                .lock()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            let stored = guard.get(&item_id).ok_or(StorageError::NotFound)?;
            (
                Arc::clone(&stored.times_shown),
                Arc::clone(&stored.times_correct),
            )
        };
        shown.fetch_add(1, Ordering::SeqCst);
        if was_correct {
            correct.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn create_session(&self, session: &Session) -> Result<(), StorageError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard.contains_key(&session.id()) {
            return Err(StorageError::Conflict);
        }
        guard.insert(session.id(), session.clone());
        Ok(())
    }

    async fn load_session(&self, id: SessionId) -> Result<Session, StorageError> {
        let guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn save_session(&self, session: &Session) -> Result<(), StorageError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let stored = guard.get(&session.id()).ok_or(StorageError::NotFound)?;
        if stored.version() + 1 != session.version() {
            return Err(StorageError::Conflict);
        }
        guard.insert(session.id(), session.clone());
        Ok(())
    }

    async fn find_in_progress(&self, user_id: UserId) -> Result<Option<Session>, StorageError> {
        let guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .values()
            .filter(|s| s.user_id() == user_id && s.status() == SessionStatus::InProgress)
            .max_by_key(|s| s.started_at())
            .cloned())
    }
}

#[async_trait]
impl LearnerProfileSink for InMemoryRepository {
    async fn apply_test_result(
        &self,
        user_id: UserId,
        session_id: SessionId,
        result: &PlacementResult,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut applied = self
            .applied_results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if !applied.insert(session_id) {
            return Ok(false);
        }
        let mut profiles = self
            .profiles
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        profiles
            .entry(user_id)
            .or_insert_with(|| LearnerProfile::new(user_id))
            .apply_result(result, at);
        Ok(true)
    }

    async fn get_profile(&self, user_id: UserId) -> Result<Option<LearnerProfile>, StorageError> {
        let guard = self
            .profiles
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&user_id).cloned())
    }
}

/// Aggregates the placement collaborators behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub items: Arc<dyn ItemBank>,
    pub usage: Arc<dyn UsageRecorder>,
    pub sessions: Arc<dyn SessionRepository>,
    pub profiles: Arc<dyn LearnerProfileSink>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Wire every collaborator to the same repository value.
    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: ItemBank + UsageRecorder + SessionRepository + LearnerProfileSink + Clone + 'static,
    {
        let items: Arc<dyn ItemBank> = Arc::new(repo.clone());
        let usage: Arc<dyn UsageRecorder> = Arc::new(repo.clone());
        let sessions: Arc<dyn SessionRepository> = Arc::new(repo.clone());
        let profiles: Arc<dyn LearnerProfileSink> = Arc::new(repo);
        Self {
            items,
            usage,
            sessions,
            profiles,
        }
    }
}
