#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    InMemoryRepository, ItemBank, LearnerProfileSink, SessionRepository, Storage, StorageError,
    UsageRecorder,
};
pub use sqlite::{SqliteInitError, SqliteRepository};
