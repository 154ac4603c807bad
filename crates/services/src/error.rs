//! Error taxonomy for the placement services.

use thiserror::Error;

use placement_core::model::{
    AnswerKey, ItemId, ParseKeyError, SessionId, SessionStateError, SessionStatus,
};
use storage::repository::StorageError;

/// Caller supplied something malformed or unknown. Nothing was mutated.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum InvalidInput {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
    #[error("unknown item {0}")]
    UnknownItem(ItemId),
    #[error(transparent)]
    MalformedKey(#[from] ParseKeyError),
    #[error("item {item} does not offer option {key}")]
    OptionNotOffered { item: ItemId, key: AnswerKey },
}

/// Operation is not legal in the session's current state. Nothing was mutated.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum IllegalState {
    #[error(transparent)]
    Session(#[from] SessionStateError),
    #[error("{answered} answers recorded, at least {min} required to finish")]
    TooFewAnswers { answered: usize, min: usize },
    #[error("session is {status}, result is only available once completed")]
    NotCompleted { status: SessionStatus },
}

/// Coarse category callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    IllegalState,
    NoItemsAvailable,
    Storage,
}

/// Errors emitted by `SessionController`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlacementError {
    #[error(transparent)]
    InvalidInput(#[from] InvalidInput),
    #[error(transparent)]
    IllegalState(#[from] IllegalState),
    #[error("item bank has no active items")]
    NoItemsAvailable,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PlacementError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlacementError::InvalidInput(_) => ErrorKind::InvalidInput,
            PlacementError::IllegalState(_) => ErrorKind::IllegalState,
            PlacementError::NoItemsAvailable => ErrorKind::NoItemsAvailable,
            PlacementError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<SessionStateError> for PlacementError {
    fn from(err: SessionStateError) -> Self {
        PlacementError::IllegalState(IllegalState::Session(err))
    }
}

impl From<ParseKeyError> for PlacementError {
    fn from(err: ParseKeyError) -> Self {
        PlacementError::InvalidInput(InvalidInput::MalformedKey(err))
    }
}
