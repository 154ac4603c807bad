#![forbid(unsafe_code)]

pub mod error;
pub mod selector;
pub mod sessions;

pub use placement_core::Clock;

pub use error::{ErrorKind, IllegalState, InvalidInput, PlacementError};
pub use selector::{ItemSelector, NoJitter, SeededJitter, TieBreak};
pub use sessions::{
    AnswerFeedback, AnswerOutcome, SessionController, SessionLocks, SessionProgress,
    StartedSession,
};
