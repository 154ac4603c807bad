mod controller;
mod locks;
mod progress;

// Public API of the session subsystem.
pub use crate::error::PlacementError;
pub use controller::SessionController;
pub use locks::{SessionLease, SessionLocks};
pub use progress::{AnswerFeedback, AnswerOutcome, SessionProgress, StartedSession};
