mod ids;
mod item;
mod profile;
mod response;
mod result;
mod session;
mod skill;

pub use ids::{ItemId, ParseIdError, SessionId, UserId};

pub use item::{AnswerKey, Item, ItemError, ParseKeyError};
pub use profile::{LearnerProfile, PLACEMENT_CONFIDENCE, SkillProficiency};
pub use response::Response;
pub use result::{CompletionReason, HalfScores, PlacementResult, ProficiencyLevel};
pub use session::{Session, SessionSnapshot, SessionStateError, SessionStatus};
pub use skill::{DifficultyBand, DomainHalf, SkillCategory, SkillError};
