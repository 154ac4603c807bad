use thiserror::Error;

use crate::balancer::BalancerError;
use crate::config::ConfigError;
use crate::irt::IrtParamsError;
use crate::model::{ItemError, SessionStateError, SkillError};

/// Any domain rule violated inside the core crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Params(#[from] IrtParamsError),
    #[error(transparent)]
    Item(#[from] ItemError),
    #[error(transparent)]
    Skill(#[from] SkillError),
    #[error(transparent)]
    Session(#[from] SessionStateError),
    #[error(transparent)]
    Balancer(#[from] BalancerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
