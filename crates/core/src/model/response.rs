use serde::{Deserialize, Serialize};

use crate::irt::IrtParams;
use crate::model::ids::ItemId;
use crate::model::item::{AnswerKey, Item};
use crate::model::skill::SkillCategory;

/// One answered item within a session.
///
/// Carries a snapshot of the item's skill and IRT parameters so the session can
/// be scored without going back to the item bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub item_id: ItemId,
    pub skill: SkillCategory,
    pub params: IrtParams,
    pub selected_key: AnswerKey,
    pub is_correct: bool,
    pub time_spent_secs: u32,
    pub ability_after: f64,
}

impl Response {
    /// Record `selected` as the answer to `item`; correctness is derived from the item.
    #[must_use]
    pub fn new(item: &Item, selected: AnswerKey, time_spent_secs: u32, ability_after: f64) -> Self {
        Self {
            item_id: item.id(),
            skill: item.skill(),
            params: *item.params(),
            selected_key: selected,
            is_correct: item.is_correct(selected),
            time_spent_secs,
            ability_after,
        }
    }
}
