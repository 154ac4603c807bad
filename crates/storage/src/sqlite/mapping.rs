use placement_core::irt::IrtParams;
use placement_core::model::{AnswerKey, DifficultyBand, Item, ItemId, SkillCategory};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn item_id_from_i64(v: i64) -> Result<ItemId, StorageError> {
    Ok(ItemId::new(i64_to_u64("item_id", v)?))
}

/// Option sets are stored as their letters in order, e.g. `"ABCD"`.
pub(crate) fn options_to_text(options: &[AnswerKey]) -> String {
    options.iter().map(|k| k.as_char()).collect()
}

pub(crate) fn options_from_text(raw: &str) -> Result<Vec<AnswerKey>, StorageError> {
    raw.chars()
        .map(|c| c.to_string().parse::<AnswerKey>().map_err(ser))
        .collect()
}

pub(crate) fn parse_skill(raw: &str) -> Result<SkillCategory, StorageError> {
    raw.parse::<SkillCategory>().map_err(ser)
}

pub(crate) fn map_item_row(row: &sqlx::sqlite::SqliteRow) -> Result<Item, StorageError> {
    let skill = parse_skill(row.try_get::<String, _>("skill").map_err(ser)?.as_str())?;

    let band_i64: i64 = row.try_get("band").map_err(ser)?;
    let band = u8::try_from(band_i64)
        .map_err(|_| StorageError::Serialization(format!("invalid band: {band_i64}")))
        .and_then(|b| DifficultyBand::new(b).map_err(ser))?;

    let params = IrtParams::new(
        row.try_get("irt_a").map_err(ser)?,
        row.try_get("irt_b").map_err(ser)?,
        row.try_get("irt_c").map_err(ser)?,
    )
    .map_err(ser)?;

    let options = options_from_text(row.try_get::<String, _>("options").map_err(ser)?.as_str())?;
    let correct_key: AnswerKey = row
        .try_get::<String, _>("correct_key")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;

    Item::from_persisted(
        item_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        skill,
        band,
        params,
        options,
        correct_key,
        i64_to_u64("times_shown", row.try_get("times_shown").map_err(ser)?)?,
        i64_to_u64("times_correct", row.try_get("times_correct").map_err(ser)?)?,
        row.try_get::<bool, _>("is_active").map_err(ser)?,
    )
    .map_err(ser)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_text_round_trips_in_order() {
        let options = vec![AnswerKey::C, AnswerKey::A, AnswerKey::B];
        let text = options_to_text(&options);
        assert_eq!(text, "CAB");
        assert_eq!(options_from_text(&text).unwrap(), options);
    }

    #[test]
    fn bad_option_letter_is_a_serialization_error() {
        assert!(matches!(
            options_from_text("AZ"),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn negative_ids_are_rejected() {
        assert!(item_id_from_i64(-1).is_err());
        assert_eq!(item_id_from_i64(9).unwrap(), ItemId::new(9));
    }
}
