//! Serializable record beans for clipboard and undo export

use crate::baseline::Baseline;
use crate::error::{MementoError, RecordError};
use crate::record::{Record, RecordType, UUID_FIELD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Plain-data form of a [`Record`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMemento {
    pub uuid: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Every field except `uuid`, references included
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl RecordMemento {
    pub fn from_record(record: &Record) -> Self {
        let mut fields = record.get_all_fields();
        let uuid = fields.remove(UUID_FIELD).unwrap_or_default();
        Self {
            uuid,
            record_type: record.record_type(),
            fields,
        }
    }

    pub fn to_record(&self) -> Result<Record, RecordError> {
        let mut fields = self.fields.clone();
        fields.insert(UUID_FIELD.to_string(), self.uuid.clone());
        Record::from_fields(self.record_type, &fields)
    }
}

/// Mementos for every record of one type, in identifier order
pub fn save_mementos(baseline: &Baseline, record_type: RecordType) -> Vec<RecordMemento> {
    baseline
        .find_by_type(record_type)
        .map(RecordMemento::from_record)
        .collect()
}

/// Add every memento to `baseline`; nothing is added if any memento is invalid
///
/// A memento whose identifier already names a record of another type is
/// invalid.
pub fn restore_mementos(
    baseline: &Baseline,
    mementos: &[RecordMemento],
) -> Result<Baseline, MementoError> {
    let records = mementos
        .iter()
        .map(RecordMemento::to_record)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(baseline.try_add_all(records)?)
}

pub fn to_json(mementos: &[RecordMemento]) -> Result<String, MementoError> {
    Ok(serde_json::to_string_pretty(mementos)?)
}

pub fn from_json(json: &str) -> Result<Vec<RecordMemento>, MementoError> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_memento_json_round_trip() {
        let item = Record::create(RecordType::Item, [("name", "Pump")]);
        let view = Record::builder(RecordType::ItemView)
            .set("x", "10")
            .view_of(Some(item.id()))
            .build(Utc::now());
        let baseline = Baseline::from_records([item.clone(), view.clone()]);

        let mut mementos = save_mementos(&baseline, RecordType::Item);
        mementos.extend(save_mementos(&baseline, RecordType::ItemView));
        let json = to_json(&mementos).unwrap();
        assert!(json.contains("\"type\": \"ItemView\""));

        let restored = restore_mementos(&Baseline::new(), &from_json(&json).unwrap()).unwrap();
        assert_eq!(restored, baseline);
    }

    #[test]
    fn test_invalid_memento_restores_nothing() {
        let good = RecordMemento::from_record(&Record::create(RecordType::Item, [("name", "A")]));
        let bad = RecordMemento {
            uuid: "broken".into(),
            record_type: RecordType::Item,
            fields: BTreeMap::new(),
        };
        let result = restore_mementos(&Baseline::new(), &[good, bad]);
        assert!(matches!(result, Err(MementoError::Record(_))));
    }

    #[test]
    fn test_memento_cannot_change_record_type() {
        let pump = Record::create(RecordType::Item, [("name", "Pump")]);
        let baseline = Baseline::new().add(pump.clone());
        let mut memento = RecordMemento::from_record(&pump);
        memento.record_type = RecordType::Budget;

        let result = restore_mementos(&baseline, &[memento.clone()]);
        assert!(matches!(
            result,
            Err(MementoError::Record(RecordError::ConflictingType { .. }))
        ));
        let through_table = RecordType::Budget.table().restore_mementos(&baseline, &[memento]);
        assert!(through_table.is_err());
    }
}
