//! Immutable indexed record collections
//!
//! A [`Baseline`] holds every record of one decomposition level. Updates
//! return a new Baseline that shares structure with the old one, so callers
//! can keep any number of snapshots (undo states, scans in progress) alive
//! without copying.
//!
//! The store does not cascade removals. Table mutators are responsible for
//! re-targeting or removing records that referenced a removed record; any
//! reference they miss shows up as an integrity problem on the next scan.

use crate::error::RecordError;
use crate::record::{Record, RecordId, RecordType, RefField};
use im::{OrdMap, OrdSet};
use sha2::{Digest, Sha256};
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct Baseline {
    records: OrdMap<RecordId, Arc<Record>>,
    /// Index: record type -> ids of that type
    by_type: OrdMap<RecordType, OrdSet<RecordId>>,
    /// Index: referenced id -> (referrer id, field the reference travels through)
    reverse: OrdMap<RecordId, OrdSet<(RecordId, RefField)>>,
}

impl PartialEq for Baseline {
    fn eq(&self, other: &Self) -> bool {
        // Both indexes are derived from `records`
        self.records == other.records
    }
}

impl Eq for Baseline {}

impl Baseline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a baseline holding all the given records
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        Self::new().add_all(records)
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.get(&id).map(Arc::as_ref)
    }

    /// Look up a record, returning `None` when it exists with another type
    pub fn get_typed(&self, id: RecordId, record_type: RecordType) -> Option<&Record> {
        self.get(id).filter(|r| r.record_type() == record_type)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.records.contains_key(&id)
    }

    /// All records of a type, in identifier order
    pub fn find_by_type(&self, record_type: RecordType) -> impl Iterator<Item = &Record> + '_ {
        self.by_type
            .get(&record_type)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(move |id| self.get(*id))
    }

    /// All records of a type, in the table's natural order
    pub fn find_by_type_ordered(&self, record_type: RecordType) -> Vec<&Record> {
        let table = record_type.table();
        let mut records: Vec<&Record> = self.find_by_type(record_type).collect();
        records.sort_by(|a, b| table.compare(a, b));
        records
    }

    /// Records referencing `id` through any field, each reported once
    pub fn find_reverse(&self, id: RecordId) -> impl Iterator<Item = &Record> + '_ {
        let mut last: Option<RecordId> = None;
        self.find_reverse_links(id)
            .filter(move |(record, _)| {
                let fresh = last != Some(record.id());
                last = Some(record.id());
                fresh
            })
            .map(|(record, _)| record)
    }

    /// Records of one type referencing `id`
    pub fn find_reverse_typed(
        &self,
        id: RecordId,
        record_type: RecordType,
    ) -> impl Iterator<Item = &Record> + '_ {
        self.find_reverse(id)
            .filter(move |r| r.record_type() == record_type)
    }

    /// Every (referrer, field) pair pointing at `id`
    pub fn find_reverse_links(
        &self,
        id: RecordId,
    ) -> impl Iterator<Item = (&Record, RefField)> + '_ {
        self.reverse
            .get(&id)
            .into_iter()
            .flat_map(|links| links.iter())
            .filter_map(move |(referrer, field)| self.get(*referrer).map(|r| (r, *field)))
    }

    /// Records whose `field` points at `id`
    pub fn find_reverse_by(
        &self,
        id: RecordId,
        field: RefField,
    ) -> impl Iterator<Item = &Record> + '_ {
        self.find_reverse_links(id)
            .filter(move |(_, f)| *f == field)
            .map(|(record, _)| record)
    }

    /// Insert or replace a record by identifier
    ///
    /// # Panics
    /// When a record with the same identifier but a different type exists.
    /// Use [`Baseline::try_add`] for records read from outside the process.
    pub fn add(&self, record: Record) -> Baseline {
        match self.try_add(record) {
            Ok(next) => next,
            Err(err) => panic!("{}", err),
        }
    }

    /// Insert or replace a record, refusing to change an existing record's type
    pub fn try_add(&self, record: Record) -> Result<Baseline, RecordError> {
        let mut next = self.clone();
        if let Some(existing) = self.records.get(&record.id()) {
            if existing.record_type() != record.record_type() {
                return Err(RecordError::ConflictingType {
                    id: record.id(),
                    existing: existing.record_type(),
                    found: record.record_type(),
                });
            }
            if existing.as_ref() == &record {
                return Ok(next);
            }
            next.unindex(existing);
        }
        next.index(&record);
        next.records.insert(record.id(), Arc::new(record));
        Ok(next)
    }

    pub fn add_all(&self, records: impl IntoIterator<Item = Record>) -> Baseline {
        records
            .into_iter()
            .fold(self.clone(), |baseline, record| baseline.add(record))
    }

    /// Like [`Baseline::add_all`], stopping at the first type conflict
    pub fn try_add_all(
        &self,
        records: impl IntoIterator<Item = Record>,
    ) -> Result<Baseline, RecordError> {
        records
            .into_iter()
            .try_fold(self.clone(), |baseline, record| baseline.try_add(record))
    }

    /// Remove a record by identifier; absent identifiers are a no-op
    pub fn remove(&self, id: RecordId) -> Baseline {
        let mut next = self.clone();
        if let Some(existing) = self.records.get(&id) {
            next.unindex(existing);
            next.records.remove(&id);
        }
        next
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in identifier order
    pub fn iter(&self) -> impl Iterator<Item = &Record> + '_ {
        self.records.values().map(Arc::as_ref)
    }

    /// SHA-256 over the canonical serialized form, hex encoded
    pub fn content_digest(&self) -> String {
        let mut hasher = Sha256::new();
        for record_type in RecordType::ALL {
            hasher.update(record_type.name().as_bytes());
            hasher.update([0u8]);
            for record in self.find_by_type(record_type) {
                for (key, value) in record.get_all_fields() {
                    hasher.update(key.as_bytes());
                    hasher.update([b'=']);
                    hasher.update(value.as_bytes());
                    hasher.update([0u8]);
                }
                hasher.update([b'\n']);
            }
        }
        hex::encode(hasher.finalize())
    }

    fn index(&mut self, record: &Record) {
        let mut ids = self
            .by_type
            .get(&record.record_type())
            .cloned()
            .unwrap_or_default();
        ids.insert(record.id());
        self.by_type.insert(record.record_type(), ids);

        for (field, target) in record.references() {
            let mut links = self.reverse.get(&target).cloned().unwrap_or_default();
            links.insert((record.id(), field));
            self.reverse.insert(target, links);
        }
    }

    fn unindex(&mut self, record: &Record) {
        if let Some(ids) = self.by_type.get(&record.record_type()) {
            let mut ids = ids.clone();
            ids.remove(&record.id());
            if ids.is_empty() {
                self.by_type.remove(&record.record_type());
            } else {
                self.by_type.insert(record.record_type(), ids);
            }
        }

        for (field, target) in record.references() {
            if let Some(links) = self.reverse.get(&target) {
                let mut links = links.clone();
                links.remove(&(record.id(), field));
                if links.is_empty() {
                    self.reverse.remove(&target);
                } else {
                    self.reverse.insert(target, links);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(name: &str) -> Record {
        Record::create(RecordType::Item, [("name", name)])
    }

    #[test]
    fn test_add_get_and_size() {
        let pump = item("Pump");
        let baseline = Baseline::new().add(pump.clone());

        assert_eq!(baseline.size(), 1);
        assert_eq!(baseline.get(pump.id()), Some(&pump));
        assert_eq!(baseline.get_typed(pump.id(), RecordType::Item), Some(&pump));
        assert!(baseline.get_typed(pump.id(), RecordType::Budget).is_none());
    }

    #[test]
    fn test_add_is_idempotent_and_replaces() {
        let pump = item("Pump");
        let once = Baseline::new().add(pump.clone());
        let twice = once.add(pump.clone());
        assert_eq!(once, twice);

        let renamed = pump.as_builder().set("name", "Valve").build(Utc::now());
        let replaced = once.add(renamed.clone());
        assert_eq!(replaced.size(), 1);
        assert_eq!(replaced.get(pump.id()), Some(&renamed));
        // Snapshots are unaffected by later updates
        assert_eq!(once.get(pump.id()), Some(&pump));
    }

    #[test]
    fn test_reverse_index_follows_updates() {
        let pump = item("Pump");
        let valve = item("Valve");
        let function = Record::builder(RecordType::Function)
            .set("name", "Move fluid")
            .container(Some(pump.id()))
            .build(Utc::now());

        let baseline = Baseline::from_records([pump.clone(), valve.clone(), function.clone()]);
        let found: Vec<_> = baseline.find_reverse(pump.id()).map(Record::id).collect();
        assert_eq!(found, vec![function.id()]);

        let moved = function
            .as_builder()
            .container(Some(valve.id()))
            .build(Utc::now());
        let baseline = baseline.add(moved);
        assert_eq!(baseline.find_reverse(pump.id()).count(), 0);
        assert_eq!(
            baseline
                .find_reverse_typed(valve.id(), RecordType::Function)
                .count(),
            1
        );
    }

    #[test]
    fn test_find_reverse_reports_each_record_once() {
        let pump = item("Pump");
        let view = Record::builder(RecordType::ItemView)
            .container(Some(pump.id()))
            .view_of(Some(pump.id()))
            .build(Utc::now());
        let baseline = Baseline::from_records([pump.clone(), view]);

        assert_eq!(baseline.find_reverse(pump.id()).count(), 1);
        assert_eq!(baseline.find_reverse_links(pump.id()).count(), 2);
        assert_eq!(baseline.find_reverse_by(pump.id(), RefField::ViewOf).count(), 1);
    }

    #[test]
    fn test_remove_unindexes_and_ignores_absent_ids() {
        let pump = item("Pump");
        let baseline = Baseline::new().add(pump.clone());

        let absent = baseline.remove(uuid::Uuid::new_v4());
        assert_eq!(absent, baseline);

        let empty = baseline.remove(pump.id());
        assert!(empty.is_empty());
        assert_eq!(empty.find_by_type(RecordType::Item).count(), 0);
    }

    #[test]
    #[should_panic(expected = "already has type")]
    fn test_type_change_panics() {
        let pump = item("Pump");
        let impostor = Record::with_id(pump.id(), RecordType::Budget, [("name", "Mass")]);
        let _ = Baseline::new().add(pump).add(impostor);
    }

    #[test]
    fn test_try_add_refuses_type_change() {
        let pump = item("Pump");
        let impostor = Record::with_id(pump.id(), RecordType::Budget, [("name", "Mass")]);
        let baseline = Baseline::new().add(pump.clone());

        let err = baseline.try_add(impostor.clone()).unwrap_err();
        assert_eq!(
            err,
            RecordError::ConflictingType {
                id: pump.id(),
                existing: RecordType::Item,
                found: RecordType::Budget,
            }
        );
        assert!(baseline.try_add_all([item("Valve"), impostor]).is_err());
        assert_eq!(baseline.get(pump.id()), Some(&pump));
    }

    #[test]
    fn test_content_digest_tracks_content_only() {
        let pump = item("Pump");
        let a = Baseline::new().add(pump.clone());
        let valve = item("Valve");
        let b = Baseline::new()
            .add(valve.clone())
            .add(pump.clone())
            .remove(valve.id());
        assert_eq!(a.content_digest(), b.content_digest());
        assert_ne!(a.content_digest(), Baseline::new().content_digest());
    }
}
