//! Table trait: per-type behavior shared by the store, the engine and merge
//!
//! Each record type has exactly one stateless [`Table`] implementation,
//! reachable through [`RecordType::table`]. The trait carries ordering,
//! uniqueness constraints, the two-record collapse function and the
//! consistency callbacks the engine fans out to.

use crate::baseline::Baseline;
use crate::engine::classify;
use crate::error::MementoError;
use crate::memento::{self, RecordMemento};
use crate::pair::{BaselinePair, Side};
use crate::problem::{Direction, Problem, Solution};
use crate::record::{Record, RecordId, RecordType, RefField};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub trait Table: Send + Sync {
    fn record_type(&self) -> RecordType;

    /// Parent-side type this table's child records trace to
    fn trace_type(&self) -> Option<RecordType> {
        None
    }

    /// Natural ordering for display
    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        a.id().cmp(&b.id())
    }

    /// Field combinations that must not collide within one baseline
    fn unique_keys(&self) -> Vec<Vec<&'static str>> {
        Vec::new()
    }

    /// Collapse two records into one carrying `left`'s identifier
    ///
    /// # Panics
    /// When either record is not of this table's type.
    fn merge(
        &self,
        _context: &Baseline,
        timestamp: DateTime<Utc>,
        left: &Record,
        right: &Record,
    ) -> Record {
        merge_prefer_left(self.record_type(), timestamp, left, right)
    }

    /// Remove a record and everything composed inside or viewing it
    fn remove(&self, baseline: &Baseline, id: RecordId) -> Baseline {
        cascade_remove(baseline, id)
    }

    fn get_untraced_child_problems(
        &self,
        _pair: &BaselinePair,
        _untraced: &[&Record],
    ) -> Vec<Problem> {
        Vec::new()
    }

    fn get_untraced_parent_problems(
        &self,
        _pair: &BaselinePair,
        _untraced: &[&Record],
    ) -> Vec<Problem> {
        Vec::new()
    }

    fn get_trace_problems(
        &self,
        _pair: &BaselinePair,
        _parent: &Record,
        _children: &[&Record],
    ) -> Vec<Problem> {
        Vec::new()
    }

    /// Problems that do not depend on trace classification
    fn get_integrity_problems(&self, pair: &BaselinePair) -> Vec<Problem> {
        dangling_reference_problems(pair, self.record_type())
    }

    /// Every problem this table reports for a pair
    fn get_problems(&self, pair: &BaselinePair) -> Vec<Problem> {
        let mut problems = self.get_integrity_problems(pair);
        if let Some(trace_type) = self.trace_type() {
            let classification = classify(pair, self.record_type(), trace_type);
            problems.extend(
                self.get_untraced_child_problems(pair, &classification.untraced_children),
            );
            problems.extend(
                self.get_untraced_parent_problems(pair, &classification.untraced_parents),
            );
            for (parent_id, children) in &classification.traced {
                if let Some(parent) = pair.parent().get(*parent_id) {
                    problems.extend(self.get_trace_problems(pair, parent, children));
                }
            }
        }
        problems
    }

    /// Apply every on-load repair this table offers
    fn on_load_autofix(&self, pair: &BaselinePair, timestamp: DateTime<Utc>) -> BaselinePair {
        apply_direction(pair, timestamp, &self.get_problems(pair), Direction::OnLoad)
    }

    /// Cheap repairs run after every edit: uniqueness deduplication
    fn on_change_autofix(&self, pair: &BaselinePair, timestamp: DateTime<Utc>) -> BaselinePair {
        let mut next = pair.clone();
        for key in self.unique_keys() {
            for side in [Side::Parent, Side::Child] {
                next = deduplicate(&next, side, self.record_type(), &key, timestamp);
            }
        }
        next
    }

    fn save_mementos(&self, baseline: &Baseline) -> Vec<RecordMemento> {
        memento::save_mementos(baseline, self.record_type())
    }

    /// Restore this table's mementos; mementos of other types are ignored
    fn restore_mementos(
        &self,
        baseline: &Baseline,
        mementos: &[RecordMemento],
    ) -> Result<Baseline, MementoError> {
        let own: Vec<RecordMemento> = mementos
            .iter()
            .filter(|m| m.record_type == self.record_type())
            .cloned()
            .collect();
        memento::restore_mementos(baseline, &own)
    }
}

/// Apply the solutions of one direction in sequence
pub fn apply_direction(
    pair: &BaselinePair,
    timestamp: DateTime<Utc>,
    problems: &[Problem],
    direction: Direction,
) -> BaselinePair {
    problems
        .iter()
        .filter_map(|p| p.solution(direction))
        .fold(pair.clone(), |next, solution| {
            log::debug!("applying {:?} fix: {}", direction, solution.description());
            solution.apply(&next, timestamp)
        })
}

/// Default collapse: left wins differing fields, gaps are filled from right
pub fn merge_prefer_left(
    record_type: RecordType,
    timestamp: DateTime<Utc>,
    left: &Record,
    right: &Record,
) -> Record {
    assert!(
        left.record_type() == record_type && right.record_type() == record_type,
        "cannot merge {} and {} records in the {} table",
        left.record_type(),
        right.record_type(),
        record_type
    );
    let mut builder = left.as_builder();
    for (field, value) in right.fields() {
        if left.get(field).is_none() {
            builder = builder.set(field, value);
        }
    }
    for (field, target) in right.references() {
        if left.reference(field).is_none() {
            builder = builder.reference(field, Some(target));
        }
    }
    builder.build(timestamp)
}

/// Remove `id` and, through their own tables, every record whose
/// `container` or `viewOf` points at it
pub fn cascade_remove(baseline: &Baseline, id: RecordId) -> Baseline {
    let dependents: Vec<(RecordId, RecordType)> = baseline
        .find_reverse_links(id)
        .filter(|(_, field)| *field != RefField::Trace)
        .map(|(record, _)| (record.id(), record.record_type()))
        .collect();

    dependents
        .into_iter()
        .fold(baseline.remove(id), |next, (dependent, record_type)| {
            record_type.table().remove(&next, dependent)
        })
}

/// Point every reference to `from` at `to` instead
pub fn retarget(
    baseline: &Baseline,
    from: RecordId,
    to: RecordId,
    timestamp: DateTime<Utc>,
) -> Baseline {
    let referrers: Vec<RecordId> = baseline.find_reverse(from).map(Record::id).collect();
    referrers.into_iter().fold(baseline.clone(), |next, id| {
        let Some(current) = next.get(id).cloned() else {
            return next;
        };
        let mut builder = current.as_builder();
        for field in RefField::ALL {
            if current.reference(field) == Some(from) {
                builder = builder.reference(field, Some(to));
            }
        }
        next.add(builder.build(timestamp))
    })
}

/// Collapse records of `record_type` on `side` that collide on `key`
///
/// The lowest identifier survives. References to the losers, including
/// child traces when deduplicating the parent, are re-targeted first.
pub fn deduplicate(
    pair: &BaselinePair,
    side: Side,
    record_type: RecordType,
    key: &[&str],
    timestamp: DateTime<Utc>,
) -> BaselinePair {
    let mut groups: BTreeMap<Vec<String>, Vec<RecordId>> = BTreeMap::new();
    for record in pair.get(side).find_by_type(record_type) {
        let values: Vec<String> = key.iter().map(|f| record.key_value(f)).collect();
        if values.iter().all(String::is_empty) {
            continue;
        }
        groups.entry(values).or_default().push(record.id());
    }

    let table = record_type.table();
    let mut next = pair.clone();
    for ids in groups.values().filter(|ids| ids.len() > 1) {
        let survivor = ids[0];
        for loser in &ids[1..] {
            let baseline = next.get(side);
            let (Some(kept), Some(dropped)) = (baseline.get(survivor), baseline.get(*loser)) else {
                continue;
            };
            log::debug!(
                "merging duplicate {} {} into {} on {:?} side",
                record_type,
                loser,
                survivor,
                side
            );
            let merged = table.merge(baseline, timestamp, kept, dropped);
            let baseline = retarget(&baseline.add(merged), *loser, survivor, timestamp);
            next = next.with(side, baseline.remove(*loser));
            if side == Side::Parent {
                next = next.update(Side::Child, |child| {
                    retarget(child, *loser, survivor, timestamp)
                });
            }
        }
    }
    next
}

/// Container and view references that do not resolve in their own baseline
pub fn dangling_reference_problems(pair: &BaselinePair, record_type: RecordType) -> Vec<Problem> {
    let mut problems = Vec::new();
    for side in [Side::Parent, Side::Child] {
        let baseline = pair.get(side);
        for record in baseline.find_by_type(record_type) {
            for (field, target) in record.references() {
                if field == RefField::Trace || baseline.contains(target) {
                    continue;
                }
                let id = record.id();
                problems.push(
                    Problem::new(
                        record_type,
                        format!(
                            "{} in {:?} baseline refers to missing record {} through {}",
                            label(record),
                            side,
                            target,
                            field.field_name()
                        ),
                    )
                    .for_record(id)
                    .on_load(Solution::new(
                        format!("remove dangling {}", record_type),
                        move |pair, _| remove_if_dangling(pair, side, id, field, target),
                    )),
                );
            }
        }
    }
    problems
}

fn remove_if_dangling(
    pair: &BaselinePair,
    side: Side,
    id: RecordId,
    field: RefField,
    target: RecordId,
) -> BaselinePair {
    let baseline = pair.get(side);
    match baseline.get(id) {
        Some(record) if record.reference(field) == Some(target) && !baseline.contains(target) => {
            let table = record.record_type().table();
            pair.with(side, table.remove(baseline, id))
        }
        _ => pair.clone(),
    }
}

/// Human-readable name of a record for problem descriptions
pub fn label(record: &Record) -> String {
    match record.get("name") {
        Some(name) => format!("{} '{}'", record.record_type(), name),
        None => format!("{} {}", record.record_type(), record.id()),
    }
}
