//! Consistency engine: scan a baseline pair for problems and repair them
//!
//! Every call is stateless given a pair snapshot and a timestamp. Scans
//! fan out to the tables' callbacks; repairs are re-derived from scratch
//! after each pass, so all fixes must be idempotent and narrow.

use crate::config::EngineConfig;
use crate::pair::BaselinePair;
use crate::problem::{Direction, Problem, Solution};
use crate::record::{Record, RecordId, RecordType, RefField};
use crate::table::Table;
use crate::tables;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Child records of one type partitioned by the parent record they trace to
#[derive(Debug, Default)]
pub struct TraceClassification<'a> {
    /// Trace absent, unresolvable, or resolving to a record of the wrong type
    pub untraced_children: Vec<&'a Record>,
    /// Parent id -> child records tracing to it
    pub traced: BTreeMap<RecordId, Vec<&'a Record>>,
    /// Parent records of the trace type that no child of this type traces to
    pub untraced_parents: Vec<&'a Record>,
}

/// Partition child records of `record_type` by their trace into the parent
pub fn classify(
    pair: &BaselinePair,
    record_type: RecordType,
    trace_type: RecordType,
) -> TraceClassification<'_> {
    let mut classification = TraceClassification::default();

    for child in pair.child().find_by_type(record_type) {
        match child
            .trace()
            .filter(|id| pair.parent().get_typed(*id, trace_type).is_some())
        {
            Some(parent_id) => classification
                .traced
                .entry(parent_id)
                .or_default()
                .push(child),
            None => classification.untraced_children.push(child),
        }
    }

    classification.untraced_parents = pair
        .parent()
        .find_by_type(trace_type)
        .filter(|parent| {
            !pair
                .child()
                .find_reverse_by(parent.id(), RefField::Trace)
                .any(|child| child.record_type() == record_type)
        })
        .collect();

    classification
}

/// Notified whenever a repair changes a pair
///
/// Passed to the engine explicitly by whoever needs to follow repairs
/// (the editor's change log, tests).
pub trait RepairObserver: Send + Sync {
    fn repaired(
        &self,
        record_type: RecordType,
        direction: Direction,
        before: &BaselinePair,
        after: &BaselinePair,
    );
}

pub struct ConsistencyEngine {
    tables: Vec<&'static dyn Table>,
    config: EngineConfig,
    observers: Vec<Arc<dyn RepairObserver>>,
}

impl Default for ConsistencyEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl ConsistencyEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            tables: tables::all(),
            config,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RepairObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tables(&self) -> &[&'static dyn Table] {
        &self.tables
    }

    /// All problems in a pair, in a stable order
    pub fn get_problems(&self, pair: &BaselinePair) -> Vec<Problem> {
        let mut problems: Vec<Problem> = if self.config.parallel_scan {
            std::thread::scope(|scope| {
                let handles: Vec<_> = self
                    .tables
                    .iter()
                    .map(|table| scope.spawn(move || table.get_problems(pair)))
                    .collect();
                handles
                    .into_iter()
                    .flat_map(|handle| match handle.join() {
                        Ok(problems) => problems,
                        Err(panic) => std::panic::resume_unwind(panic),
                    })
                    .collect()
            })
        } else {
            self.tables
                .iter()
                .flat_map(|table| table.get_problems(pair))
                .collect()
        };
        problems.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        problems
    }

    /// Repair everything repairable on load, up to a fixed point
    pub fn on_load_autofix(&self, pair: &BaselinePair, timestamp: DateTime<Utc>) -> BaselinePair {
        let mut current = pair.clone();
        for pass in 1..=self.config.max_autofix_passes {
            let start = current.clone();
            for table in &self.tables {
                let next = table.on_load_autofix(&current, timestamp);
                self.notify(table.record_type(), Direction::OnLoad, &current, &next);
                current = next;
            }
            if self.config.on_change_after_load {
                current = self.on_change_autofix(&current, timestamp);
            }
            if current == start {
                log::info!("on-load autofix converged after {} pass(es)", pass);
                return current;
            }
        }
        log::warn!(
            "on-load autofix did not converge within {} passes",
            self.config.max_autofix_passes
        );
        current
    }

    /// Cheap repairs after an interactive edit, up to a fixed point
    pub fn on_change_autofix(&self, pair: &BaselinePair, timestamp: DateTime<Utc>) -> BaselinePair {
        let mut current = pair.clone();
        for _ in 0..self.config.max_autofix_passes {
            let start = current.clone();
            for table in &self.tables {
                let next = table.on_change_autofix(&current, timestamp);
                self.notify(table.record_type(), Direction::OnChange, &current, &next);
                current = next;
            }
            if current == start {
                return current;
            }
        }
        log::warn!(
            "on-change autofix did not converge within {} passes",
            self.config.max_autofix_passes
        );
        current
    }

    /// Apply one solution the user picked for a problem
    pub fn apply(
        &self,
        pair: &BaselinePair,
        timestamp: DateTime<Utc>,
        problem: &Problem,
        direction: Direction,
    ) -> BaselinePair {
        let Some(solution) = problem.solution(direction) else {
            return pair.clone();
        };
        self.apply_solution(pair, timestamp, problem.record_type, direction, solution)
    }

    fn apply_solution(
        &self,
        pair: &BaselinePair,
        timestamp: DateTime<Utc>,
        record_type: RecordType,
        direction: Direction,
        solution: &Solution,
    ) -> BaselinePair {
        log::debug!("applying {:?} solution: {}", direction, solution.description());
        let next = solution.apply(pair, timestamp);
        self.notify(record_type, direction, pair, &next);
        next
    }

    fn notify(
        &self,
        record_type: RecordType,
        direction: Direction,
        before: &BaselinePair,
        after: &BaselinePair,
    ) {
        if before == after {
            return;
        }
        for observer in &self.observers {
            observer.repaired(record_type, direction, before, after);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::Baseline;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(RecordType, Direction)>>,
    }

    impl RepairObserver for Recorder {
        fn repaired(&self, t: RecordType, d: Direction, _: &BaselinePair, _: &BaselinePair) {
            self.seen.lock().unwrap().push((t, d));
        }
    }

    fn budget(name: &str) -> Record {
        Record::create(RecordType::Budget, [("name", name), ("unit", "kg")])
    }

    #[test]
    fn test_classify_partitions_children() {
        let parent_budget = budget("Mass");
        let lonely_parent = budget("Power");
        let traced = budget("Mass")
            .as_builder()
            .trace(Some(parent_budget.id()))
            .build(Utc::now());
        let stale = budget("Heat")
            .as_builder()
            .trace(Some(uuid::Uuid::new_v4()))
            .build(Utc::now());

        let pair = BaselinePair::new(
            Baseline::from_records([parent_budget.clone(), lonely_parent.clone()]),
            Baseline::from_records([traced.clone(), stale.clone()]),
        );
        let c = classify(&pair, RecordType::Budget, RecordType::Budget);

        assert_eq!(c.untraced_children.len(), 1);
        assert_eq!(c.untraced_children[0].id(), stale.id());
        assert_eq!(c.traced[&parent_budget.id()][0].id(), traced.id());
        let untraced_parents: Vec<_> = c.untraced_parents.iter().map(|r| r.id()).collect();
        assert_eq!(untraced_parents, vec![lonely_parent.id()]);
    }

    #[test]
    fn test_observers_see_only_effective_repairs() {
        let recorder = Arc::new(Recorder::default());
        let engine = ConsistencyEngine::default().with_observer(recorder.clone());

        let parent = budget("Mass");
        let child = budget("Mass");
        let pair = BaselinePair::new(Baseline::new().add(parent), Baseline::new().add(child));

        let fixed = engine.on_load_autofix(&pair, Utc::now());
        assert!(engine.get_problems(&fixed).is_empty());
        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![(RecordType::Budget, Direction::OnLoad)]);

        // Nothing left to do on a consistent pair
        recorder.seen.lock().unwrap().clear();
        assert_eq!(engine.on_load_autofix(&fixed, Utc::now()), fixed);
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_parallel_scan_matches_sequential() {
        let pair = BaselinePair::new(
            Baseline::from_records([budget("Mass"), budget("Power")]),
            Baseline::from_records([budget("Heat")]),
        );
        let sequential = ConsistencyEngine::default().get_problems(&pair);
        let parallel = ConsistencyEngine::new(EngineConfig {
            parallel_scan: true,
            ..EngineConfig::default()
        })
        .get_problems(&pair);

        let describe = |ps: &[Problem]| ps.iter().map(|p| p.to_string()).collect::<Vec<_>>();
        assert_eq!(describe(&sequential), describe(&parallel));
        assert!(!sequential.is_empty());
    }
}
