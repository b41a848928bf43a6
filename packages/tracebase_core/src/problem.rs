//! Detected inconsistencies and the repairs offered for them

use crate::pair::BaselinePair;
use crate::record::{RecordId, RecordType};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Pure repair function over a baseline pair
pub type RepairFn = dyn Fn(&BaselinePair, DateTime<Utc>) -> BaselinePair + Send + Sync;

/// When and in which direction a solution applies
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    /// Parent truth overwrites the child
    FlowDown,
    /// Child truth overwrites the parent
    FlowUp,
    /// Applied automatically when a pair is loaded
    OnLoad,
    /// Applied automatically after an interactive edit
    OnChange,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::FlowDown,
        Direction::FlowUp,
        Direction::OnLoad,
        Direction::OnChange,
    ];
}

/// A described repair
///
/// Applying a solution whose subject has meanwhile disappeared returns the
/// pair unchanged.
#[derive(Clone)]
pub struct Solution {
    description: String,
    apply: Arc<RepairFn>,
}

impl Solution {
    pub fn new<F>(description: impl Into<String>, apply: F) -> Self
    where
        F: Fn(&BaselinePair, DateTime<Utc>) -> BaselinePair + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            apply: Arc::new(apply),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn apply(&self, pair: &BaselinePair, timestamp: DateTime<Utc>) -> BaselinePair {
        (self.apply)(pair, timestamp)
    }
}

impl fmt::Debug for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Solution")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// An invariant violation found in a baseline pair
#[derive(Clone, Debug)]
pub struct Problem {
    pub record_type: RecordType,
    pub description: String,
    /// Records the problem is about (child side first where both apply)
    pub records: Vec<RecordId>,
    flow_down: Option<Solution>,
    flow_up: Option<Solution>,
    on_load: Option<Solution>,
    on_change: Option<Solution>,
}

impl Problem {
    pub fn new(record_type: RecordType, description: impl Into<String>) -> Self {
        Self {
            record_type,
            description: description.into(),
            records: Vec::new(),
            flow_down: None,
            flow_up: None,
            on_load: None,
            on_change: None,
        }
    }

    pub fn for_record(mut self, id: RecordId) -> Self {
        self.records.push(id);
        self
    }

    pub fn flow_down(mut self, solution: Solution) -> Self {
        self.flow_down = Some(solution);
        self
    }

    pub fn flow_up(mut self, solution: Solution) -> Self {
        self.flow_up = Some(solution);
        self
    }

    pub fn on_load(mut self, solution: Solution) -> Self {
        self.on_load = Some(solution);
        self
    }

    pub fn on_change(mut self, solution: Solution) -> Self {
        self.on_change = Some(solution);
        self
    }

    pub fn solution(&self, direction: Direction) -> Option<&Solution> {
        match direction {
            Direction::FlowDown => self.flow_down.as_ref(),
            Direction::FlowUp => self.flow_up.as_ref(),
            Direction::OnLoad => self.on_load.as_ref(),
            Direction::OnChange => self.on_change.as_ref(),
        }
    }

    /// Offered solutions with their direction
    pub fn solutions(&self) -> impl Iterator<Item = (Direction, &Solution)> + '_ {
        Direction::ALL
            .iter()
            .filter_map(move |d| self.solution(*d).map(|s| (*d, s)))
    }

    pub fn is_auto_fixable(&self) -> bool {
        self.on_load.is_some() || self.on_change.is_some()
    }

    /// Sort key giving scans a stable order
    pub fn sort_key(&self) -> (RecordType, &str, &[RecordId]) {
        (self.record_type, self.description.as_str(), self.records.as_slice())
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.record_type, self.description)
    }
}
