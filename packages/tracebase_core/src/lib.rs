// Tracebase - Versioned record store with parent/child consistency and three-way table merge

pub mod baseline;
pub mod config;
pub mod engine;
pub mod error;
pub mod memento;
pub mod merge;
pub mod pair;
pub mod problem;
pub mod record;
pub mod table;
pub mod table_file;
pub mod tables;

pub use baseline::Baseline;
pub use config::EngineConfig;
pub use engine::{ConsistencyEngine, RepairObserver};
pub use error::{MementoError, RecordError, TableFileError};
pub use merge::merge_tables;
pub use pair::{BaselinePair, Side, UndoState};
pub use problem::{Direction, Problem, Solution};
pub use record::{Record, RecordBuilder, RecordId, RecordType, RefField};
pub use table::Table;
pub use table_file::TableData;
