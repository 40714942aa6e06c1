//! Question history used to keep generated questions from repeating.

pub mod store;

pub use store::{HistoryEntry, HistoryError, HistoryResult, HistoryStore, DEFAULT_CAPACITY};
