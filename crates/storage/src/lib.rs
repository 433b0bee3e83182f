//! Storage Layer
//!
//! Alarm history records and the sink the detection engine appends them to.
//! The engine never reads history back; retention is enforced here.

mod event;
mod repository;

pub use event::{EventType, HistoryEvent};
pub use repository::{HistoryRepository, HistorySink, DEFAULT_MAX_EVENTS};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("History store error: {0}")]
    Store(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}
