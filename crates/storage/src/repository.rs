//! History Repository Implementation

use crate::{EventType, HistoryEvent, StorageError};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Default number of events kept by the repository
pub const DEFAULT_MAX_EVENTS: usize = 1000;

/// Destination for alarm history emitted by the detection engine
pub trait HistorySink {
    /// Append one event. Ownership of the event passes to the sink.
    fn append_event(&self, event: HistoryEvent) -> Result<(), StorageError>;
}

impl<T: HistorySink + ?Sized> HistorySink for Arc<T> {
    fn append_event(&self, event: HistoryEvent) -> Result<(), StorageError> {
        (**self).append_event(event)
    }
}

/// In-memory history store with bounded retention
pub struct HistoryRepository {
    /// Events in insertion order (oldest first)
    events: Mutex<VecDeque<HistoryEvent>>,
    /// Max events kept before the oldest are dropped
    max_events: usize,
}

impl HistoryRepository {
    /// Create an empty repository with default retention
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_EVENTS)
    }

    /// Create an empty repository keeping at most `max_events`
    pub fn with_capacity(max_events: usize) -> Self {
        info!("Creating history repository (retention: {} events)", max_events);
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events.min(DEFAULT_MAX_EVENTS))),
            max_events,
        }
    }

    /// Restore a repository from a persisted JSON list
    pub fn from_json(json: &str, max_events: usize) -> Result<Self, StorageError> {
        let saved: Vec<HistoryEvent> = serde_json::from_str(json)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        let repo = Self::with_capacity(max_events);
        {
            let mut events = repo.lock()?;
            for event in saved {
                push_bounded(&mut events, event, max_events);
            }
            debug!("Restored {} history events", events.len());
        }
        Ok(repo)
    }

    /// Serialize the full history as a JSON list, oldest first
    pub fn to_json(&self) -> Result<String, StorageError> {
        let events = self.lock()?;
        let list: Vec<&HistoryEvent> = events.iter().collect();
        serde_json::to_string(&list).map_err(|e| StorageError::SerializationError(e.to_string()))
    }

    /// All events, oldest first
    pub fn events(&self) -> Result<Vec<HistoryEvent>, StorageError> {
        Ok(self.lock()?.iter().cloned().collect())
    }

    /// Most recent events, newest first
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryEvent>, StorageError> {
        Ok(self.lock()?.iter().rev().take(limit).cloned().collect())
    }

    /// Event counts per type; types never seen are omitted
    pub fn count_by_type(&self) -> Result<BTreeMap<EventType, usize>, StorageError> {
        let events = self.lock()?;
        let mut counts = BTreeMap::new();
        for event in events.iter() {
            *counts.entry(event.event_type).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Number of stored events
    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all history
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
            info!("History cleared");
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<HistoryEvent>>, StorageError> {
        self.events
            .lock()
            .map_err(|e| StorageError::Store(format!("Lock error: {}", e)))
    }
}

impl HistorySink for HistoryRepository {
    fn append_event(&self, event: HistoryEvent) -> Result<(), StorageError> {
        let mut events = self.lock()?;
        debug!("History event {} ({}) at {}", event.id, event.event_type, event.timestamp);
        push_bounded(&mut events, event, self.max_events);
        Ok(())
    }
}

impl Default for HistoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn push_bounded(events: &mut VecDeque<HistoryEvent>, event: HistoryEvent, max_events: usize) {
    events.push_back(event);
    while events.len() > max_events {
        events.pop_front();
    }
}
