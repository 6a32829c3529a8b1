//! Worker activity log.
//!
//! An append-only audit trail of state-changing outcomes (bundle restored,
//! transfer started, ...). Bounded: once full, the oldest entry is dropped.
//! Every entry is also emitted as a `tracing` info event.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use shelter_types::{Clock, Timestamp};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivityEntry {
    pub timestamp: Timestamp,
    pub worker: &'static str,
    pub message: String,
}

pub struct ActivityLog {
    entries: Mutex<VecDeque<ActivityEntry>>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl ActivityLog {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            clock,
        }
    }

    pub fn record(&self, worker: &'static str, message: impl Into<String>) {
        let entry = ActivityEntry {
            timestamp: self.clock.now(),
            worker,
            message: message.into(),
        };
        tracing::info!(worker, activity = %entry.message, "worker activity");
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Entries oldest first.
    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
