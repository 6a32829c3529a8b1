//! Cool-down cache for failed transfer starts and resolutions.
//!
//! An id that failed is skipped until `cooldown_secs` have passed since its
//! last failure. Time is read through the injected [`Clock`].

use std::collections::HashMap;
use std::sync::Arc;

use shelter_types::{Clock, Timestamp};

pub struct FailedResolutions {
    failures: HashMap<String, Timestamp>,
    cooldown_secs: u64,
    clock: Arc<dyn Clock>,
}

impl FailedResolutions {
    pub fn new(cooldown_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            failures: HashMap::new(),
            cooldown_secs,
            clock,
        }
    }

    /// Record a failure now. A repeated failure restarts the cool-down.
    pub fn remember(&mut self, id: &str) {
        self.failures.insert(id.to_string(), self.clock.now());
    }

    pub fn is_cooling_down(&self, id: &str) -> bool {
        self.failures
            .get(id)
            .is_some_and(|failed_at| !failed_at.has_expired(self.cooldown_secs, self.clock.now()))
    }

    pub fn forget(&mut self, id: &str) {
        self.failures.remove(id);
    }

    /// Drop entries whose cool-down has elapsed.
    pub fn prune(&mut self) {
        let now = self.clock.now();
        let cooldown = self.cooldown_secs;
        self.failures
            .retain(|_, failed_at| !failed_at.has_expired(cooldown, now));
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}
