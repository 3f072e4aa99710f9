//! [`EventLog`] – bounded in-memory record of enforcement outcomes.
//!
//! Keeps the last *N* [`EnforcementEvent`]s for the current run; the oldest
//! entry is evicted when the log is full.  Nothing is persisted.

use std::collections::VecDeque;

use smartmon_types::EnforcementEvent;

pub const DEFAULT_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct EventLog {
    capacity: usize,
    events: VecDeque<EnforcementEvent>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventLog {
    /// A `capacity` of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, event: EnforcementEvent) {
        self.events.push_back(event);
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
    }

    /// Up to `n` most recent events, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &EnforcementEvent> {
        self.events.iter().skip(self.events.len().saturating_sub(n))
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnforcementEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
