use std::collections::VecDeque;

use crate::{Error, LogEntry, Result};

pub const DEFAULT_BUFFER_CAPACITY: usize = 3;

/// Bounded FIFO of entries fetched ahead of consumption for one source.
///
/// Holds no ordering logic: a source already yields its entries sorted.
#[derive(Debug)]
pub struct PrefetchBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    exhausted: bool,
}

impl PrefetchBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            exhausted: false,
        }
    }

    /// Rejects the entry instead of growing past capacity.
    pub fn push(&mut self, entry: LogEntry) -> Result<()> {
        if self.entries.len() >= self.capacity {
            return Err(Error::BufferFull {
                capacity: self.capacity,
            });
        }
        self.entries.push_back(entry);
        Ok(())
    }

    pub fn pop_front(&mut self) -> Option<LogEntry> {
        self.entries.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mark_exhausted(&mut self) {
        self.exhausted = true;
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Exhausted and fully drained: the source has nothing left to give.
    pub fn is_retired(&self) -> bool {
        self.exhausted && self.entries.is_empty()
    }
}

impl Default for PrefetchBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}
