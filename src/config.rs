use crate::buffer::DEFAULT_BUFFER_CAPACITY;
use crate::{Error, Result};

const DEFAULT_PROGRESS_INTERVAL: u64 = 100_000;

/// Upper bound on per-source read-ahead.
pub const MAX_BUFFER_CAPACITY: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeConfig {
    /// Entries a source may be read ahead of consumption. Higher values hide
    /// more latency but hold more entries in memory and waste more reads when
    /// a source ends early.
    pub buffer_capacity: usize,
    /// Log progress every N emitted entries; 0 disables.
    pub progress_interval: u64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl MergeConfig {
    pub fn with_buffer_capacity(mut self, buffer_capacity: usize) -> Self {
        self.buffer_capacity = buffer_capacity;
        self
    }

    pub fn with_progress_interval(mut self, progress_interval: u64) -> Self {
        self.progress_interval = progress_interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(Error::InvalidConfig("buffer_capacity must be at least 1"));
        }
        if self.buffer_capacity > MAX_BUFFER_CAPACITY {
            return Err(Error::InvalidConfig("buffer_capacity exceeds MAX_BUFFER_CAPACITY"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capacity_is_three() {
        let config = MergeConfig::default();
        assert_eq!(config.buffer_capacity, 3);
        config.validate().expect("default is valid");
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = MergeConfig::default().with_buffer_capacity(0);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn oversized_capacity_is_rejected() {
        let config = MergeConfig::default().with_buffer_capacity(MAX_BUFFER_CAPACITY + 1);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        MergeConfig::default()
            .with_buffer_capacity(MAX_BUFFER_CAPACITY)
            .validate()
            .expect("largest capacity is valid");
    }
}
