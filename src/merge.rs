//! Synchronous k-way merge: the reference ordering the prefetching engine
//! must reproduce.

use std::time::{Duration, Instant};

use crate::frontier::{Frontier, FrontierNode};
use crate::printer::Printer;
use crate::source::{pop_valid, LogSource};
use crate::{Error, LogEntry, MergeConfig, Result};

/// Statistics for a merge run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeStats {
    pub entries: u64,
    pub malformed: u64,
    pub sources: usize,
    pub failed_sources: usize,
    /// Pops issued against sources, including ones that found them exhausted.
    pub pops: u64,
    pub duration: Duration,
}

impl MergeStats {
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.entries as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    pub(crate) fn record_emit(&mut self, progress_interval: u64, start: Instant) {
        self.entries += 1;
        if progress_interval > 0 && self.entries % progress_interval == 0 {
            let elapsed = start.elapsed().as_secs_f64();
            log::info!(
                "Merged {} entries ({:.0} entries/sec)",
                self.entries,
                self.entries as f64 / elapsed
            );
        }
    }
}

pub struct SyncMerge<S> {
    sources: Vec<S>,
    retired: Vec<bool>,
    next_seq: Vec<u64>,
    frontier: Frontier,
    config: MergeConfig,
    stats: MergeStats,
    seeded: bool,
    finished: bool,
}

impl<S: LogSource> SyncMerge<S> {
    pub fn new(sources: Vec<S>) -> Self {
        Self::with_config(sources, MergeConfig::default())
    }

    /// Only `progress_interval` affects a synchronous merge, but the config is
    /// validated on `run` so both engines accept the same configurations.
    pub fn with_config(sources: Vec<S>, config: MergeConfig) -> Self {
        let count = sources.len();
        Self {
            sources,
            retired: vec![false; count],
            next_seq: vec![0; count],
            frontier: Frontier::with_capacity(count),
            config,
            stats: MergeStats {
                sources: count,
                ..MergeStats::default()
            },
            seeded: false,
            finished: false,
        }
    }

    /// Next entry in global order, tagged with its source.
    pub fn next(&mut self) -> Result<Option<FrontierNode>> {
        if !self.seeded {
            self.seed();
        }
        let Some(node) = self.frontier.extract_min() else {
            return Ok(None);
        };
        if let Some(entry) = self.read(node.source) {
            self.push(node.source, entry);
        }
        Ok(Some(node))
    }

    /// Print every entry, then call `done` once.
    pub fn run<P: Printer>(&mut self, mut printer: P) -> Result<MergeStats> {
        if self.finished {
            return Err(Error::Finished);
        }
        self.config.validate()?;
        let start = Instant::now();
        while let Some(node) = self.next()? {
            printer.print(node.entry)?;
            self.stats.record_emit(self.config.progress_interval, start);
        }
        printer.done()?;
        self.finished = true;
        self.stats.duration = start.elapsed();
        log::debug!(
            "sync merge done: {} entries from {} sources",
            self.stats.entries,
            self.stats.sources
        );
        Ok(self.stats.clone())
    }

    pub fn stats(&self) -> &MergeStats {
        &self.stats
    }

    pub fn into_sources(self) -> Vec<S> {
        self.sources
    }

    fn seed(&mut self) {
        self.seeded = true;
        for source in 0..self.sources.len() {
            if let Some(entry) = self.read(source) {
                self.push(source, entry);
            }
        }
    }

    fn push(&mut self, source: usize, entry: LogEntry) {
        let seq = self.next_seq[source];
        self.next_seq[source] += 1;
        self.frontier.insert(FrontierNode::new(entry, source, seq));
    }

    fn read(&mut self, source: usize) -> Option<LogEntry> {
        if self.retired[source] {
            return None;
        }
        self.stats.pops += 1;
        match pop_valid(&mut self.sources[source], source, &mut self.stats.malformed) {
            Ok(Some(entry)) => Some(entry),
            Ok(None) => {
                self.retired[source] = true;
                None
            }
            Err(err) => {
                log::warn!("source {source}: read failed, retiring: {err}");
                self.retired[source] = true;
                self.stats.failed_sources += 1;
                None
            }
        }
    }
}

/// Merge synchronous sources into `printer`.
pub fn merge_sync<S: LogSource, P: Printer>(sources: Vec<S>, printer: P) -> Result<MergeStats> {
    SyncMerge::new(sources).run(printer)
}
