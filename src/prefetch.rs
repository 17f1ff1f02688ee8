//! Asynchronous merge with per-source prefetching.
//!
//! Every source owns a [`PrefetchBuffer`] and contributes at most one node to
//! the [`Frontier`]. Reads are issued as fetch futures that take ownership of
//! their source until they resolve, so a source never has two pops in flight,
//! while fetches for different sources overlap. The engine only blocks on the
//! fetch of the source whose frontier slot is empty; everything else is polled
//! opportunistically between emissions.

use std::time::Instant;

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, StreamExt};

use crate::buffer::PrefetchBuffer;
use crate::frontier::{Frontier, FrontierNode};
use crate::merge::MergeStats;
use crate::printer::Printer;
use crate::source::AsyncLogSource;
use crate::{Error, LogEntry, MergeConfig, Result};

pub type BoxedSource = Box<dyn AsyncLogSource>;

const FETCH_PREALLOC: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    Seeding,
    Running,
    /// Every source has reported exhaustion; only buffered entries remain.
    Draining,
    Done,
}

struct Lane {
    /// `None` while a fetch owns the source.
    source: Option<BoxedSource>,
    buffer: PrefetchBuffer,
    in_flight: bool,
    /// The lane currently has a node in the frontier.
    represented: bool,
    next_seq: u64,
}

struct Fetched {
    lane: usize,
    source: BoxedSource,
    entries: Vec<LogEntry>,
    exhausted: bool,
    failed: bool,
    malformed: u64,
    pops: u64,
}

/// Pop up to `want` entries, one at a time, stopping early on exhaustion.
async fn fetch(lane: usize, mut source: BoxedSource, want: usize) -> Fetched {
    let mut entries = Vec::with_capacity(want.min(FETCH_PREALLOC));
    let mut exhausted = source.is_exhausted();
    let mut failed = false;
    let mut malformed = 0;
    let mut pops = 0;

    while !exhausted && entries.len() < want {
        pops += 1;
        match source.pop().await {
            Ok(Some(entry)) => {
                entries.push(entry);
                exhausted = source.is_exhausted();
            }
            Ok(None) => exhausted = true,
            Err(Error::MalformedEntry(reason)) => {
                log::warn!("source {lane}: discarding malformed entry: {reason}");
                malformed += 1;
            }
            Err(err) => {
                log::warn!("source {lane}: read failed, retiring: {err}");
                failed = true;
                exhausted = true;
            }
        }
    }

    Fetched {
        lane,
        source,
        entries,
        exhausted,
        failed,
        malformed,
        pops,
    }
}

pub struct AsyncMerge {
    lanes: Vec<Lane>,
    frontier: Frontier,
    in_flight: FuturesUnordered<BoxFuture<'static, Fetched>>,
    config: MergeConfig,
    stats: MergeStats,
    state: MergeState,
    exhausted_lanes: usize,
    peak_buffered: usize,
}

impl AsyncMerge {
    pub fn new(sources: Vec<BoxedSource>) -> Self {
        Self::with_config(sources, MergeConfig::default())
    }

    pub fn with_config(sources: Vec<BoxedSource>, config: MergeConfig) -> Self {
        let count = sources.len();
        let lanes = sources
            .into_iter()
            .map(|source| Lane {
                source: Some(source),
                buffer: PrefetchBuffer::new(config.buffer_capacity),
                in_flight: false,
                represented: false,
                next_seq: 0,
            })
            .collect();
        Self {
            lanes,
            frontier: Frontier::with_capacity(count),
            in_flight: FuturesUnordered::new(),
            config,
            stats: MergeStats {
                sources: count,
                ..MergeStats::default()
            },
            state: MergeState::Seeding,
            exhausted_lanes: 0,
            peak_buffered: 0,
        }
    }

    pub fn state(&self) -> MergeState {
        self.state
    }

    pub fn stats(&self) -> &MergeStats {
        &self.stats
    }

    /// Largest number of entries any single buffer has held.
    pub fn peak_buffered(&self) -> usize {
        self.peak_buffered
    }

    /// Sources in their original order. After a failed run, entries already
    /// fetched from them but not yet emitted are gone.
    pub fn into_sources(self) -> Vec<BoxedSource> {
        self.lanes.into_iter().filter_map(|lane| lane.source).collect()
    }

    /// Print every entry in global order, then call `done` once. The engine is
    /// finished afterwards, whether or not the run succeeded.
    pub async fn run<P: Printer>(&mut self, mut printer: P) -> Result<MergeStats> {
        if self.state == MergeState::Done {
            return Err(Error::Finished);
        }
        let result = self.drive(&mut printer).await;
        self.state = MergeState::Done;
        if let Err(err) = result {
            self.reclaim_sources().await;
            return Err(err);
        }
        printer.done()?;
        log::debug!(
            "async merge done: {} entries from {} sources ({} pops)",
            self.stats.entries,
            self.stats.sources,
            self.stats.pops
        );
        Ok(self.stats.clone())
    }

    async fn drive<P: Printer>(&mut self, printer: &mut P) -> Result<()> {
        self.config.validate()?;
        let start = Instant::now();
        self.seed().await?;

        while let Some(node) = self.frontier.extract_min() {
            let lane = node.source;
            self.lanes[lane].represented = false;
            printer.print(node.entry)?;
            self.stats.record_emit(self.config.progress_interval, start);
            self.poll_prefetches()?;
            self.advance(lane).await?;
        }

        if !self.in_flight.is_empty() {
            return Err(Error::Corrupt("fetch outstanding after frontier drained"));
        }
        self.stats.duration = start.elapsed();
        Ok(())
    }

    /// Wait out outstanding fetches so every lane owns its source again.
    async fn reclaim_sources(&mut self) {
        while let Some(fetched) = self.in_flight.next().await {
            let lane = &mut self.lanes[fetched.lane];
            lane.source = Some(fetched.source);
            lane.in_flight = false;
        }
    }

    async fn seed(&mut self) -> Result<()> {
        let want = self
            .config
            .buffer_capacity
            .checked_add(1)
            .ok_or(Error::InvalidConfig("buffer_capacity too large"))?;
        for lane in 0..self.lanes.len() {
            self.start_fetch(lane, want)?;
        }
        while let Some(fetched) = self.in_flight.next().await {
            self.land(fetched)?;
        }
        self.state = MergeState::Running;
        self.check_draining();
        log::debug!(
            "seeded frontier with {} of {} sources",
            self.frontier.len(),
            self.lanes.len()
        );
        Ok(())
    }

    /// Refill the frontier slot of `lane` after its node was emitted.
    async fn advance(&mut self, lane: usize) -> Result<()> {
        while !self.lanes[lane].represented {
            if let Some(entry) = self.lanes[lane].buffer.pop_front() {
                self.insert(lane, entry);
                break;
            }
            if self.lanes[lane].buffer.is_exhausted() {
                log::debug!("source {lane} retired");
                return Ok(());
            }
            if !self.lanes[lane].in_flight {
                self.start_fetch(lane, self.config.buffer_capacity)?;
            }
            while self.lanes[lane].in_flight && !self.lanes[lane].represented {
                let fetched = self
                    .in_flight
                    .next()
                    .await
                    .ok_or(Error::Corrupt("no fetch outstanding for waiting source"))?;
                self.land(fetched)?;
            }
        }
        self.schedule_refill(lane)
    }

    /// Land fetches that already resolved and give the rest a chance to make
    /// progress, without waiting.
    fn poll_prefetches(&mut self) -> Result<()> {
        while let Some(Some(fetched)) = self.in_flight.next().now_or_never() {
            self.land(fetched)?;
        }
        Ok(())
    }

    fn start_fetch(&mut self, lane: usize, want: usize) -> Result<()> {
        let state = &mut self.lanes[lane];
        let source = state
            .source
            .take()
            .ok_or(Error::Corrupt("source already owned by a fetch"))?;
        state.in_flight = true;
        log::debug!("source {lane}: fetching up to {want} entries");
        self.in_flight.push(fetch(lane, source, want).boxed());
        Ok(())
    }

    fn schedule_refill(&mut self, lane: usize) -> Result<()> {
        let state = &self.lanes[lane];
        if state.buffer.is_empty() && !state.buffer.is_exhausted() && !state.in_flight {
            self.start_fetch(lane, self.config.buffer_capacity)?;
        }
        Ok(())
    }

    fn land(&mut self, fetched: Fetched) -> Result<()> {
        let lane = fetched.lane;
        self.stats.pops += fetched.pops;
        self.stats.malformed += fetched.malformed;
        if fetched.failed {
            self.stats.failed_sources += 1;
        }

        self.lanes[lane].source = Some(fetched.source);
        self.lanes[lane].in_flight = false;

        let mut entries = fetched.entries.into_iter();
        if !self.lanes[lane].represented {
            if let Some(first) = entries.next() {
                self.insert(lane, first);
            }
        }
        let state = &mut self.lanes[lane];
        for entry in entries {
            state.buffer.push(entry)?;
        }
        self.peak_buffered = self.peak_buffered.max(state.buffer.len());

        if fetched.exhausted && !state.buffer.is_exhausted() {
            state.buffer.mark_exhausted();
            self.exhausted_lanes += 1;
            log::debug!("source {lane} exhausted");
            self.check_draining();
        }
        self.schedule_refill(lane)
    }

    fn insert(&mut self, lane: usize, entry: LogEntry) {
        let state = &mut self.lanes[lane];
        let seq = state.next_seq;
        state.next_seq += 1;
        state.represented = true;
        self.frontier.insert(FrontierNode::new(entry, lane, seq));
    }

    fn check_draining(&mut self) {
        if self.state == MergeState::Running && self.exhausted_lanes == self.lanes.len() {
            self.state = MergeState::Draining;
            log::debug!("all sources exhausted, draining {} buffered", self.frontier.len());
        }
    }
}

/// Merge asynchronous sources into `printer` with the default configuration.
pub async fn merge_async<P: Printer>(sources: Vec<BoxedSource>, printer: P) -> Result<MergeStats> {
    AsyncMerge::new(sources).run(printer).await
}
