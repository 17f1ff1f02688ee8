//! Log source capabilities and the adapters that implement them.
//!
//! A source yields entries in ascending timestamp order. `Ok(None)` is the
//! exhaustion sentinel: once returned, every later pop returns it too and
//! `is_exhausted` stays `true`.

use std::collections::VecDeque;
use std::io::BufRead;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::{Error, LogEntry, Result};

pub trait LogSource {
    fn pop(&mut self) -> Result<Option<LogEntry>>;

    /// Authoritative after any completed pop.
    fn is_exhausted(&self) -> bool;
}

#[async_trait]
pub trait AsyncLogSource: Send {
    async fn pop(&mut self) -> Result<Option<LogEntry>>;

    fn is_exhausted(&self) -> bool;
}

impl<S: LogSource + ?Sized> LogSource for Box<S> {
    fn pop(&mut self) -> Result<Option<LogEntry>> {
        (**self).pop()
    }

    fn is_exhausted(&self) -> bool {
        (**self).is_exhausted()
    }
}

/// In-memory source over already-sorted entries.
#[derive(Debug, Default)]
pub struct VecSource {
    entries: VecDeque<LogEntry>,
}

impl VecSource {
    pub fn new(entries: impl IntoIterator<Item = LogEntry>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Entries with empty payloads at the given timestamps.
    pub fn from_timestamps(timestamps: impl IntoIterator<Item = u64>) -> Self {
        Self::new(timestamps.into_iter().map(|ts| LogEntry::new(ts, "")))
    }

    pub fn remaining(&self) -> usize {
        self.entries.len()
    }
}

impl LogSource for VecSource {
    fn pop(&mut self) -> Result<Option<LogEntry>> {
        Ok(self.entries.pop_front())
    }

    fn is_exhausted(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reads one entry per line. Blank lines are skipped; unparseable lines are
/// reported as `MalformedEntry` and consumed, so the next pop moves on.
pub struct LineSource<R> {
    reader: R,
    line: String,
    exhausted: bool,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            exhausted: false,
        }
    }
}

impl LineSource<std::io::BufReader<std::fs::File>> {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(Self::new(std::io::BufReader::new(file)))
    }
}

impl<R: BufRead> LogSource for LineSource<R> {
    fn pop(&mut self) -> Result<Option<LogEntry>> {
        while !self.exhausted {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                self.exhausted = true;
                break;
            }
            if self.line.trim().is_empty() {
                continue;
            }
            return LogEntry::from_line(&self.line).map(Some);
        }
        Ok(None)
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

/// Async counterpart of [`LineSource`] over any tokio buffered reader.
pub struct AsyncLineSource<R> {
    reader: R,
    line: String,
    exhausted: bool,
}

impl<R: AsyncBufRead + Unpin + Send> AsyncLineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            exhausted: false,
        }
    }
}

impl AsyncLineSource<tokio::io::BufReader<tokio::fs::File>> {
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(tokio::io::BufReader::new(file)))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> AsyncLogSource for AsyncLineSource<R> {
    async fn pop(&mut self) -> Result<Option<LogEntry>> {
        while !self.exhausted {
            self.line.clear();
            if self.reader.read_line(&mut self.line).await? == 0 {
                self.exhausted = true;
                break;
            }
            if self.line.trim().is_empty() {
                continue;
            }
            return LogEntry::from_line(&self.line).map(Some);
        }
        Ok(None)
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

/// Runs a synchronous source behind the async interface; pops never suspend.
#[derive(Debug)]
pub struct Immediate<S>(pub S);

#[async_trait]
impl<S: LogSource + Send> AsyncLogSource for Immediate<S> {
    async fn pop(&mut self) -> Result<Option<LogEntry>> {
        self.0.pop()
    }

    fn is_exhausted(&self) -> bool {
        self.0.is_exhausted()
    }
}

/// Synchronous source whose pops suspend for a latency taken from a schedule,
/// cycling when the schedule runs out.
pub struct DelayedSource<S> {
    inner: S,
    delays: Vec<Duration>,
    pops: usize,
}

impl<S: LogSource + Send> DelayedSource<S> {
    pub fn new(inner: S, delay: Duration) -> Self {
        Self::with_schedule(inner, vec![delay])
    }

    pub fn with_schedule(inner: S, delays: Vec<Duration>) -> Self {
        Self {
            inner,
            delays,
            pops: 0,
        }
    }

    /// Number of pops issued against the inner source.
    pub fn pops(&self) -> usize {
        self.pops
    }

    fn next_delay(&self) -> Duration {
        if self.delays.is_empty() {
            return Duration::ZERO;
        }
        self.delays[self.pops % self.delays.len()]
    }
}

#[async_trait]
impl<S: LogSource + Send> AsyncLogSource for DelayedSource<S> {
    async fn pop(&mut self) -> Result<Option<LogEntry>> {
        if self.inner.is_exhausted() {
            return Ok(None);
        }
        let delay = self.next_delay();
        self.pops += 1;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.inner.pop()
    }

    fn is_exhausted(&self) -> bool {
        self.inner.is_exhausted()
    }
}

/// Discards malformed entries from a synchronous source, counting them.
pub fn pop_valid<S: LogSource + ?Sized>(
    source: &mut S,
    source_id: usize,
    malformed: &mut u64,
) -> Result<Option<LogEntry>> {
    loop {
        match source.pop() {
            Err(Error::MalformedEntry(reason)) => {
                log::warn!("source {source_id}: discarding malformed entry: {reason}");
                *malformed += 1;
            }
            other => return other,
        }
    }
}
