//! Chronological merge of independently sorted log sources.
//!
//! [`SyncMerge`] is the plain k-way merge over sources whose pops return
//! immediately. [`AsyncMerge`] produces the same sequence from sources whose
//! pops suspend, hiding their latency behind bounded per-source prefetching.

pub mod buffer;
pub mod config;
pub mod entry;
pub mod error;
pub mod frontier;
pub mod merge;
pub mod prefetch;
pub mod printer;
pub mod source;

pub use buffer::PrefetchBuffer;
pub use config::MergeConfig;
pub use entry::LogEntry;
pub use error::{Error, Result};
pub use frontier::{Frontier, FrontierNode};
pub use merge::{merge_sync, MergeStats, SyncMerge};
pub use prefetch::{merge_async, AsyncMerge, BoxedSource, MergeState};
pub use printer::{LinePrinter, Printer, VerifyingPrinter};
pub use source::{
    AsyncLineSource, AsyncLogSource, DelayedSource, Immediate, LineSource, LogSource, VecSource,
};
