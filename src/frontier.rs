use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::LogEntry;

/// The current candidate entry of one source.
#[derive(Debug, Clone)]
pub struct FrontierNode {
    pub entry: LogEntry,
    pub source: usize,
    /// Position of the entry within its source, starting at 0.
    pub seq: u64,
}

impl FrontierNode {
    pub fn new(entry: LogEntry, source: usize, seq: u64) -> Self {
        Self { entry, source, seq }
    }
}

impl Ord for FrontierNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Primary: timestamp_ns (ascending)
        // Secondary: source index, so equal timestamps emit deterministically
        // Tertiary: seq (ascending)
        self.entry
            .timestamp_ns
            .cmp(&other.entry.timestamp_ns)
            .then_with(|| self.source.cmp(&other.source))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialEq for FrontierNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierNode {}

impl PartialOrd for FrontierNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap holding at most one node per live source.
#[derive(Debug, Default)]
pub struct Frontier {
    heap: BinaryHeap<Reverse<FrontierNode>>,
}

impl Frontier {
    pub fn with_capacity(sources: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(sources),
        }
    }

    pub fn insert(&mut self, node: FrontierNode) {
        self.heap.push(Reverse(node));
    }

    pub fn extract_min(&mut self) -> Option<FrontierNode> {
        self.heap.pop().map(|Reverse(node)| node)
    }

    pub fn peek_min(&self) -> Option<&FrontierNode> {
        self.heap.peek().map(|Reverse(node)| node)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}
