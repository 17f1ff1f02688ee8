use std::time::Duration;

use async_trait::async_trait;
use logmerge::{
    merge_async, merge_sync, AsyncLogSource, AsyncMerge, BoxedSource, DelayedSource, Error,
    Immediate, LogEntry, MergeConfig, MergeState, Printer, Result, VecSource, VerifyingPrinter,
};

fn timestamps(entries: &[LogEntry]) -> Vec<u64> {
    entries.iter().map(|entry| entry.timestamp_ns).collect()
}

fn delayed(stamps: &[u64], delay_ms: u64) -> BoxedSource {
    Box::new(DelayedSource::new(
        VecSource::from_timestamps(stamps.to_vec()),
        Duration::from_millis(delay_ms),
    ))
}

/// Sorted source with a deterministic jittered latency schedule.
fn jittered(seed: u64, len: usize) -> (Vec<LogEntry>, DelayedSource<VecSource>) {
    let mut state = seed;
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        state >> 33
    };
    let mut ts = 0;
    let mut entries = Vec::with_capacity(len);
    for i in 0..len {
        ts += next() % 5;
        entries.push(LogEntry::new(ts, format!("s{seed}-{i}")));
    }
    let delays = (0..7).map(|_| Duration::from_micros(next() % 8_000)).collect();
    let source = DelayedSource::with_schedule(VecSource::new(entries.clone()), delays);
    (entries, source)
}

/// Async source that yields scripted results, then exhausts.
struct Scripted {
    script: Vec<Result<Option<LogEntry>>>,
    exhausted: bool,
}

impl Scripted {
    fn new(mut script: Vec<Result<Option<LogEntry>>>) -> Self {
        script.reverse();
        Self {
            script,
            exhausted: false,
        }
    }
}

#[async_trait]
impl AsyncLogSource for Scripted {
    async fn pop(&mut self) -> Result<Option<LogEntry>> {
        tokio::task::yield_now().await;
        match self.script.pop() {
            Some(Ok(None)) | None => {
                self.exhausted = true;
                Ok(None)
            }
            Some(other) => other,
        }
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

#[tokio::test(start_paused = true)]
async fn merges_interleaved_sources() {
    let sources = vec![
        delayed(&[1, 4, 7], 3),
        delayed(&[2, 5, 8], 1),
        delayed(&[3, 6, 9], 2),
    ];
    let mut printer = VerifyingPrinter::new(Vec::<LogEntry>::new());

    let stats = merge_async(sources, &mut printer).await.expect("merge");

    assert!(printer.is_done());
    assert_eq!(stats.entries, 9);
    assert_eq!(timestamps(&printer.into_inner()), (1..=9).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn matches_the_synchronous_merge() {
    let mut expected_sources = Vec::new();
    let mut sources: Vec<BoxedSource> = Vec::new();
    for seed in 1..=6 {
        let (entries, source) = jittered(seed, 40 + seed as usize * 7);
        expected_sources.push(VecSource::new(entries));
        sources.push(Box::new(source));
    }
    let mut expected: Vec<LogEntry> = Vec::new();
    merge_sync(expected_sources, &mut expected).expect("sync merge");

    let config = MergeConfig::default().with_buffer_capacity(2);
    let mut merge = AsyncMerge::with_config(sources, config);
    let mut printer = VerifyingPrinter::new(Vec::<LogEntry>::new());
    let stats = merge.run(&mut printer).await.expect("async merge");

    assert_eq!(stats.entries as usize, expected.len());
    assert!(merge.peak_buffered() <= 2);
    assert_eq!(printer.into_inner(), expected);
}

#[tokio::test(start_paused = true)]
async fn prefetch_overlaps_latency_across_sources() {
    let sources = vec![
        delayed(&[1, 4, 7], 10),
        delayed(&[2, 5, 8], 10),
        delayed(&[3, 6, 9], 10),
    ];
    let start = tokio::time::Instant::now();

    let mut out: Vec<LogEntry> = Vec::new();
    merge_async(sources, &mut out).await.expect("merge");

    // Nine sequential pops would take 90ms; the three sources read concurrently.
    assert!(start.elapsed() < Duration::from_millis(45), "{:?}", start.elapsed());
    assert_eq!(out.len(), 9);
}

#[tokio::test(start_paused = true)]
async fn buffers_never_exceed_capacity() {
    for capacity in 1..=4 {
        let sources: Vec<BoxedSource> = (0..4)
            .map(|i: u64| delayed(&(0..25).map(|t| t * 4 + i).collect::<Vec<u64>>(), 1 + i))
            .collect();
        let config = MergeConfig::default().with_buffer_capacity(capacity);
        let mut merge = AsyncMerge::with_config(sources, config);
        let mut printer = VerifyingPrinter::new(Vec::<LogEntry>::new());

        let stats = merge.run(&mut printer).await.expect("merge");

        assert_eq!(stats.entries, 100);
        assert!(merge.peak_buffered() <= capacity);
        assert_eq!(timestamps(&printer.into_inner()), (0..100).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn empty_source_is_ignored() {
    let sources: Vec<BoxedSource> = vec![
        Box::new(Immediate(VecSource::from_timestamps([]))),
        Box::new(Immediate(VecSource::from_timestamps([10, 20, 30, 40, 50]))),
    ];
    let mut out: Vec<LogEntry> = Vec::new();

    merge_async(sources, &mut out).await.expect("merge");

    assert_eq!(timestamps(&out), vec![10, 20, 30, 40, 50]);
}

#[tokio::test]
async fn malformed_entries_are_skipped() {
    let sources: Vec<BoxedSource> = vec![
        Box::new(Scripted::new(vec![
            Ok(Some(LogEntry::new(1, "a"))),
            Err(Error::malformed("missing timestamp")),
            Ok(Some(LogEntry::new(4, "b"))),
        ])),
        Box::new(Immediate(VecSource::from_timestamps([2, 3]))),
    ];
    let mut out: Vec<LogEntry> = Vec::new();

    let stats = merge_async(sources, &mut out).await.expect("merge");

    assert_eq!(timestamps(&out), vec![1, 2, 3, 4]);
    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.failed_sources, 0);
}

#[tokio::test]
async fn failing_sources_are_isolated() {
    let broken = || Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"));
    let sources: Vec<BoxedSource> = vec![
        Box::new(Scripted::new(vec![Ok(Some(LogEntry::new(1, ""))), Err(broken())])),
        Box::new(Immediate(VecSource::from_timestamps([2, 5]))),
        Box::new(Scripted::new(vec![Err(broken())])),
    ];
    let mut printer = VerifyingPrinter::new(Vec::<LogEntry>::new());

    let stats = merge_async(sources, &mut printer).await.expect("merge");

    assert!(printer.is_done());
    assert_eq!(stats.failed_sources, 2);
    assert_eq!(timestamps(&printer.into_inner()), vec![1, 2, 5]);
}

#[tokio::test]
async fn all_sources_failing_emits_nothing() {
    let sources: Vec<BoxedSource> = (0..3)
        .map(|_| -> BoxedSource {
            Box::new(Scripted::new(vec![Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "unreachable",
            )))]))
        })
        .collect();
    let mut printer = VerifyingPrinter::new(Vec::<LogEntry>::new());

    let stats = merge_async(sources, &mut printer).await.expect("merge");

    assert_eq!(stats.entries, 0);
    assert_eq!(stats.failed_sources, 3);
    assert!(printer.is_done());
}

#[tokio::test]
async fn rerun_over_exhausted_sources_emits_nothing() {
    let sources: Vec<BoxedSource> = vec![
        Box::new(Immediate(VecSource::from_timestamps([1, 2]))),
        Box::new(Immediate(VecSource::from_timestamps([3]))),
    ];
    let mut merge = AsyncMerge::new(sources);
    let mut first: Vec<LogEntry> = Vec::new();
    merge.run(&mut first).await.expect("first run");
    assert_eq!(first.len(), 3);

    let mut again = AsyncMerge::new(merge.into_sources());
    let mut printer = VerifyingPrinter::new(Vec::<LogEntry>::new());
    let stats = again.run(&mut printer).await.expect("second run");

    assert_eq!(again.state(), MergeState::Done);
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.pops, 0);
    assert!(printer.is_done());
    assert!(printer.into_inner().is_empty());
}

#[tokio::test]
async fn printer_errors_abort_the_merge() {
    let sources: Vec<BoxedSource> = vec![
        Box::new(Immediate(VecSource::from_timestamps([1, 2]))),
    ];
    let mut printer = VerifyingPrinter::new(Vec::<LogEntry>::new());
    printer.done().expect("premature done");

    let mut merge = AsyncMerge::new(sources);
    assert!(matches!(merge.run(&mut printer).await, Err(Error::Finished)));
    assert_eq!(merge.state(), MergeState::Done);
}

/// Printer whose writes start failing after `limit` entries.
struct FailAfter {
    limit: usize,
    printed: usize,
}

impl Printer for FailAfter {
    fn print(&mut self, _entry: LogEntry) -> Result<()> {
        if self.printed == self.limit {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "stdout closed",
            )));
        }
        self.printed += 1;
        Ok(())
    }

    fn done(&mut self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn failed_run_hands_back_sources_owned_by_fetches() {
    let config = MergeConfig::default().with_buffer_capacity(1);
    let mut merge = AsyncMerge::with_config(vec![delayed(&[1, 2, 3, 4], 10)], config);
    let mut printer = FailAfter {
        limit: 1,
        printed: 0,
    };

    // The second print fails while a refill of the only source is outstanding.
    assert!(matches!(merge.run(&mut printer).await, Err(Error::Io(_))));
    assert_eq!(printer.printed, 1);
    assert_eq!(merge.state(), MergeState::Done);
    assert_eq!(merge.into_sources().len(), 1);
}
