use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;

use logmerge::{
    AsyncLineSource, AsyncMerge, BoxedSource, DelayedSource, LineSource, LinePrinter, MergeConfig,
    SyncMerge,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log files, each sorted by timestamp
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Entries each source may be read ahead of consumption
    #[arg(short, long, default_value_t = 3)]
    capacity: usize,

    /// Use the synchronous merge instead of the prefetching one
    #[arg(long)]
    sync: bool,

    /// Simulated latency added to every pop, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = MergeConfig::default().with_buffer_capacity(args.capacity);
    config.validate().context("invalid merge configuration")?;

    let stdout = std::io::stdout();
    let printer = LinePrinter::new(BufWriter::new(stdout.lock()));

    info!("Merging {} files", args.files.len());

    let stats = if args.sync {
        let mut sources = Vec::with_capacity(args.files.len());
        for path in &args.files {
            let source = LineSource::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            sources.push(source);
        }
        SyncMerge::with_config(sources, config).run(printer)?
    } else {
        let mut sources: Vec<BoxedSource> = Vec::with_capacity(args.files.len());
        for path in &args.files {
            match args.delay_ms {
                Some(ms) => {
                    let source = LineSource::open(path)
                        .with_context(|| format!("failed to open {}", path.display()))?;
                    sources.push(Box::new(DelayedSource::new(source, Duration::from_millis(ms))));
                }
                None => {
                    let source = AsyncLineSource::open(path)
                        .await
                        .with_context(|| format!("failed to open {}", path.display()))?;
                    sources.push(Box::new(source));
                }
            }
        }
        AsyncMerge::with_config(sources, config).run(printer).await?
    };

    info!(
        "Merged {} entries from {} sources in {:?} ({} malformed, {} failed sources)",
        stats.entries, stats.sources, stats.duration, stats.malformed, stats.failed_sources
    );
    Ok(())
}
