use std::io::Write;
use std::time::Instant;

use crate::{Error, LogEntry, Result};

/// Consumer of merged entries. `print` is called once per entry in emission
/// order, `done` once after the last `print`.
pub trait Printer {
    fn print(&mut self, entry: LogEntry) -> Result<()>;

    fn done(&mut self) -> Result<()>;
}

impl<P: Printer + ?Sized> Printer for &mut P {
    fn print(&mut self, entry: LogEntry) -> Result<()> {
        (**self).print(entry)
    }

    fn done(&mut self) -> Result<()> {
        (**self).done()
    }
}

impl Printer for Vec<LogEntry> {
    fn print(&mut self, entry: LogEntry) -> Result<()> {
        self.push(entry);
        Ok(())
    }

    fn done(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes one line per entry in the same format `LineSource` reads.
pub struct LinePrinter<W: Write> {
    writer: W,
    printed: u64,
    started: Option<Instant>,
}

impl<W: Write> LinePrinter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            printed: 0,
            started: None,
        }
    }

    pub fn printed(&self) -> u64 {
        self.printed
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Printer for LinePrinter<W> {
    fn print(&mut self, entry: LogEntry) -> Result<()> {
        self.started.get_or_insert_with(Instant::now);
        writeln!(self.writer, "{}", entry.to_line()?)?;
        self.printed += 1;
        Ok(())
    }

    fn done(&mut self) -> Result<()> {
        self.writer.flush()?;
        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        let rate = if elapsed.as_secs_f64() > 0.0 {
            self.printed as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        log::info!(
            "Printed {} entries in {:.3}s ({:.0} entries/sec)",
            self.printed,
            elapsed.as_secs_f64(),
            rate
        );
        Ok(())
    }
}

/// Enforces the printer contract on top of another printer: chronological
/// order, nothing after `done`, and a single `done`.
pub struct VerifyingPrinter<P> {
    inner: P,
    last_timestamp_ns: Option<u64>,
    printed: u64,
    done: bool,
}

impl<P: Printer> VerifyingPrinter<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            last_timestamp_ns: None,
            printed: 0,
            done: false,
        }
    }

    pub fn printed(&self) -> u64 {
        self.printed
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

impl<P: Printer> Printer for VerifyingPrinter<P> {
    fn print(&mut self, entry: LogEntry) -> Result<()> {
        if self.done {
            return Err(Error::Finished);
        }
        if let Some(previous) = self.last_timestamp_ns {
            if entry.timestamp_ns < previous {
                return Err(Error::OutOfOrder {
                    previous,
                    current: entry.timestamp_ns,
                });
            }
        }
        self.last_timestamp_ns = Some(entry.timestamp_ns);
        self.printed += 1;
        self.inner.print(entry)
    }

    fn done(&mut self) -> Result<()> {
        if self.done {
            return Err(Error::Finished);
        }
        self.done = true;
        self.inner.done()
    }
}
