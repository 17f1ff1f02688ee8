use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Recoverable: the offending entry is discarded and its source keeps being read.
    #[error("malformed entry: {0}")]
    MalformedEntry(String),
    #[error("prefetch buffer full (capacity {capacity})")]
    BufferFull { capacity: usize },
    #[error("entry out of order: {current} after {previous}")]
    OutOfOrder { previous: u64, current: u64 },
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("merge already finished")]
    Finished,
    #[error("corrupt merge state: {0}")]
    Corrupt(&'static str),
}

impl Error {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedEntry(reason.into())
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Error::MalformedEntry(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
