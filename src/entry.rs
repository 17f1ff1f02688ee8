use std::fmt;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::{Error, Result};

/// A single timestamped log line. Immutable once produced by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp_ns: u64,
    pub payload: String,
}

impl LogEntry {
    pub fn new(timestamp_ns: u64, payload: impl Into<String>) -> Self {
        Self {
            timestamp_ns,
            payload: payload.into(),
        }
    }

    /// Parse `<rfc3339 timestamp> <payload>`. The payload is the remainder of
    /// the line and may be empty.
    pub fn from_line(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (stamp, payload) = line.split_once(' ').unwrap_or((line, ""));
        if stamp.is_empty() {
            return Err(Error::malformed("missing timestamp"));
        }
        let parsed = OffsetDateTime::parse(stamp, &Rfc3339)
            .map_err(|err| Error::malformed(format!("invalid timestamp {stamp:?}: {err}")))?;
        let timestamp_ns = u64::try_from(parsed.unix_timestamp_nanos())
            .map_err(|_| Error::malformed(format!("timestamp {stamp:?} before unix epoch")))?;
        Ok(Self::new(timestamp_ns, payload))
    }

    pub fn to_line(&self) -> Result<String> {
        let stamp = OffsetDateTime::from_unix_timestamp_nanos(self.timestamp_ns as i128)
            .map_err(|err| Error::malformed(err.to_string()))?
            .format(&Rfc3339)
            .map_err(|err| Error::malformed(err.to_string()))?;
        if self.payload.is_empty() {
            Ok(stamp)
        } else {
            Ok(format!("{stamp} {}", self.payload))
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_line() {
            Ok(line) => f.write_str(&line),
            Err(_) => write!(f, "{} {}", self.timestamp_ns, self.payload),
        }
    }
}
