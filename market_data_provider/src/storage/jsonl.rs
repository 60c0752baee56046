//! Line-delimited JSON bar file.
//!
//! One serialized [`Bar`] per line, appended in timestamp order. The format
//! is trivially resumable: the last line of the file carries the newest
//! persisted timestamp, which is read once at open and cached afterwards.

use std::{
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use snafu::{ResultExt, ensure};
use tracing::debug;

use super::{BarSink, IoSnafu, OutOfOrderSnafu, SinkError, WriteSnafu};
use crate::models::bar::Bar;

/// Append-only [`BarSink`] writing one JSON object per line.
pub struct JsonlSink {
    path: PathBuf,
    file: File,
    last_ts: Option<i64>,
}

impl JsonlSink {
    /// Opens (or creates) the file at `path`, recovering the last persisted
    /// timestamp from its final line.
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context(IoSnafu)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .context(IoSnafu)?;
        let last_ts = Self::read_last_timestamp(path)?;
        if let Some(ts) = last_ts {
            debug!(path = %path.display(), last_timestamp = ts, "resuming existing bar file");
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            last_ts,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_last_timestamp(path: &Path) -> Result<Option<i64>, SinkError> {
        let reader = BufReader::new(File::open(path).context(IoSnafu)?);
        let mut last_line = None;
        for line in reader.lines() {
            let line = line.context(IoSnafu)?;
            if !line.trim().is_empty() {
                last_line = Some(line);
            }
        }
        let Some(line) = last_line else {
            return Ok(None);
        };
        let bar: Bar = serde_json::from_str(&line).map_err(|e| {
            WriteSnafu {
                message: format!("corrupt trailing line in {}: {e}", path.display()),
            }
            .build()
        })?;
        Ok(Some(bar.timestamp))
    }
}

impl BarSink for JsonlSink {
    fn last_timestamp(&mut self) -> Result<Option<i64>, SinkError> {
        Ok(self.last_ts)
    }

    fn append(&mut self, bar: &Bar) -> Result<(), SinkError> {
        if let Some(last) = self.last_ts {
            ensure!(
                bar.timestamp > last,
                OutOfOrderSnafu {
                    timestamp: bar.timestamp,
                    last,
                }
            );
        }
        let line = serde_json::to_string(bar).map_err(|e| {
            WriteSnafu {
                message: e.to_string(),
            }
            .build()
        })?;
        writeln!(self.file, "{line}").context(IoSnafu)?;
        // Flush per bar so a resumed run never re-downloads persisted data.
        self.file.flush().context(IoSnafu)?;
        self.last_ts = Some(bar.timestamp);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bar(ts: i64, close: f64) -> Bar {
        Bar {
            timestamp: ts,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn fresh_file_has_no_last_timestamp() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonlSink::open(&dir.path().join("bars.jsonl")).unwrap();
        assert_eq!(sink.last_timestamp().unwrap(), None);
    }

    #[test]
    fn reopening_recovers_last_timestamp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("bars.jsonl");

        {
            let mut sink = JsonlSink::open(&path).unwrap();
            sink.append(&bar(100, 1.5)).unwrap();
            sink.append(&bar(160, 1.6)).unwrap();
        }

        let mut sink = JsonlSink::open(&path).unwrap();
        assert_eq!(sink.last_timestamp().unwrap(), Some(160));
        // Appends continue the ordering check across the reopen.
        assert!(matches!(
            sink.append(&bar(160, 1.7)),
            Err(SinkError::OutOfOrder { .. })
        ));
        sink.append(&bar(220, 1.7)).unwrap();
    }

    #[test]
    fn lines_are_valid_json_objects() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bars.jsonl");
        {
            let mut sink = JsonlSink::open(&path).unwrap();
            sink.append(&bar(100, 2.0)).unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: Bar = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(parsed.timestamp, 100);
        assert_eq!(parsed.close, 2.0);
    }

    #[test]
    fn corrupt_trailing_line_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bars.jsonl");
        std::fs::write(&path, "{not json\n").unwrap();
        assert!(matches!(
            JsonlSink::open(&path),
            Err(SinkError::WriteError { .. })
        ));
    }
}
