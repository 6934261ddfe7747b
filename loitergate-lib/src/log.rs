//! Optional decision log: an append-only file recording dropped connections
//! and bookkeeping faults, separate from the host's own logging.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

/// Append-only log of admission decisions.
///
/// Opened once per session; a missing or unwritable path disables it with a
/// warning rather than failing the session. Write failures are reported and
/// otherwise ignored — the log is diagnostic, never load-bearing.
#[derive(Debug, Default)]
pub struct DecisionLog {
    file: Option<File>,
}

impl DecisionLog {
    /// A disabled log that drops every line.
    pub fn disabled() -> Self {
        Self { file: None }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Self { file: Some(file) },
            Err(err) => {
                warn!(path = %path.display(), %err, "unable to open decision log");
                Self { file: None }
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    /// Append one timestamped line.
    pub fn write_line(&mut self, line: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if let Err(err) = writeln!(file, "{stamp} {line}") {
            warn!(%err, "unable to write decision log line");
        }
    }
}
