//! Directory monitoring: glob scan, dedup, per-file fan-out.
//!
//! The watcher periodically expands its include patterns, identifies each
//! candidate by the `file_id` in its header, and starts one tailing task per
//! previously unseen id. All tasks share one record channel; ordering is
//! FIFO per file and arbitrary across files.
//!
//! Files that disappear from the globs are not reaped — rotated files end
//! their own traversal once they are archived and drained.

use crate::error::Result;
use crate::file;
use crate::reader::{JournalReader, Record, ReaderOptions, RECORD_CHANNEL_CAPACITY};
use std::collections::HashSet;
use std::path::Path;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Discovers journal files matching glob patterns and merges their streams.
pub struct DirectoryWatcher {
    include: Vec<String>,
    options: ReaderOptions,
    seen: HashSet<[u8; 16]>,
}

impl DirectoryWatcher {
    /// Validates every include pattern up front.
    pub fn new(include: Vec<String>, options: ReaderOptions) -> Result<Self> {
        for pattern in &include {
            glob::Pattern::new(pattern)?;
        }

        Ok(Self {
            include,
            options,
            seen: HashSet::new(),
        })
    }

    /// Spawn the watcher on the current runtime and hand back the receiving
    /// end of the merged record stream.
    pub fn spawn(self, cancel: CancellationToken) -> mpsc::Receiver<Result<Record>> {
        let (tx, rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        tokio::spawn(self.run(tx, cancel));
        rx
    }

    /// Scan loop. Holds `tx` for its own lifetime; per-file tasks hold
    /// clones, so the stream closes once the watcher stops and every
    /// traversal has finished.
    pub async fn run(mut self, tx: mpsc::Sender<Result<Record>>, cancel: CancellationToken) {
        let poll_interval = self.options.poll_interval();

        while !cancel.is_cancelled() {
            self.scan(&tx, &cancel);

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = cancel.cancelled() => break,
            }
        }
    }

    fn scan(&mut self, tx: &mpsc::Sender<Result<Record>>, cancel: &CancellationToken) {
        for pattern in &self.include {
            let paths = match glob::glob(pattern) {
                Ok(paths) => paths,
                Err(err) => {
                    warn!(pattern, error = %err, "skipping include pattern");
                    continue;
                }
            };

            for path in paths.flatten() {
                match try_open(&path, &self.options, &mut self.seen) {
                    Ok(Some(reader)) => {
                        debug!(path = %path.display(), "tailing new journal file");
                        tokio::spawn(reader.read_all(tx.clone(), cancel.clone()));
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "skipping journal candidate");
                    }
                }
            }
        }
    }
}

/// Open `path` unless its `file_id` is already being tailed.
fn try_open(
    path: &Path,
    options: &ReaderOptions,
    seen: &mut HashSet<[u8; 16]>,
) -> Result<Option<JournalReader>> {
    let file_id = file::read_file_id(path)?;
    if !seen.insert(file_id) {
        return Ok(None);
    }

    // A start cursor names an entry in one specific file; it cannot apply to
    // every file a glob discovers.
    let mut options = options.clone();
    options.clear_start_cursor();

    let reader = JournalReader::open(path, options)?;
    Ok(Some(reader))
}
