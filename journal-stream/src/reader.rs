//! Entry traversal and tailing.
//!
//! The traversal walks the entry-array chain the header points at: read the
//! array at the current offset, take the item at the current index, advance,
//! read the entry the item points to. A zero item is end-of-log — the state
//! is left in place so a later poll of a growing file picks up right there.
//!
//! [`JournalReader::read_all`] wraps the traversal in the tailing loop: it
//! reloads the header each iteration and uses the file's state byte to decide
//! whether an empty read means "archived, close" or "online, sleep and poll
//! again".

use crate::cursor::Cursor;
use crate::error::{JournalError, Result};
use crate::file::JournalFile;
use crate::filter::FilterExpr;
use crate::object::{Entry, FileState, JournalHeader};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Attributes synthesized on every record rather than read from the file.
pub const ATTR_CURSOR: &str = "__CURSOR";
pub const ATTR_REALTIME_TIMESTAMP: &str = "__REALTIME_TIMESTAMP";
pub const ATTR_MONOTONIC_TIMESTAMP: &str = "__MONOTONIC_TIMESTAMP";

/// How long a tailing reader sleeps when no entry is available.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Capacity of the record channels created by the `spawn` helpers.
pub(crate) const RECORD_CHANNEL_CAPACITY: usize = 256;

/// One log record: the attributes of a single entry.
#[derive(Debug, Clone)]
pub struct Record {
    source: Arc<PathBuf>,
    attributes: BTreeMap<String, Vec<u8>>,
}

impl Record {
    pub(crate) fn new(source: Arc<PathBuf>) -> Self {
        Self {
            source,
            attributes: BTreeMap::new(),
        }
    }

    /// Path of the journal file this record came from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn attributes(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.attributes
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    pub fn into_attributes(self) -> BTreeMap<String, Vec<u8>> {
        self.attributes
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, value: Vec<u8>) {
        self.attributes.insert(name.into(), value);
    }
}

/// Hook invoked for record-scoped errors the host chose to tolerate.
pub type RecordErrorHook = Arc<dyn Fn(&JournalError) + Send + Sync>;

/// Options for a single-file reader.
#[derive(Clone, Default)]
pub struct ReaderOptions {
    poll_interval: Option<Duration>,
    start_cursor: Option<Cursor>,
    filter: Option<FilterExpr>,
    on_record_error: Option<RecordErrorHook>,
}

impl ReaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duration between polls when tailing. Defaults to 200 ms.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Resume the stream at the entry right after this cursor.
    pub fn with_start_cursor(mut self, cursor: Cursor) -> Self {
        self.start_cursor = Some(cursor);
        self
    }

    /// Drop records that do not pass the filter.
    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Demote record-scoped errors (malformed or undecodable payloads) to
    /// warnings: the hook observes the error, the record is skipped, and the
    /// traversal continues. Without a hook they end the stream.
    pub fn with_record_error_hook(mut self, hook: RecordErrorHook) -> Self {
        self.on_record_error = Some(hook);
        self
    }

    pub(crate) fn clear_start_cursor(&mut self) {
        self.start_cursor = None;
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL)
    }
}

/// A positioned traversal over one journal file.
pub struct JournalReader {
    file: JournalFile,
    source: Arc<PathBuf>,
    array_offset: u64,
    item_index: usize,
    options: ReaderOptions,
}

impl JournalReader {
    pub fn open(path: impl Into<PathBuf>, options: ReaderOptions) -> Result<Self> {
        let file = JournalFile::open(path)?;
        Ok(Self::from_file(file, options))
    }

    pub fn from_file(file: JournalFile, options: ReaderOptions) -> Self {
        let source = Arc::new(file.path().to_path_buf());
        let mut reader = Self {
            file,
            source,
            array_offset: 0,
            item_index: 0,
            options,
        };
        reader.rewind();
        reader
    }

    pub fn header(&self) -> &JournalHeader {
        self.file.header()
    }

    pub fn file_id(&self) -> [u8; 16] {
        self.file.file_id()
    }

    /// Reset the traversal to the head of the entry-array chain.
    pub fn rewind(&mut self) {
        self.array_offset = self.file.header().entry_array_offset.get();
        self.item_index = 0;
    }

    /// Yield the next entry, or `None` at the current end of the log.
    ///
    /// At end of log the position is not advanced, so the same call picks up
    /// entries a writer publishes later.
    pub fn next_entry(&mut self) -> Result<Option<Entry>> {
        if self.array_offset == 0 {
            return Ok(None);
        }

        let (entry_offset, next_array, slots) = {
            let array = self.file.entry_array(self.array_offset)?;
            let Some(offset) = array.item(self.item_index) else {
                return Ok(None);
            };
            if offset == 0 {
                return Ok(None);
            }
            (offset, array.next_entry_array_offset, array.len())
        };

        if self.item_index + 1 == slots {
            self.array_offset = next_array;
            self.item_index = 0;
        } else {
            self.item_index += 1;
        }

        let entry = self.file.entry(entry_offset)?;
        Ok(Some(entry.to_owned()))
    }

    /// Assemble the attribute map of `entry`.
    ///
    /// The synthesized attributes go in first, so a data object carrying a
    /// colliding name wins.
    pub fn read_data(&mut self, entry: &Entry) -> Result<Record> {
        let mut record = Record::new(self.source.clone());

        record.insert(
            ATTR_CURSOR,
            self.cursor(entry).to_string().into_bytes(),
        );
        record.insert(
            ATTR_REALTIME_TIMESTAMP,
            entry.realtime.to_string().into_bytes(),
        );
        record.insert(
            ATTR_MONOTONIC_TIMESTAMP,
            entry.monotonic.to_string().into_bytes(),
        );

        for &offset in &entry.items {
            if offset == 0 {
                break;
            }
            let data = self.file.data(offset)?;
            let decoded = crate::compress::decode(data.object.flags, data.payload)?;

            let split = decoded
                .iter()
                .position(|&byte| byte == b'=')
                .ok_or(JournalError::MalformedPayload)?;
            let name = String::from_utf8_lossy(&decoded[..split]).into_owned();
            let value = decoded[split + 1..].to_vec();
            record.insert(name, value);
        }

        Ok(record)
    }

    /// The cursor identifying `entry` in this file.
    pub fn cursor(&self, entry: &Entry) -> Cursor {
        Cursor::new(self.file.header().seqnum_id, entry)
    }

    /// Position the traversal right after the entry `cursor` identifies.
    ///
    /// Reloads the header, rewinds, and scans forward comparing formatted
    /// cursors. On success the next [`next_entry`](Self::next_entry) call
    /// yields the entry following the match; if the stream runs out first the
    /// reader is left at end-of-stream and [`JournalError::CursorNotFound`]
    /// is returned.
    pub fn seek_to_cursor(&mut self, cursor: &Cursor) -> Result<()> {
        self.file.load_header()?;
        self.rewind();

        let target = cursor.to_string();
        while let Some(entry) = self.next_entry()? {
            if self.cursor(&entry).to_string() == target {
                return Ok(());
            }
        }
        Err(JournalError::CursorNotFound)
    }

    /// Spawn the tailing loop on the current runtime and hand back the
    /// receiving end of its record stream.
    pub fn spawn(self, cancel: CancellationToken) -> mpsc::Receiver<Result<Record>> {
        let (tx, rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        tokio::spawn(self.read_all(tx, cancel));
        rx
    }

    /// Tail the file, sending every surviving record into `tx`.
    ///
    /// Runs until the file is archived and drained, the consumer goes away,
    /// cancellation is requested at a poll boundary, or a fatal error occurs.
    /// An online file keeps being polled through a cancellation request: its
    /// writer is still attached, so the stream only ends once the file
    /// leaves the online state. A fatal error is sent as a terminal `Err`
    /// before the channel closes.
    pub async fn read_all(mut self, tx: mpsc::Sender<Result<Record>>, cancel: CancellationToken) {
        if let Err(err) = self.tail(&tx, &cancel).await {
            let _ = tx.send(Err(err)).await;
        }
    }

    async fn tail(
        &mut self,
        tx: &mpsc::Sender<Result<Record>>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if let Some(cursor) = self.options.start_cursor.clone() {
            self.seek_to_cursor(&cursor)?;
        }

        loop {
            // The writer updates the header in place; reload it every
            // iteration to observe new entries and state transitions.
            self.file.load_header()?;

            let Some(entry) = self.next_entry()? else {
                match self.file.header().state() {
                    FileState::Archived => {
                        debug!(path = %self.source.display(), "journal file archived, closing");
                        return Ok(());
                    }
                    // A writer is still attached; keep polling even through a
                    // cancellation request.
                    FileState::Online => {
                        tokio::time::sleep(self.options.poll_interval()).await;
                        continue;
                    }
                    _ => {
                        if cancel.is_cancelled() {
                            return Ok(());
                        }
                        self.pause(cancel).await;
                        continue;
                    }
                }
            };

            match self.read_data(&entry) {
                Ok(record) => {
                    if self
                        .options
                        .filter
                        .as_ref()
                        .is_none_or(|filter| filter.matches(&record))
                        && tx.send(Ok(record)).await.is_err()
                    {
                        // Consumer is gone; nothing left to produce for.
                        return Ok(());
                    }
                }
                Err(err) if err.is_record_scoped() => match &self.options.on_record_error {
                    Some(hook) => {
                        warn!(path = %self.source.display(), error = %err, "skipping record");
                        hook(&err);
                    }
                    None => return Err(err),
                },
                Err(err) => return Err(err),
            }
        }
    }

    /// Sleep for the poll interval, waking early on cancellation so shutdown
    /// does not wait out a full interval.
    async fn pause(&self, cancel: &CancellationToken) {
        tokio::select! {
            _ = tokio::time::sleep(self.options.poll_interval()) => {}
            _ = cancel.cancelled() => {}
        }
    }
}
