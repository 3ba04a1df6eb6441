//! Streaming reader for systemd journal files.
//!
//! This crate provides:
//! - Low-level journal file format I/O: [`mod@file`] and [`object`] modules
//! - Entry traversal, cursors and tailing: [`reader`] and [`cursor`] modules
//! - Glob-driven directory monitoring: [`watch`] module
//! - Record selection: [`filter`] module
//!
//! # Examples
//!
//! ```no_run
//! use journal_stream::{JournalReader, ReaderOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> journal_stream::Result<()> {
//! let reader = JournalReader::open("/var/log/journal/system.journal", ReaderOptions::new())?;
//! let mut records = reader.spawn(CancellationToken::new());
//!
//! while let Some(record) = records.recv().await {
//!     let record = record?;
//!     println!("{:?}", record.get("MESSAGE"));
//! }
//! # Ok(())
//! # }
//! ```

// Fixed-width little-endian extraction
pub mod codec;

// Core error types used throughout the crate
pub mod error;

// Typed views over on-disk objects
pub mod object;

// Data payload decompression
pub mod compress;

// Positioned file I/O and the scratch buffer
pub mod file;

// The textual cursor interchange format
pub mod cursor;

// Entry traversal and tailing
pub mod reader;

// Record selection
pub mod filter;

// Glob-driven directory monitoring
pub mod watch;

// Re-export commonly used types for convenience
pub use cursor::Cursor;
pub use error::{JournalError, Result};
pub use file::JournalFile;
pub use filter::{AttrMatch, FilterExpr};
pub use object::{Entry, FileState, JournalHeader};
pub use reader::{
    JournalReader, ReaderOptions, Record, ATTR_CURSOR, ATTR_MONOTONIC_TIMESTAMP,
    ATTR_REALTIME_TIMESTAMP, DEFAULT_POLL_INTERVAL,
};
pub use watch::DirectoryWatcher;
