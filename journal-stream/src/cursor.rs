//! The textual cursor interchange format.
//!
//! A cursor pins one entry by the file's sequence-number id plus the entry's
//! own identity, formatted as six `key=hex` fields joined by `;`:
//!
//! ```text
//! s=<seqnum_id>;i=<seqnum>;b=<boot_id>;m=<monotonic>;t=<realtime>;x=<xor_hash>
//! ```
//!
//! The 128-bit ids keep their leading zeros (32 hex characters); the 64-bit
//! integers use natural lowercase hex. The format is wire-compatible with
//! cursors handed out by journald itself.

use crate::error::{JournalError, Result};
use crate::object::Entry;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub seqnum_id: [u8; 16],
    pub seqnum: u64,
    pub boot_id: [u8; 16],
    pub monotonic: u64,
    pub realtime: u64,
    pub xor_hash: u64,
}

impl Cursor {
    /// The cursor of `entry` within the file identified by `seqnum_id`.
    pub fn new(seqnum_id: [u8; 16], entry: &Entry) -> Self {
        Self {
            seqnum_id,
            seqnum: entry.seqnum,
            boot_id: entry.boot_id,
            monotonic: entry.monotonic,
            realtime: entry.realtime,
            xor_hash: entry.xor_hash,
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "s={};i={:x};b={};m={:x};t={:x};x={:x}",
            hex::encode(self.seqnum_id),
            self.seqnum,
            hex::encode(self.boot_id),
            self.monotonic,
            self.realtime,
            self.xor_hash,
        )
    }
}

fn parse_id(value: &str) -> Result<[u8; 16]> {
    if value.len() != 32 {
        return Err(JournalError::BadCursor);
    }
    let bytes = hex::decode(value).map_err(|_| JournalError::BadCursor)?;
    bytes.try_into().map_err(|_| JournalError::BadCursor)
}

fn parse_hex(value: &str) -> Result<u64> {
    if value.is_empty() {
        return Err(JournalError::BadCursor);
    }
    u64::from_str_radix(value, 16).map_err(|_| JournalError::BadCursor)
}

fn next_field<'a>(fields: &mut std::str::Split<'a, char>, label: &str) -> Result<&'a str> {
    let field = fields.next().ok_or(JournalError::BadCursor)?;
    field
        .strip_prefix(label)
        .and_then(|rest| rest.strip_prefix('='))
        .ok_or(JournalError::BadCursor)
}

impl FromStr for Cursor {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self> {
        let mut fields = s.split(';');

        let cursor = Cursor {
            seqnum_id: parse_id(next_field(&mut fields, "s")?)?,
            seqnum: parse_hex(next_field(&mut fields, "i")?)?,
            boot_id: parse_id(next_field(&mut fields, "b")?)?,
            monotonic: parse_hex(next_field(&mut fields, "m")?)?,
            realtime: parse_hex(next_field(&mut fields, "t")?)?,
            xor_hash: parse_hex(next_field(&mut fields, "x")?)?,
        };

        if fields.next().is_some() {
            return Err(JournalError::BadCursor);
        }
        Ok(cursor)
    }
}
