//! Positioned I/O over a single journal file.
//!
//! `JournalFile` owns the file handle and one scratch buffer that every
//! object payload is read into. The typed views handed out by the accessors
//! borrow that buffer, which makes the lifecycle explicit: a view is valid
//! until the next read, and anything a caller wants to keep must be copied
//! out first.
//!
//! The header is deliberately cheap to reload. A tailing reader re-reads it
//! on every poll to observe state transitions and newly published objects,
//! since the writer updates it in place.

use crate::error::{JournalError, Result};
use crate::object::{
    DataObject, EntryArrayObject, EntryObject, FieldObject, HashTableObject, JournalHeader,
    ObjectHeader, ObjectType, TagObject, HEADER_READ_SIZE, OBJECT_HEADER_SIZE,
};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use zerocopy::{FromBytes, FromZeros};

/// Largest object payload the reader will materialize.
pub const OBJECT_SIZE_MAX: usize = 1 << 30;

/// File-absolute offset of the `file_id` header field.
const FILE_ID_OFFSET: u64 = 24;

/// Read the 16-byte `file_id` without parsing the rest of the header.
///
/// The directory watcher uses this to recognize files it is already tailing
/// before spending a full open on them.
pub fn read_file_id(path: impl AsRef<Path>) -> Result<[u8; 16]> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(FILE_ID_OFFSET))?;

    let mut id = [0u8; 16];
    read_exact_or_short(&mut file, &mut id, FILE_ID_OFFSET)?;
    Ok(id)
}

fn read_exact_or_short(file: &mut File, buf: &mut [u8], offset: u64) -> Result<()> {
    file.read_exact(buf).map_err(|err| {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            JournalError::ShortRead {
                offset,
                needed: buf.len(),
            }
        } else {
            JournalError::Io(err)
        }
    })
}

/// An open journal file plus the scratch buffer its object views borrow.
pub struct JournalFile {
    file: File,
    path: PathBuf,
    header: JournalHeader,
    compact: bool,
    file_len: u64,
    scratch: Vec<u8>,
}

impl JournalFile {
    /// Open `path` read-only and load its header.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path)?;

        let mut journal = Self {
            file,
            path,
            header: JournalHeader::new_zeroed(),
            compact: false,
            file_len: 0,
            scratch: Vec::new(),
        };
        journal.load_header()?;
        Ok(journal)
    }

    /// Re-read the header from offset 0.
    ///
    /// Fails with [`JournalError::BadSignature`] when the magic is wrong and
    /// [`JournalError::ShortRead`] when the file is shorter than a header.
    pub fn load_header(&mut self) -> Result<()> {
        self.file_len = self.file.metadata()?.len();
        self.file.seek(SeekFrom::Start(0))?;

        let mut buf = [0u8; HEADER_READ_SIZE];
        read_exact_or_short(&mut self.file, &mut buf, 0)?;

        let header = JournalHeader::parse(&buf)?;
        self.compact = header.is_compact();
        self.header = header;
        Ok(())
    }

    pub fn header(&self) -> &JournalHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_compact(&self) -> bool {
        self.compact
    }

    /// Stable identity of this file, for deduplication across globs.
    pub fn file_id(&self) -> [u8; 16] {
        self.header.file_id
    }

    /// Every offset is validated before the seek: object offsets are nonzero
    /// multiples of 8 inside the file. A corrupt chain can point anywhere,
    /// so the check runs on each dereference.
    fn check_offset(&self, offset: u64) -> Result<()> {
        if offset == 0 || offset % 8 != 0 || offset >= self.file_len {
            return Err(JournalError::BadOffset(offset));
        }
        Ok(())
    }

    /// Read the object header at `offset` and its payload into the scratch
    /// buffer. The returned slice is invalidated by the next read.
    fn read_object(&mut self, offset: u64) -> Result<(ObjectHeader, &[u8])> {
        self.check_offset(offset)?;
        self.file.seek(SeekFrom::Start(offset))?;

        let mut buf = [0u8; OBJECT_HEADER_SIZE];
        read_exact_or_short(&mut self.file, &mut buf, offset)?;
        let object = ObjectHeader::read_from_bytes(&buf).map_err(|_| JournalError::BadObject {
            offset,
            reason: "unreadable object header".into(),
        })?;

        let payload_len = object.payload_size(offset)?;
        if payload_len > OBJECT_SIZE_MAX {
            return Err(JournalError::BadObject {
                offset,
                reason: format!("object payload of {payload_len} bytes exceeds the maximum"),
            });
        }

        if self.scratch.len() < payload_len {
            self.scratch.resize(payload_len, 0);
        }
        read_exact_or_short(
            &mut self.file,
            &mut self.scratch[..payload_len],
            offset + OBJECT_HEADER_SIZE as u64,
        )?;

        Ok((object, &self.scratch[..payload_len]))
    }

    fn expect_type(offset: u64, object: &ObjectHeader, expected: ObjectType) -> Result<()> {
        if object.object_type() != Some(expected) {
            return Err(JournalError::BadObject {
                offset,
                reason: format!("expected {:?} object, found type {}", expected, object.type_),
            });
        }
        Ok(())
    }

    pub fn entry_array(&mut self, offset: u64) -> Result<EntryArrayObject<'_>> {
        let compact = self.compact;
        let (object, payload) = self.read_object(offset)?;
        Self::expect_type(offset, &object, ObjectType::EntryArray)?;
        EntryArrayObject::from_payload(object, offset, payload, compact)
    }

    pub fn entry(&mut self, offset: u64) -> Result<EntryObject<'_>> {
        let compact = self.compact;
        let (object, payload) = self.read_object(offset)?;
        Self::expect_type(offset, &object, ObjectType::Entry)?;
        EntryObject::from_payload(object, offset, payload, compact)
    }

    pub fn data(&mut self, offset: u64) -> Result<DataObject<'_>> {
        let compact = self.compact;
        let (object, payload) = self.read_object(offset)?;
        Self::expect_type(offset, &object, ObjectType::Data)?;
        DataObject::from_payload(object, offset, payload, compact)
    }

    pub fn field(&mut self, offset: u64) -> Result<FieldObject<'_>> {
        let (object, payload) = self.read_object(offset)?;
        Self::expect_type(offset, &object, ObjectType::Field)?;
        FieldObject::from_payload(object, offset, payload)
    }

    pub fn hash_table(&mut self, offset: u64) -> Result<HashTableObject<'_>> {
        let (object, payload) = self.read_object(offset)?;
        match object.object_type() {
            Some(ObjectType::DataHashTable) | Some(ObjectType::FieldHashTable) => {}
            _ => {
                return Err(JournalError::BadObject {
                    offset,
                    reason: format!("expected hash table object, found type {}", object.type_),
                })
            }
        }
        HashTableObject::from_payload(object, offset, payload)
    }

    pub fn tag(&mut self, offset: u64) -> Result<TagObject> {
        let (object, payload) = self.read_object(offset)?;
        Self::expect_type(offset, &object, ObjectType::Tag)?;
        TagObject::from_payload(object, offset, payload)
    }
}
