//! Typed views over the journal file's on-disk object graph.
//!
//! Layouts follow <https://systemd.io/JOURNAL_FILE_FORMAT/>. Every multi-byte
//! field is little-endian; fixed prefixes are reinterpreted with `zerocopy`
//! and the variable tails are borrowed from the reader's scratch buffer, so a
//! view is only valid until the next object is read.

use crate::codec;
use crate::error::{JournalError, Result};
use static_assertions::const_assert_eq;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// The first eight bytes of every journal file.
pub const SIGNATURE: [u8; 8] = *b"LPKSHHRH";

/// How many bytes `load_header` reads from the front of the file.
///
/// Larger than the layout we interpret, leaving room for fields added by
/// journal versions newer than this reader.
pub const HEADER_READ_SIZE: usize = 296;

/// Minimum `header_size` any valid file can declare.
pub const HEADER_SIZE_MIN: u64 = 208;

/// Size of the common object header preceding every object payload.
pub const OBJECT_HEADER_SIZE: usize = 16;

/// Incompatible-flags bits. A reader that does not understand one of these
/// cannot interpret the file; `Compact` is the only bit that changes the
/// traversal itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IncompatibleFlag {
    CompressedXz = 1 << 0,
    CompressedLz4 = 1 << 1,
    KeyedHash = 1 << 2,
    CompressedZstd = 1 << 3,
    Compact = 1 << 4,
}

/// Compatible-flags bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CompatibleFlag {
    Sealed = 1 << 0,
    TailEntryBootId = 1 << 1,
}

/// Write state recorded in the header's state byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Offline,
    Online,
    Archived,
    Unknown(u8),
}

impl From<u8> for FileState {
    fn from(byte: u8) -> Self {
        match byte {
            0 => FileState::Offline,
            1 => FileState::Online,
            2 => FileState::Archived,
            other => FileState::Unknown(other),
        }
    }
}

/// The journal file header at offset 0.
///
/// Fields past `tail_entry_monotonic` were added over time; whether they are
/// present is governed by `header_size`, and [`parse`](Self::parse) zeroes
/// the ones the file is too old to carry.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Clone, Copy, Debug)]
#[repr(C)]
pub struct JournalHeader {
    pub signature: [u8; 8],
    pub compatible_flags: U32,
    pub incompatible_flags: U32,
    pub state: u8,
    pub reserved: [u8; 7],
    pub file_id: [u8; 16],
    pub machine_id: [u8; 16],
    pub tail_entry_boot_id: [u8; 16],
    pub seqnum_id: [u8; 16],
    pub header_size: U64,
    pub arena_size: U64,
    pub data_hash_table_offset: U64,
    pub data_hash_table_size: U64,
    pub field_hash_table_offset: U64,
    pub field_hash_table_size: U64,
    pub tail_object_offset: U64,
    pub n_objects: U64,
    pub n_entries: U64,
    pub tail_entry_seqnum: U64,
    pub head_entry_seqnum: U64,
    pub entry_array_offset: U64,
    pub head_entry_realtime: U64,
    pub tail_entry_realtime: U64,
    pub tail_entry_monotonic: U64,
    // Added in 187
    pub n_data: U64,
    pub n_fields: U64,
    // Added in 189
    pub n_tags: U64,
    pub n_entry_arrays: U64,
    // Added in 246
    pub data_hash_chain_depth: U64,
    pub field_hash_chain_depth: U64,
    // Added in 252
    pub tail_entry_array_offset: U64,
    pub tail_entry_array_n_entries: U64,
    // Added in 254
    pub tail_entry_offset: U64,
}

const_assert_eq!(std::mem::size_of::<JournalHeader>(), 280);

impl JournalHeader {
    /// Parse and validate a header from the buffer read off the file.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let (header, _) =
            JournalHeader::ref_from_prefix(buf).map_err(|_| JournalError::ShortRead {
                offset: 0,
                needed: std::mem::size_of::<JournalHeader>(),
            })?;

        if header.signature != SIGNATURE {
            return Err(JournalError::BadSignature);
        }

        let mut header = *header;
        if header.header_size.get() < HEADER_SIZE_MIN {
            return Err(JournalError::BadObject {
                offset: 0,
                reason: format!("header_size {} below minimum", header.header_size.get()),
            });
        }

        header.clear_absent_fields();
        Ok(header)
    }

    /// Zero every field the declared `header_size` does not cover, so absent
    /// fields read as zero everywhere downstream.
    fn clear_absent_fields(&mut self) {
        let header_size = self.header_size.get();

        if header_size <= 208 {
            self.n_data = U64::new(0);
            self.n_fields = U64::new(0);
        }
        if header_size <= 224 {
            self.n_tags = U64::new(0);
            self.n_entry_arrays = U64::new(0);
        }
        if header_size <= 240 {
            self.data_hash_chain_depth = U64::new(0);
            self.field_hash_chain_depth = U64::new(0);
        }
        if header_size <= 256 {
            self.tail_entry_array_offset = U64::new(0);
            self.tail_entry_array_n_entries = U64::new(0);
        }
        if header_size <= 272 {
            self.tail_entry_offset = U64::new(0);
        }
    }

    pub fn has_incompatible_flag(&self, flag: IncompatibleFlag) -> bool {
        self.incompatible_flags.get() & flag as u32 != 0
    }

    pub fn has_compatible_flag(&self, flag: CompatibleFlag) -> bool {
        self.compatible_flags.get() & flag as u32 != 0
    }

    pub fn is_compact(&self) -> bool {
        self.has_incompatible_flag(IncompatibleFlag::Compact)
    }

    pub fn state(&self) -> FileState {
        FileState::from(self.state)
    }
}

/// Object type tag in the first byte of every object header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectType {
    Unused = 0,
    Data = 1,
    Field = 2,
    Entry = 3,
    DataHashTable = 4,
    FieldHashTable = 5,
    EntryArray = 6,
    Tag = 7,
}

impl ObjectType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ObjectType::Unused),
            1 => Some(ObjectType::Data),
            2 => Some(ObjectType::Field),
            3 => Some(ObjectType::Entry),
            4 => Some(ObjectType::DataHashTable),
            5 => Some(ObjectType::FieldHashTable),
            6 => Some(ObjectType::EntryArray),
            7 => Some(ObjectType::Tag),
            _ => None,
        }
    }
}

/// The 16-byte header preceding every object in the arena.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Clone, Copy, Debug)]
#[repr(C)]
pub struct ObjectHeader {
    pub type_: u8,
    pub flags: u8,
    pub reserved: [u8; 6],
    pub size: U64,
}

const_assert_eq!(std::mem::size_of::<ObjectHeader>(), OBJECT_HEADER_SIZE);

impl ObjectHeader {
    pub fn object_type(&self) -> Option<ObjectType> {
        ObjectType::from_u8(self.type_)
    }

    /// Declared payload length: total size minus the object header itself.
    pub fn payload_size(&self, offset: u64) -> Result<usize> {
        let size = self.size.get();
        if size < OBJECT_HEADER_SIZE as u64 {
            return Err(JournalError::BadObject {
                offset,
                reason: format!("object size {size} smaller than its header"),
            });
        }
        Ok((size - OBJECT_HEADER_SIZE as u64) as usize)
    }
}

/// Fixed prefix of an entry payload.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Clone, Copy, Debug)]
#[repr(C)]
pub struct EntryHeader {
    pub seqnum: U64,
    pub realtime: U64,
    pub monotonic: U64,
    pub boot_id: [u8; 16],
    pub xor_hash: U64,
}

const_assert_eq!(std::mem::size_of::<EntryHeader>(), 48);

/// One item of a regular-mode entry.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Clone, Copy, Debug)]
#[repr(C)]
pub struct EntryItem {
    pub object_offset: U64,
    pub hash: U64,
}

const_assert_eq!(std::mem::size_of::<EntryItem>(), 16);

/// Fixed prefix of a data payload.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Clone, Copy, Debug)]
#[repr(C)]
pub struct DataHeader {
    pub hash: U64,
    pub next_hash_offset: U64,
    pub next_field_offset: U64,
    pub entry_offset: U64,
    pub entry_array_offset: U64,
    pub n_entries: U64,
}

const_assert_eq!(std::mem::size_of::<DataHeader>(), 48);

/// Fixed prefix of a field payload.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Clone, Copy, Debug)]
#[repr(C)]
pub struct FieldHeader {
    pub hash: U64,
    pub next_hash_offset: U64,
    pub head_data_offset: U64,
}

/// One bucket of a data or field hash table.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Clone, Copy, Debug)]
#[repr(C)]
pub struct HashItem {
    pub head_hash_offset: U64,
    pub tail_hash_offset: U64,
}

const_assert_eq!(std::mem::size_of::<HashItem>(), 16);

/// Fixed payload of a tag object: an HMAC-SHA256 seal over a seqnum range.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Clone, Copy, Debug)]
#[repr(C)]
pub struct TagHeader {
    pub seqnum: U64,
    pub epoch: U64,
    pub tag: [u8; 32],
}

const_assert_eq!(std::mem::size_of::<TagHeader>(), 48);

fn bad_object(offset: u64, reason: impl Into<String>) -> JournalError {
    JournalError::BadObject {
        offset,
        reason: reason.into(),
    }
}

/// An entry array: a block of entry offsets plus a link to the next block.
pub struct EntryArrayObject<'a> {
    pub object: ObjectHeader,
    pub next_entry_array_offset: u64,
    items: ArrayItems<'a>,
}

enum ArrayItems<'a> {
    Regular(&'a [U64]),
    Compact(&'a [U32]),
}

impl<'a> EntryArrayObject<'a> {
    pub fn from_payload(
        object: ObjectHeader,
        offset: u64,
        payload: &'a [u8],
        compact: bool,
    ) -> Result<Self> {
        let next_entry_array_offset = codec::u64_le(payload, 0)?;
        let rest = &payload[8..];

        let items = if compact {
            let items = <[U32]>::ref_from_bytes(&rest[..rest.len() / 4 * 4])
                .map_err(|_| bad_object(offset, "unreadable compact entry array items"))?;
            ArrayItems::Compact(items)
        } else {
            let items = <[U64]>::ref_from_bytes(&rest[..rest.len() / 8 * 8])
                .map_err(|_| bad_object(offset, "unreadable entry array items"))?;
            ArrayItems::Regular(items)
        };

        Ok(Self {
            object,
            next_entry_array_offset,
            items,
        })
    }

    /// Number of item slots, counting trailing zero slots.
    pub fn len(&self) -> usize {
        match &self.items {
            ArrayItems::Regular(items) => items.len(),
            ArrayItems::Compact(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry offset in slot `index`, widening compact items.
    pub fn item(&self, index: usize) -> Option<u64> {
        match &self.items {
            ArrayItems::Regular(items) => items.get(index).map(|item| item.get()),
            ArrayItems::Compact(items) => items.get(index).map(|item| u64::from(item.get())),
        }
    }
}

/// An entry object: timestamps and identity plus references to its data.
pub struct EntryObject<'a> {
    pub object: ObjectHeader,
    pub header: EntryHeader,
    items: EntryItems<'a>,
}

enum EntryItems<'a> {
    Regular(&'a [EntryItem]),
    Compact(&'a [U32]),
}

impl<'a> EntryObject<'a> {
    pub fn from_payload(
        object: ObjectHeader,
        offset: u64,
        payload: &'a [u8],
        compact: bool,
    ) -> Result<Self> {
        let (header, rest) = EntryHeader::ref_from_prefix(payload)
            .map_err(|_| bad_object(offset, "entry payload shorter than its fixed prefix"))?;

        let items = if compact {
            let items = <[U32]>::ref_from_bytes(&rest[..rest.len() / 4 * 4])
                .map_err(|_| bad_object(offset, "unreadable compact entry items"))?;
            EntryItems::Compact(items)
        } else {
            let items = <[EntryItem]>::ref_from_bytes(&rest[..rest.len() / 16 * 16])
                .map_err(|_| bad_object(offset, "unreadable entry items"))?;
            EntryItems::Regular(items)
        };

        Ok(Self {
            object,
            header: *header,
            items,
        })
    }

    pub fn n_items(&self) -> usize {
        match &self.items {
            EntryItems::Regular(items) => items.len(),
            EntryItems::Compact(items) => items.len(),
        }
    }

    /// Data object offset of item `index`, widening compact items.
    pub fn item_offset(&self, index: usize) -> Option<u64> {
        match &self.items {
            EntryItems::Regular(items) => items.get(index).map(|item| item.object_offset.get()),
            EntryItems::Compact(items) => items.get(index).map(|item| u64::from(item.get())),
        }
    }

    /// Per-item hash; compact files do not store one.
    pub fn item_hash(&self, index: usize) -> Option<u64> {
        match &self.items {
            EntryItems::Regular(items) => items.get(index).map(|item| item.hash.get()),
            EntryItems::Compact(items) => items.get(index).map(|_| 0),
        }
    }

    /// Copy the entry out of the scratch buffer so it survives further reads.
    pub fn to_owned(&self) -> Entry {
        let items = (0..self.n_items())
            .map(|index| self.item_offset(index).unwrap_or(0))
            .collect();

        Entry {
            seqnum: self.header.seqnum.get(),
            realtime: self.header.realtime.get(),
            monotonic: self.header.monotonic.get(),
            boot_id: self.header.boot_id,
            xor_hash: self.header.xor_hash.get(),
            items,
        }
    }
}

/// An owned entry, detached from the reader's scratch buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub seqnum: u64,
    pub realtime: u64,
    pub monotonic: u64,
    pub boot_id: [u8; 16],
    pub xor_hash: u64,
    /// Offsets of the entry's data objects, in file order.
    pub items: Vec<u64>,
}

/// A data object: one `KEY=VALUE` pair, possibly compressed.
pub struct DataObject<'a> {
    pub object: ObjectHeader,
    pub header: DataHeader,
    /// Only present in compact files; zero otherwise.
    pub tail_entry_array_offset: u32,
    pub tail_entry_array_n_entries: u32,
    pub payload: &'a [u8],
}

impl<'a> DataObject<'a> {
    pub fn from_payload(
        object: ObjectHeader,
        offset: u64,
        payload: &'a [u8],
        compact: bool,
    ) -> Result<Self> {
        let (header, rest) = DataHeader::ref_from_prefix(payload)
            .map_err(|_| bad_object(offset, "data payload shorter than its fixed prefix"))?;

        let (tail_entry_array_offset, tail_entry_array_n_entries, payload) = if compact {
            let tail_offset = codec::u32_le(rest, 0)?;
            let tail_n_entries = codec::u32_le(rest, 4)?;
            (tail_offset, tail_n_entries, &rest[8..])
        } else {
            (0, 0, rest)
        };

        Ok(Self {
            object,
            header: *header,
            tail_entry_array_offset,
            tail_entry_array_n_entries,
            payload,
        })
    }
}

/// A field object: the name shared by a chain of data objects.
pub struct FieldObject<'a> {
    pub object: ObjectHeader,
    pub header: FieldHeader,
    /// The field name bytes.
    pub payload: &'a [u8],
}

impl<'a> FieldObject<'a> {
    pub fn from_payload(object: ObjectHeader, offset: u64, payload: &'a [u8]) -> Result<Self> {
        let (header, rest) = FieldHeader::ref_from_prefix(payload)
            .map_err(|_| bad_object(offset, "field payload shorter than its fixed prefix"))?;

        Ok(Self {
            object,
            header: *header,
            payload: rest,
        })
    }
}

/// A data or field hash table. Parsed for completeness; the streaming reader
/// never takes the keyed-lookup path through it.
pub struct HashTableObject<'a> {
    pub object: ObjectHeader,
    pub items: &'a [HashItem],
}

impl<'a> HashTableObject<'a> {
    pub fn from_payload(object: ObjectHeader, offset: u64, payload: &'a [u8]) -> Result<Self> {
        let items = <[HashItem]>::ref_from_bytes(&payload[..payload.len() / 16 * 16])
            .map_err(|_| bad_object(offset, "unreadable hash table buckets"))?;

        Ok(Self { object, items })
    }
}

/// A tag object. Parsed but never validated: seal verification is the
/// sealing tooling's job, not the reader's.
pub struct TagObject {
    pub object: ObjectHeader,
    pub header: TagHeader,
}

impl TagObject {
    pub fn from_payload(object: ObjectHeader, offset: u64, payload: &[u8]) -> Result<Self> {
        let (header, _) = TagHeader::ref_from_prefix(payload)
            .map_err(|_| bad_object(offset, "tag payload shorter than its fixed prefix"))?;

        Ok(Self {
            object,
            header: *header,
        })
    }
}
