//! Byte-level construction of journal files for tests.
//!
//! The builder writes real files through the same on-disk layout the reader
//! parses: header at offset 0, then an entry-array chain whose slots are
//! patched in as entries are appended. Appending after the initial build
//! works on a live file, which is what the tailing tests lean on.

#![allow(dead_code)]

use journal_stream::object::{
    DataHeader, EntryHeader, EntryItem, HashItem, JournalHeader, ObjectHeader, ObjectType,
    TagHeader, HEADER_READ_SIZE, SIGNATURE,
};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromZeros, IntoBytes};

pub const STATE_OFFLINE: u8 = 0;
pub const STATE_ONLINE: u8 = 1;
pub const STATE_ARCHIVED: u8 = 2;

const INCOMPATIBLE_COMPACT: u32 = 1 << 4;

pub const COMPRESSED_XZ: u8 = 1 << 0;
pub const COMPRESSED_LZ4: u8 = 1 << 1;
pub const COMPRESSED_ZSTD: u8 = 1 << 2;

/// seqnum id used by the cursor fixtures.
pub const SEQNUM_ID: [u8; 16] = [
    0x69, 0xe0, 0xbc, 0x24, 0x29, 0x20, 0x40, 0x56, 0x93, 0x44, 0xce, 0xa3, 0xad, 0x97, 0x20,
    0x4c,
];

/// boot id used by the cursor fixtures.
pub const BOOT_ID: [u8; 16] = [
    0x6b, 0x84, 0xae, 0x3e, 0xd1, 0x11, 0x4c, 0x0b, 0x90, 0x0c, 0x8c, 0x46, 0x4e, 0x64, 0xa0,
    0x15,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Xz,
    Lz4,
    Zstd,
}

#[derive(Debug, Clone)]
pub struct TestField {
    pub payload: Vec<u8>,
    pub compression: Compression,
}

#[derive(Debug, Clone)]
pub struct TestEntry {
    pub seqnum: u64,
    pub realtime: u64,
    pub monotonic: u64,
    pub boot_id: [u8; 16],
    pub xor_hash: u64,
    pub fields: Vec<TestField>,
}

impl TestEntry {
    pub fn new(seqnum: u64) -> Self {
        Self {
            seqnum,
            realtime: 0x1000_0000 + seqnum,
            monotonic: 0x2000 + seqnum,
            boot_id: BOOT_ID,
            xor_hash: 0xaa00 + seqnum,
            fields: Vec::new(),
        }
    }

    pub fn realtime(mut self, realtime: u64) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn monotonic(mut self, monotonic: u64) -> Self {
        self.monotonic = monotonic;
        self
    }

    pub fn xor_hash(mut self, xor_hash: u64) -> Self {
        self.xor_hash = xor_hash;
        self
    }

    pub fn field(mut self, payload: &str) -> Self {
        self.fields.push(TestField {
            payload: payload.as_bytes().to_vec(),
            compression: Compression::None,
        });
        self
    }

    pub fn field_compressed(mut self, payload: &[u8], compression: Compression) -> Self {
        self.fields.push(TestField {
            payload: payload.to_vec(),
            compression,
        });
        self
    }
}

pub struct JournalBuilder {
    compact: bool,
    state: u8,
    file_id: [u8; 16],
    seqnum_id: [u8; 16],
    array_capacity: usize,
    entries: Vec<TestEntry>,
}

impl JournalBuilder {
    pub fn new() -> Self {
        Self {
            compact: false,
            state: STATE_ARCHIVED,
            file_id: uuid::Uuid::new_v4().into_bytes(),
            seqnum_id: SEQNUM_ID,
            array_capacity: 4,
            entries: Vec::new(),
        }
    }

    pub fn compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    pub fn state(mut self, state: u8) -> Self {
        self.state = state;
        self
    }

    pub fn file_id(mut self, file_id: [u8; 16]) -> Self {
        self.file_id = file_id;
        self
    }

    pub fn seqnum_id(mut self, seqnum_id: [u8; 16]) -> Self {
        self.seqnum_id = seqnum_id;
        self
    }

    /// Item slots per entry array; appends spill into a chained array once
    /// the current one fills up.
    pub fn array_capacity(mut self, slots: usize) -> Self {
        self.array_capacity = slots;
        self
    }

    pub fn entry(mut self, entry: TestEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn write_to(self, path: impl Into<PathBuf>) -> TestJournal {
        let path = path.into();

        // Placeholder header; the real one lands after the objects exist.
        std::fs::write(&path, vec![0u8; HEADER_READ_SIZE]).unwrap();

        let mut journal = TestJournal {
            path,
            compact: self.compact,
            seqnum_id: self.seqnum_id,
            array_capacity: self.array_capacity,
            arrays: Vec::new(),
            entry_offsets: Vec::new(),
        };

        let first_array = journal.append_array_object();
        journal.arrays.push(ArrayState {
            offset: first_array,
            used: 0,
        });

        for entry in &self.entries {
            journal.append_entry(entry);
        }

        journal.write_header(&self);
        journal
    }
}

struct ArrayState {
    offset: u64,
    used: usize,
}

pub struct TestJournal {
    pub path: PathBuf,
    compact: bool,
    seqnum_id: [u8; 16],
    array_capacity: usize,
    arrays: Vec<ArrayState>,
    pub entry_offsets: Vec<u64>,
}

impl TestJournal {
    fn item_width(&self) -> usize {
        if self.compact {
            4
        } else {
            8
        }
    }

    fn open_rw(&self) -> File {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .unwrap()
    }

    fn aligned_end(file: &mut File) -> u64 {
        let len = file.metadata().unwrap().len();
        len.div_ceil(8) * 8
    }

    /// Write an object (header + payload) at the 8-aligned end of the file.
    pub fn append_object(&self, type_: ObjectType, flags: u8, payload: &[u8]) -> u64 {
        let mut file = self.open_rw();
        let offset = Self::aligned_end(&mut file);

        let object = ObjectHeader {
            type_: type_ as u8,
            flags,
            reserved: [0; 6],
            size: U64::new(16 + payload.len() as u64),
        };

        file.seek(SeekFrom::Start(offset)).unwrap();
        file.write_all(object.as_bytes()).unwrap();
        file.write_all(payload).unwrap();
        offset
    }

    fn append_array_object(&self) -> u64 {
        let mut payload = vec![0u8; 8 + self.array_capacity * self.item_width()];
        payload[..8].copy_from_slice(&0u64.to_le_bytes());
        self.append_object(ObjectType::EntryArray, 0, &payload)
    }

    fn encode_field(&self, field: &TestField) -> (u8, Vec<u8>) {
        match field.compression {
            Compression::None => (0, field.payload.clone()),
            Compression::Zstd => (
                COMPRESSED_ZSTD,
                zstd::encode_all(field.payload.as_slice(), 0).unwrap(),
            ),
            Compression::Lz4 => {
                let mut encoded = (field.payload.len() as u64).to_le_bytes().to_vec();
                encoded.extend_from_slice(&lz4_flex::block::compress(&field.payload));
                (COMPRESSED_LZ4, encoded)
            }
            Compression::Xz => {
                let mut encoded = Vec::new();
                xz2::read::XzEncoder::new(field.payload.as_slice(), 6)
                    .read_to_end(&mut encoded)
                    .unwrap();
                (COMPRESSED_XZ, encoded)
            }
        }
    }

    /// Append one entry with its data objects and publish it in the array
    /// chain, exactly as a live writer would.
    pub fn append_entry(&mut self, entry: &TestEntry) -> u64 {
        // Data objects first.
        let mut data_offsets = Vec::new();
        for field in &entry.fields {
            let (flags, encoded) = self.encode_field(field);

            let mut header = DataHeader::new_zeroed();
            header.hash = U64::new(0x1111_2222_3333_4444);
            header.n_entries = U64::new(1);

            let mut payload = header.as_bytes().to_vec();
            if self.compact {
                payload.extend_from_slice(&0u32.to_le_bytes());
                payload.extend_from_slice(&0u32.to_le_bytes());
            }
            payload.extend_from_slice(&encoded);

            data_offsets.push(self.append_object(ObjectType::Data, flags, &payload));
        }

        // Then the entry itself.
        let header = EntryHeader {
            seqnum: U64::new(entry.seqnum),
            realtime: U64::new(entry.realtime),
            monotonic: U64::new(entry.monotonic),
            boot_id: entry.boot_id,
            xor_hash: U64::new(entry.xor_hash),
        };

        let mut payload = header.as_bytes().to_vec();
        for &offset in &data_offsets {
            if self.compact {
                payload.extend_from_slice(&u32::try_from(offset).unwrap().to_le_bytes());
            } else {
                let item = EntryItem {
                    object_offset: U64::new(offset),
                    hash: U64::new(0),
                };
                payload.extend_from_slice(item.as_bytes());
            }
        }
        let entry_offset = self.append_object(ObjectType::Entry, 0, &payload);

        // Publish: chain a fresh array if the current one is full, then
        // patch the next free slot.
        if self.arrays.last().unwrap().used == self.array_capacity {
            let new_offset = self.append_array_object();
            let previous = self.arrays.last().unwrap().offset;
            self.patch_u64(previous + 16, new_offset);
            self.arrays.push(ArrayState {
                offset: new_offset,
                used: 0,
            });
        }

        let item_width = self.item_width();
        let array = self.arrays.last_mut().unwrap();
        let slot_offset = array.offset + 16 + 8 + (array.used * item_width) as u64;
        array.used += 1;

        let mut file = self.open_rw();
        file.seek(SeekFrom::Start(slot_offset)).unwrap();
        if self.compact {
            file.write_all(&u32::try_from(entry_offset).unwrap().to_le_bytes())
                .unwrap();
        } else {
            file.write_all(&entry_offset.to_le_bytes()).unwrap();
        }

        self.entry_offsets.push(entry_offset);
        entry_offset
    }

    fn write_header(&self, builder: &JournalBuilder) {
        let mut header = JournalHeader::new_zeroed();
        header.signature = SIGNATURE;
        header.incompatible_flags = U32::new(if self.compact {
            INCOMPATIBLE_COMPACT
        } else {
            0
        });
        header.state = builder.state;
        header.file_id = builder.file_id;
        header.machine_id = [0x11; 16];
        header.tail_entry_boot_id = BOOT_ID;
        header.seqnum_id = self.seqnum_id;
        header.header_size = U64::new(std::mem::size_of::<JournalHeader>() as u64);
        header.entry_array_offset = U64::new(HEADER_READ_SIZE as u64);
        header.n_entries = U64::new(builder.entries.len() as u64);
        header.n_objects = U64::new((builder.entries.len() + self.arrays.len()) as u64);
        if let (Some(first), Some(last)) = (builder.entries.first(), builder.entries.last()) {
            header.head_entry_seqnum = U64::new(first.seqnum);
            header.tail_entry_seqnum = U64::new(last.seqnum);
            header.head_entry_realtime = U64::new(first.realtime);
            header.tail_entry_realtime = U64::new(last.realtime);
            header.tail_entry_monotonic = U64::new(last.monotonic);
        }

        let mut file = self.open_rw();
        let arena_end = file.metadata().unwrap().len();
        header.arena_size = U64::new(arena_end - header.header_size.get());

        file.seek(SeekFrom::Start(0)).unwrap();
        file.write_all(header.as_bytes()).unwrap();
    }

    pub fn set_state(&self, state: u8) {
        self.patch(16, &[state]);
    }

    /// Overwrite raw bytes at `offset`.
    pub fn patch(&self, offset: u64, bytes: &[u8]) {
        let mut file = self.open_rw();
        file.seek(SeekFrom::Start(offset)).unwrap();
        file.write_all(bytes).unwrap();
    }

    pub fn patch_u64(&self, offset: u64, value: u64) {
        self.patch(offset, &value.to_le_bytes());
    }

    /// Overwrite slot `slot` of array `array_index` with an arbitrary value.
    pub fn patch_array_slot(&self, array_index: usize, slot: usize, value: u64) {
        let array = &self.arrays[array_index];
        let slot_offset = array.offset + 16 + 8 + (slot * self.item_width()) as u64;
        if self.compact {
            self.patch(slot_offset, &u32::try_from(value).unwrap().to_le_bytes());
        } else {
            self.patch_u64(slot_offset, value);
        }
    }

    pub fn array_offset(&self, array_index: usize) -> u64 {
        self.arrays[array_index].offset
    }

    /// Append a plausible field object; returns its offset.
    pub fn append_field_object(&self, name: &[u8]) -> u64 {
        let mut header = journal_stream::object::FieldHeader::new_zeroed();
        header.hash = U64::new(0xfee1);
        let mut payload = header.as_bytes().to_vec();
        payload.extend_from_slice(name);
        self.append_object(ObjectType::Field, 0, &payload)
    }

    /// Append a hash table with `buckets` empty buckets; returns its offset.
    pub fn append_hash_table_object(&self, buckets: usize) -> u64 {
        let payload = vec![HashItem::new_zeroed(); buckets]
            .as_bytes()
            .to_vec();
        self.append_object(ObjectType::DataHashTable, 0, &payload)
    }

    /// Append a tag object; returns its offset.
    pub fn append_tag_object(&self, seqnum: u64, epoch: u64) -> u64 {
        let header = TagHeader {
            seqnum: U64::new(seqnum),
            epoch: U64::new(epoch),
            tag: [0xcd; 32],
        };
        self.append_object(ObjectType::Tag, 0, header.as_bytes())
    }
}
