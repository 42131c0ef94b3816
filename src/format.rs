// Copyright (c) 2024-present, constant-db
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! On-disk layout of a constant database
//!
//! All multi-byte integers are unsigned 32-bit little-endian.
//!
//! | Region      | Offset      | Size     | Content                                    |
//! |-------------|-------------|----------|--------------------------------------------|
//! | Header      | `base`      | 2048     | 256 × (table pointer, table size)          |
//! | Records     | `base+2048` | variable | sequence of (key len, value len, key, value) |
//! | Slot tables | after records | variable | per bucket: table size × (hash, pointer) |
//!
//! A slot with pointer 0 is empty. The sentinel is unambiguous because
//! the header region always precedes the records, so no record can start
//! at offset 0.

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Number of first-level buckets, selected by `hash % 256`
pub const BUCKET_COUNT: usize = 256;

/// On-disk size of a header entry or a slot
pub const ENTRY_SIZE: u64 = 2 * std::mem::size_of::<u32>() as u64;

/// Size of the reserved header region
pub const HEADER_SIZE: u64 = BUCKET_COUNT as u64 * ENTRY_SIZE;

/// On-disk size of a record header (key length + value length)
pub const RECORD_HEADER_SIZE: u64 = 2 * std::mem::size_of::<u32>() as u64;

/// Describes where one bucket's slot table lives
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HeaderEntry {
    /// File offset of the bucket's slot table
    pub table_pointer: u32,

    /// Number of slots in the table (always twice the bucket's record
    /// count; 0 for an empty bucket)
    pub table_size: u32,
}

impl Encode for HeaderEntry {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u32::<LittleEndian>(self.table_pointer)?;
        writer.write_u32::<LittleEndian>(self.table_size)?;
        Ok(())
    }
}

impl Decode for HeaderEntry {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let table_pointer = reader.read_u32::<LittleEndian>()?;
        let table_size = reader.read_u32::<LittleEndian>()?;

        Ok(Self {
            table_pointer,
            table_size,
        })
    }
}

/// An open-addressed cell inside a bucket's slot table
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Slot {
    /// Full 32-bit hash of the record's key
    pub hash: u32,

    /// File offset of the record; 0 marks an empty slot
    pub pointer: u32,
}

impl Slot {
    /// The empty-slot sentinel
    pub const EMPTY: Self = Self {
        hash: 0,
        pointer: 0,
    };

    /// Whether this slot holds a record
    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.pointer != 0
    }
}

impl Encode for Slot {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u32::<LittleEndian>(self.hash)?;
        writer.write_u32::<LittleEndian>(self.pointer)?;
        Ok(())
    }
}

impl Decode for Slot {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let hash = reader.read_u32::<LittleEndian>()?;
        let pointer = reader.read_u32::<LittleEndian>()?;

        Ok(Self { hash, pointer })
    }
}

/// Length prefix of a stored record; the key and value bytes follow it
/// back to back
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RecordHeader {
    /// Length of the key in bytes
    pub key_len: u32,

    /// Length of the value in bytes
    pub value_len: u32,
}

impl RecordHeader {
    /// On-disk size of the full record, including key and value bytes
    #[must_use]
    pub fn record_len(&self) -> u64 {
        RECORD_HEADER_SIZE + u64::from(self.key_len) + u64::from(self.value_len)
    }
}

impl Encode for RecordHeader {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u32::<LittleEndian>(self.key_len)?;
        writer.write_u32::<LittleEndian>(self.value_len)?;
        Ok(())
    }
}

impl Decode for RecordHeader {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let key_len = reader.read_u32::<LittleEndian>()?;
        let value_len = reader.read_u32::<LittleEndian>()?;

        Ok(Self { key_len, value_len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn header_region_is_2048_bytes() {
        assert_eq!(2_048, HEADER_SIZE);
    }

    #[test]
    fn header_entry_roundtrip() -> crate::Result<()> {
        let entry = HeaderEntry {
            table_pointer: 0x1234_5678,
            table_size: 42,
        };

        let mut bytes = vec![];
        entry.encode_into(&mut bytes)?;

        // Little-endian on disk
        assert_eq!([0x78, 0x56, 0x34, 0x12, 42, 0, 0, 0], *bytes);

        assert_eq!(entry, HeaderEntry::decode_from(&mut &bytes[..])?);

        Ok(())
    }

    #[test]
    fn slot_roundtrip() -> crate::Result<()> {
        let slot = Slot {
            hash: 5_381,
            pointer: 2_048,
        };

        let mut bytes = vec![];
        slot.encode_into(&mut bytes)?;

        assert_eq!([0x05, 0x15, 0, 0, 0, 0x08, 0, 0], *bytes);

        assert_eq!(slot, Slot::decode_from(&mut &bytes[..])?);

        Ok(())
    }

    #[test]
    fn empty_slot_sentinel() {
        assert!(!Slot::EMPTY.is_occupied());
        assert!(Slot {
            hash: 0,
            pointer: 2_048
        }
        .is_occupied());
    }

    #[test]
    fn record_len() {
        let header = RecordHeader {
            key_len: 3,
            value_len: 5,
        };
        assert_eq!(16, header.record_len());
    }
}
