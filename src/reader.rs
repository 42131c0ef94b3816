// Copyright (c) 2024-present, constant-db
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::Decode,
    format::{HeaderEntry, RecordHeader, Slot, BUCKET_COUNT, ENTRY_SIZE, HEADER_SIZE},
    hash::hash,
};
use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::Path,
};

/// Performs point lookups against a finished constant database
///
/// A reader only ever issues fixed-size reads at computed offsets: one
/// header entry, then at most `table_size` slots, then (on a full hash
/// match) one record. It holds no state besides the byte source and the
/// base offset, so any number of independent readers can work on the
/// same file concurrently.
pub struct Reader<R: Read + Seek> {
    src: R,
    base: u64,
}

impl Reader<File> {
    /// Opens a database file, with the table rooted at offset 0.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an I/O error occurs.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        Ok(Self::new(File::open(path)?, 0))
    }
}

impl<R: Read + Seek> Reader<R> {
    /// Creates a reader over any random-access byte source.
    ///
    /// `base` is the offset of the table's header region; it is 0 for a
    /// standalone database file and nonzero when a table is embedded
    /// inside a larger file.
    pub fn new(src: R, base: u64) -> Self {
        Self { src, base }
    }

    fn header_entry(&mut self, h: u32) -> crate::Result<HeaderEntry> {
        let bucket = u64::from(h) % BUCKET_COUNT as u64;

        self.src
            .seek(SeekFrom::Start(self.base + bucket * ENTRY_SIZE))?;

        Ok(HeaderEntry::decode_from(&mut self.src)?)
    }

    /// Retrieves the value for a key, or `None` if the key is absent.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an I/O error occurs.
    pub fn get(&mut self, key: &[u8]) -> crate::Result<Option<Vec<u8>>> {
        let h = hash(key);

        let entry = self.header_entry(h)?;
        if entry.table_size == 0 {
            return Ok(None);
        }

        let ncells = u64::from(entry.table_size);

        // Same index arithmetic as Writer::write_slot_tables - insertion
        // and lookup must probe in lock-step
        let start = u64::from(h >> 8) % ncells;

        for i in 0..ncells {
            let idx = (start + i) % ncells;

            self.src.seek(SeekFrom::Start(
                u64::from(entry.table_pointer) + idx * ENTRY_SIZE,
            ))?;

            let slot = Slot::decode_from(&mut self.src)?;

            if !slot.is_occupied() {
                // The key would have been placed here during
                // construction, so an empty slot proves absence
                log::trace!("cdb: empty slot after {i} probes, key is absent");
                return Ok(None);
            }

            if slot.hash != h {
                continue;
            }

            self.src.seek(SeekFrom::Start(u64::from(slot.pointer)))?;
            let record = RecordHeader::decode_from(&mut self.src)?;

            if record.key_len as usize != key.len() {
                // Full 32-bit hash collision with a different key
                continue;
            }

            let mut candidate = vec![0; record.key_len as usize];
            self.src.read_exact(&mut candidate)?;

            if candidate == key {
                let mut value = vec![0; record.value_len as usize];
                self.src.read_exact(&mut value)?;
                return Ok(Some(value));
            }
        }

        // Only reachable if every slot of the bucket is occupied
        Ok(None)
    }

    /// Whether the database contains a key.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an I/O error occurs.
    pub fn contains_key(&mut self, key: &[u8]) -> crate::Result<bool> {
        self.get(key).map(|value| value.is_some())
    }

    /// Iterates over all records in insertion order.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an I/O error occurs.
    pub fn iter(&mut self) -> crate::Result<Iter<'_, R>> {
        // The record region runs from the end of the header to the first
        // slot table, whose offset bucket 0's header entry carries even
        // when that bucket is empty
        self.src.seek(SeekFrom::Start(self.base))?;
        let first = HeaderEntry::decode_from(&mut self.src)?;

        Ok(Iter {
            src: &mut self.src,
            pos: self.base + HEADER_SIZE,
            end: u64::from(first.table_pointer),
        })
    }
}

/// Iterator over all records of a database, in insertion order
///
/// Yields `(key, value)` pairs; I/O errors surface as `Err` items.
pub struct Iter<'a, R: Read + Seek> {
    src: &'a mut R,
    pos: u64,
    end: u64,
}

impl<R: Read + Seek> Iterator for Iter<'_, R> {
    type Item = crate::Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }

        fail_iter!(self.src.seek(SeekFrom::Start(self.pos)));
        let record = fail_iter!(RecordHeader::decode_from(self.src));

        let mut key = vec![0; record.key_len as usize];
        fail_iter!(self.src.read_exact(&mut key));

        let mut value = vec![0; record.value_len as usize];
        fail_iter!(self.src.read_exact(&mut value));

        self.pos += record.record_len();

        Some(Ok((key, value)))
    }
}
