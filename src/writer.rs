// Copyright (c) 2024-present, constant-db
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::Encode,
    file::fsync_directory,
    format::{HeaderEntry, Slot, BUCKET_COUNT, ENTRY_SIZE, HEADER_SIZE, RECORD_HEADER_SIZE},
    hash::hash,
    HashSet,
};
use std::{
    fs::File,
    io::{BufWriter, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

/// Streams key-value pairs into a constant database file
///
/// The 2048-byte header region is reserved up front and backpatched by
/// [`Writer::finish`], after all records and slot tables have been
/// written. Until `finish` returns, the file on disk is not a valid
/// database.
///
/// Records are laid out in insertion order, so the output bytes are a
/// deterministic function of the sequence of [`Writer::add`] calls.
pub struct Writer {
    /// Database file
    path: PathBuf,

    writer: BufWriter<File>,

    /// Offset the next record will be written at
    pos: u64,

    /// Per-bucket (hash, record offset) pairs, in insertion order
    buckets: Vec<Vec<Slot>>,

    /// Keys added so far, for duplicate rejection
    seen_keys: HashSet<Vec<u8>>,

    item_count: usize,
}

impl Writer {
    /// Creates a new writer, truncating any existing file at `path`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an I/O error occurs.
    pub fn new<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let file = File::create(path)?;
        let mut writer = BufWriter::with_capacity(u16::MAX.into(), file);

        // Reserve the header region; real entries are written in finish()
        writer.write_all(&[0; HEADER_SIZE as usize])?;

        Ok(Self {
            path: std::path::absolute(path)?,
            writer,
            pos: HEADER_SIZE,
            buckets: vec![Vec::new(); BUCKET_COUNT],
            seen_keys: HashSet::default(),
            item_count: 0,
        })
    }

    /// Appends one key-value pair.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an I/O error occurs, or
    /// [`Error::DuplicateKey`](crate::Error::DuplicateKey) if `key` was
    /// already added.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> crate::Result<()> {
        if !self.seen_keys.insert(key.to_vec()) {
            return Err(crate::Error::DuplicateKey);
        }

        let h = hash(key);

        // NOTE: Keys and values are limited to 2^32 bytes by the format,
        // and the record region to 2^32 bytes of file
        #[allow(clippy::cast_possible_truncation)]
        {
            crate::format::RecordHeader {
                key_len: key.len() as u32,
                value_len: value.len() as u32,
            }
            .encode_into(&mut self.writer)?;
        }

        self.writer.write_all(key)?;
        self.writer.write_all(value)?;

        // The low 8 bits pick the bucket; the full hash is kept in the
        // slot so lookups can reject most collisions without reading the
        // record
        // NOTE: h % 256 < 256
        #[allow(clippy::expect_used)]
        let bucket = self
            .buckets
            .get_mut((h as usize) % BUCKET_COUNT)
            .expect("bucket index is in range");

        #[allow(clippy::cast_possible_truncation)]
        bucket.push(Slot {
            hash: h,
            pointer: self.pos as u32,
        });

        self.pos += RECORD_HEADER_SIZE + key.len() as u64 + value.len() as u64;
        self.item_count += 1;

        Ok(())
    }

    /// Builds each bucket's open-addressed slot table and appends it to
    /// the file, returning the 256 header entries describing them.
    fn write_slot_tables(&mut self) -> crate::Result<Vec<HeaderEntry>> {
        let mut pos = self.pos;
        let mut header = Vec::with_capacity(BUCKET_COUNT);

        for entries in &self.buckets {
            let ncells = entries.len() * 2;

            #[allow(clippy::cast_possible_truncation)]
            header.push(HeaderEntry {
                table_pointer: pos as u32,
                table_size: ncells as u32,
            });

            if entries.is_empty() {
                continue;
            }

            let mut table = vec![Slot::EMPTY; ncells];

            for slot in entries {
                // Same index arithmetic as Reader::get - insertion and
                // lookup must probe in lock-step
                let mut i = ((slot.hash >> 8) as usize) % ncells;

                // Linear probing, step 1, wraparound; a free cell always
                // exists because the table is half empty
                while table[i].is_occupied() {
                    i = (i + 1) % ncells;
                }

                table[i] = *slot;
            }

            for slot in &table {
                slot.encode_into(&mut self.writer)?;
            }

            pos += ncells as u64 * ENTRY_SIZE;
        }

        Ok(header)
    }

    /// Finishes the database file.
    ///
    /// Writes the slot tables, backpatches the header region and fsyncs
    /// the file and its parent directory. The file is immutable from
    /// here on.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an I/O error occurs.
    pub fn finish(mut self) -> crate::Result<()> {
        let header = self.write_slot_tables()?;

        self.writer.seek(SeekFrom::Start(0))?;

        for entry in &header {
            entry.encode_into(&mut self.writer)?;
        }

        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        if let Some(folder) = self.path.parent() {
            fsync_directory(folder)?;
        }

        log::debug!(
            "Finished database {:?} with {} records across {} buckets",
            self.path,
            self.item_count,
            self.buckets.iter().filter(|b| !b.is_empty()).count(),
        );

        Ok(())
    }

    /// Builds a complete database file from a sequence of key-value
    /// pairs.
    ///
    /// Convenience for [`Writer::new`] + [`Writer::add`] per pair +
    /// [`Writer::finish`]. The pairs are stored in iteration order.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an I/O error occurs or a key occurs twice.
    pub fn build<P: AsRef<Path>, K: AsRef<[u8]>, V: AsRef<[u8]>, I: IntoIterator<Item = (K, V)>>(
        path: P,
        items: I,
    ) -> crate::Result<()> {
        let mut writer = Self::new(path)?;

        for (key, value) in items {
            writer.add(key.as_ref(), value.as_ref())?;
        }

        writer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::Decode;
    use std::io::Read;
    use test_log::test;

    fn parse_header(bytes: &[u8]) -> crate::Result<Vec<HeaderEntry>> {
        let mut reader = &bytes[..HEADER_SIZE as usize];
        (0..BUCKET_COUNT)
            .map(|_| Ok(HeaderEntry::decode_from(&mut reader)?))
            .collect()
    }

    #[test]
    fn writer_empty_database() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("empty.cdb");

        Writer::new(&path)?.finish()?;

        let bytes = std::fs::read(&path)?;
        assert_eq!(HEADER_SIZE as usize, bytes.len());

        for entry in parse_header(&bytes)? {
            assert_eq!(0, entry.table_size);
        }

        Ok(())
    }

    #[test]
    fn writer_rejects_duplicate_key() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut writer = Writer::new(dir.path().join("dup.cdb"))?;

        writer.add(b"twice", b"1")?;

        assert!(matches!(
            writer.add(b"twice", b"2"),
            Err(crate::Error::DuplicateKey)
        ));

        Ok(())
    }

    #[test]
    fn writer_bucket_capacity_invariant() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("capacity.cdb");

        let keys = (0..100).map(|n| format!("key-{n}")).collect::<Vec<_>>();

        {
            let mut writer = Writer::new(&path)?;
            for key in &keys {
                writer.add(key.as_bytes(), b"value")?;
            }
            writer.finish()?;
        }

        let bytes = std::fs::read(&path)?;
        let header = parse_header(&bytes)?;

        for (bucket, entry) in header.iter().enumerate() {
            let count = keys
                .iter()
                .filter(|k| (hash(k.as_bytes()) as usize) % BUCKET_COUNT == bucket)
                .count();

            assert_eq!(2 * count as u32, entry.table_size);
        }

        Ok(())
    }

    #[test]
    fn writer_sentinel_invariant() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sentinel.cdb");

        {
            let mut writer = Writer::new(&path)?;
            for n in 0..50 {
                writer.add(format!("key-{n}").as_bytes(), b"value")?;
            }
            writer.finish()?;
        }

        let bytes = std::fs::read(&path)?;

        // Every occupied slot must point at or past the end of the
        // header region, so pointer 0 stays unambiguous
        for entry in parse_header(&bytes)? {
            let table = &bytes[entry.table_pointer as usize..];
            let mut table = table.take(u64::from(entry.table_size) * ENTRY_SIZE);

            for _ in 0..entry.table_size {
                let slot = Slot::decode_from(&mut table)?;

                if slot.is_occupied() {
                    assert!(u64::from(slot.pointer) >= HEADER_SIZE);
                }
            }
        }

        Ok(())
    }

    #[test]
    fn writer_file_size_accounting() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("size.cdb");

        // 3 records, 10 bytes of key+value each
        Writer::build(&path, [("aa", "11111111"), ("bb", "22222222"), ("cc", "33333333")])?;

        let expected_records = 3 * (RECORD_HEADER_SIZE + 10);
        let expected_tables = 3 * 2 * ENTRY_SIZE;

        assert_eq!(
            HEADER_SIZE + expected_records + expected_tables,
            std::fs::read(&path)?.len() as u64
        );

        Ok(())
    }
}
