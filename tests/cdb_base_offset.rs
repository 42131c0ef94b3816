use constant_db::{hash, Reader};
use std::io::Cursor;
use test_log::test;

const BASE: u32 = 4_096;

/// Builds, byte by byte, a one-record database embedded at a nonzero
/// offset inside a larger buffer: key "k", value "v".
///
/// Pointers in the format are absolute file offsets, so embedding is
/// just a matter of rooting the header region at `BASE` and reading
/// with the same base.
fn embedded_single_record() -> Vec<u8> {
    let h = hash(b"k");
    assert_eq!(177_614, h);

    let bucket = h % 256; // 206
    let record_pos = BASE + 2_048;
    let tables_pos = record_pos + 4 + 4 + 1 + 1;

    let mut buf = vec![0xAB; BASE as usize];

    // Header: every bucket before ours points at the table region with
    // size 0; ours has 2 cells; every bucket after it points past them
    for b in 0u32..256 {
        let (pointer, size): (u32, u32) = match b.cmp(&bucket) {
            std::cmp::Ordering::Less => (tables_pos, 0),
            std::cmp::Ordering::Equal => (tables_pos, 2),
            std::cmp::Ordering::Greater => (tables_pos + 2 * 8, 0),
        };
        buf.extend_from_slice(&pointer.to_le_bytes());
        buf.extend_from_slice(&size.to_le_bytes());
    }

    // The record
    buf.extend_from_slice(&1u32.to_le_bytes());
    buf.extend_from_slice(&1u32.to_le_bytes());
    buf.extend_from_slice(b"k");
    buf.extend_from_slice(b"v");

    // Slot table: (h >> 8) % 2 == 1, so the record sits in cell 1
    buf.extend_from_slice(&[0; 8]);
    buf.extend_from_slice(&h.to_le_bytes());
    buf.extend_from_slice(&record_pos.to_le_bytes());

    buf
}

#[test]
fn cdb_base_offset_lookup() -> constant_db::Result<()> {
    let mut reader = Reader::new(Cursor::new(embedded_single_record()), BASE.into());

    assert_eq!(Some(b"v".to_vec()), reader.get(b"k")?);
    assert_eq!(None, reader.get(b"z")?);
    assert_eq!(None, reader.get(b"")?);

    Ok(())
}

#[test]
fn cdb_base_offset_iteration() -> constant_db::Result<()> {
    let mut reader = Reader::new(Cursor::new(embedded_single_record()), BASE.into());

    assert_eq!(
        vec![(b"k".to_vec(), b"v".to_vec())],
        reader.iter()?.collect::<constant_db::Result<Vec<_>>>()?,
    );

    Ok(())
}
