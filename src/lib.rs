// Copyright (c) 2024-present, constant-db
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An immutable on-disk key-value store ("constant database").
//!
//! ##### About
//!
//! A constant database is built once and never modified: a [`Writer`]
//! streams a fixed set of key-value pairs into a single file and freezes
//! it, after which any number of independent [`Reader`]s can perform
//! point lookups concurrently without coordination.
//!
//! Lookups are O(1) amortized and touch the file through fixed-size
//! random-access reads only; no variable-length index structure is ever
//! parsed. The file carries a two-level hash table: a fixed 2048-byte
//! header of 256 bucket descriptors, followed by the records, followed by
//! one open-addressed slot table per non-empty bucket. Slot tables are
//! sized at twice their bucket's record count, so probe chains stay short.
//!
//! ```
//! # fn main() -> constant_db::Result<()> {
//! # let dir = tempfile::tempdir()?;
//! # let path = dir.path().join("example.cdb");
//! use constant_db::{Reader, Writer};
//!
//! Writer::build(&path, [("apple", "sauce"), ("banana", "bread")])?;
//!
//! let mut reader = Reader::open(&path)?;
//! assert_eq!(Some(b"sauce".to_vec()), reader.get(b"apple")?);
//! assert_eq!(None, reader.get(b"cherry")?);
//! # Ok(())
//! # }
//! ```
//!
//! Keys and values are arbitrary byte strings, each limited to 2^32 bytes.

#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]

pub(crate) type HashSet<K> = std::collections::HashSet<K, rustc_hash::FxBuildHasher>;

macro_rules! fail_iter {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return Some(Err(e.into())),
        }
    };
}

#[doc(hidden)]
pub mod coding;

mod error;

#[doc(hidden)]
pub mod file;

pub mod format;

mod hash;
mod reader;
mod writer;

pub use error::{Error, Result};
pub use hash::hash;
pub use reader::{Iter, Reader};
pub use writer::Writer;
