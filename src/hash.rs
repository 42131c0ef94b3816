// Copyright (c) 2024-present, constant-db
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Hashes a key with the function the file format is defined around
/// (djb2, XOR variant: `h = (h * 33) ^ byte`, seeded with 5381).
///
/// The low 8 bits of the result select one of the 256 first-level
/// buckets; the remaining bits drive slot placement inside the bucket's
/// table. Wrapping 32-bit arithmetic is part of the format: the hash is
/// truncated after every byte, not only at the end.
#[must_use]
pub fn hash(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(5381_u32, |h, &c| (h.wrapping_shl(5).wrapping_add(h)) ^ u32::from(c))
}
