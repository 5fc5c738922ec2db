//! Content addressing for immutable payloads.
//!
//! Immutable payloads (big integers, long strings, tuples) are keyed in
//! their tables by a 64-bit hash of the payload bytes, salted with the
//! record's type code so that equal bytes of different kinds do not collide
//! with each other. The hash is persisted, so the algorithm is part of the
//! on-disk format: xxh3-64, locked in at format v1. Collisions between
//! distinct payloads of one kind are accepted and not checked for.

use xxhash_rust::xxh3::xxh3_64_with_seed;

pub fn content_hash(payload: &[u8], type_code: u8) -> u64 {
    xxh3_64_with_seed(payload, type_code as u64)
}
