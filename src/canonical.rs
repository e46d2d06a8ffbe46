//! Canonical serialization for deterministic fingerprints.
//!
//! Detection output and configuration parameters are fingerprinted by
//! hashing their canonical JSON encoding with xxh64.
//!
//! ## Determinism Guarantees
//!
//! - Struct fields serialize in declaration order
//! - Sequences serialize in index order; shapes are sorted before hashing
//! - No `HashMap` in hashed data: use `BTreeMap` or sorted `Vec`
//! - Floats that feed parameter hashes are quantized first (see `config`)

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Seed for every fingerprint in this crate.
pub const FINGERPRINT_SEED: u64 = 0;

/// Serialize a value to canonical JSON bytes.
///
/// # Panics
///
/// Panics if `value` cannot be represented as JSON (a map with non-string
/// keys). Every type hashed by this crate serializes infallibly.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("canonical serialization failed")
}

/// xxh64 of the canonical encoding.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    xxh64(&to_canonical_bytes(value), FINGERPRINT_SEED)
}

/// [`canonical_hash`] as 16 lowercase hex digits.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}
