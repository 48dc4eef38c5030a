//! Content hashing and canonical encoding (§4.B).
//!
//! `canonical()` gives every structured value a single byte representation
//! regardless of field insertion order, so two equal values always hash the
//! same way and the audit chain is reproducible across processes.

use serde::Serialize;
use sha2::{Digest, Sha256};

pub const HASH_LEN: usize = 32;
pub type Hash = [u8; HASH_LEN];

/// SHA-256 digest of arbitrary bytes.
pub fn hash(bytes: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Deterministic byte encoding of a serializable value: object keys are
/// sorted lexicographically and numbers/strings use serde_json's stable
/// rules, so the same logical value always produces the same bytes.
pub fn canonical<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    let sorted = sort_keys(value);
    serde_json::to_vec(&sorted)
}

fn sort_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            for key in keys {
                let v = map[&key].clone();
                sorted.insert(key, sort_keys(v));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_keys).collect())
        }
        other => other,
    }
}

/// `chain(prevHash, event) = hash(prevHash || canonical(event))` (§4.B).
pub fn chain<T: Serialize>(prev_hash: &Hash, event: &T) -> Result<Hash, serde_json::Error> {
    let mut bytes = Vec::with_capacity(HASH_LEN + 256);
    bytes.extend_from_slice(prev_hash);
    bytes.extend_from_slice(&canonical(event)?);
    Ok(hash(&bytes))
}

/// The fixed predecessor hash of every audit log's first entry.
pub fn genesis_hash() -> Hash {
    hash(b"GENESIS")
}

pub fn to_hex(h: &Hash) -> String {
    h.iter().map(|b| format!("{:02x}", b)).collect()
}
