//! Fold computation.
//!
//! A fold is a deterministic 64-bit hash of the first `n_fields` whole
//! fields of a record (or tuple) plus the first `n_bytes` bytes of the next
//! field, seeded with the owning index id. Two records of the same index
//! that agree on that prefix always have the same fold. The hash must be
//! stable across runs, so `DefaultHasher` is not used.

#[cfg(not(any(feature = "hash-xxh3", feature = "hash-xxh64")))]
compile_error!("Enable a hash feature: `hash-xxh3` (default) or `hash-xxh64`.");

use crate::dict::IndexId;
use crate::record::{Field, Record, Tuple};
use crate::utility::{fold_pair, murmur3_finalize};

/// Hash of a record prefix under an index
pub type Fold = u64;

/// Value mixed in for SQL NULL fields
const NULL_FIELD_HASH: u64 = 0x6e75_6c6c_6669_656c;

/// Hash field bytes into a 64-bit value (deterministic).
#[inline]
pub fn hash64(bytes: &[u8]) -> u64 {
    #[cfg(feature = "hash-xxh3")]
    {
        xxhash_rust::xxh3::xxh3_64(bytes)
    }

    #[cfg(all(not(feature = "hash-xxh3"), feature = "hash-xxh64"))]
    {
        xxhash_rust::xxh64::xxh64(bytes, 0)
    }
}

/// Seed fold of an index id
#[inline]
pub fn fold_index_id(index_id: IndexId) -> Fold {
    murmur3_finalize(index_id.get())
}

#[inline]
fn field_hash(field: &Field, limit: Option<usize>) -> u64 {
    match field.data() {
        Some(data) => {
            let len = limit.map_or(data.len(), |n| n.min(data.len()));
            hash64(&data[..len])
        }
        None => NULL_FIELD_HASH,
    }
}

/// Fold the first `n_fields` fields plus `n_bytes` bytes of the next one.
///
/// Fields beyond the end of `fields` are not mixed in; callers check that
/// the prefix is fully present when that matters.
pub fn fold_fields(fields: &[Field], n_fields: usize, n_bytes: usize, index_id: IndexId) -> Fold {
    let mut fold = fold_index_id(index_id);
    for field in fields.iter().take(n_fields) {
        fold = fold_pair(fold, field_hash(field, None));
    }
    if n_bytes > 0 {
        if let Some(field) = fields.get(n_fields) {
            fold = fold_pair(fold, field_hash(field, Some(n_bytes)));
        }
    }
    fold
}

/// Fold of a physical record
#[inline]
pub fn fold_record(rec: &Record, n_fields: usize, n_bytes: usize, index_id: IndexId) -> Fold {
    fold_fields(rec.fields(), n_fields, n_bytes, index_id)
}

/// Fold of a search tuple
#[inline]
pub fn fold_tuple(tuple: &Tuple, n_fields: usize, n_bytes: usize, index_id: IndexId) -> Fold {
    fold_fields(tuple.fields(), n_fields, n_bytes, index_id)
}
