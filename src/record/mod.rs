//! Physical records, search tuples and record references.
//!
//! A record is an ordered list of fields; each field is either SQL NULL or a
//! byte string compared in unsigned lexicographic order. Integer helpers
//! encode big-endian so byte order matches numeric order.

mod compare;

pub use compare::{compare_fields, compare_with_match, MatchDepth};

use crate::buf::BlockId;

/// Slot number of a record inside its page heap
pub type HeapNo = u16;

/// Heap number of the page infimum (smaller than every user record)
pub const INFIMUM: HeapNo = 0;

/// Heap number of the page supremum (greater than every user record)
pub const SUPREMUM: HeapNo = 1;

/// First heap number handed out to user records
pub const FIRST_USER_HEAP_NO: HeapNo = 2;

/// A single record field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Field(Option<Vec<u8>>);

impl Field {
    /// Create a non-NULL field from bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Some(bytes.into()))
    }

    /// Create an SQL NULL field
    pub const fn null() -> Self {
        Self(None)
    }

    /// Field bytes, `None` for NULL
    #[inline]
    pub fn data(&self) -> Option<&[u8]> {
        self.0.as_deref()
    }

    /// Whether the field is SQL NULL
    #[inline]
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// Length in bytes (0 for NULL)
    #[inline]
    pub fn len(&self) -> usize {
        self.0.as_ref().map_or(0, Vec::len)
    }

    /// Whether the field carries no bytes
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&[u8]> for Field {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl From<Vec<u8>> for Field {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&str> for Field {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl From<u64> for Field {
    fn from(v: u64) -> Self {
        Self::new(v.to_be_bytes())
    }
}

fn fields_from_u64s(values: &[u64]) -> Vec<Field> {
    values.iter().copied().map(Field::from).collect()
}

/// A physical record stored on a leaf page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Record {
    fields: Vec<Field>,
}

impl Record {
    /// Create a record from its fields
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Create a record of big-endian integer fields
    pub fn from_u64s(values: &[u64]) -> Self {
        Self::new(fields_from_u64s(values))
    }

    /// All fields
    #[inline]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of fields
    #[inline]
    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    /// Field `i`, if present
    #[inline]
    pub fn field(&self, i: usize) -> Option<&Field> {
        self.fields.get(i)
    }

    /// Search tuple made of the first `n` fields
    pub fn to_tuple(&self, n: usize) -> Tuple {
        Tuple::new(self.fields.iter().take(n).cloned().collect())
    }
}

/// A search key: an ordered list of fields compared against records
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Tuple {
    fields: Vec<Field>,
}

impl Tuple {
    /// Create a tuple from its fields
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Create a tuple of big-endian integer fields
    pub fn from_u64s(values: &[u64]) -> Self {
        Self::new(fields_from_u64s(values))
    }

    /// All fields
    #[inline]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of fields
    #[inline]
    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }
}

impl From<&Record> for Tuple {
    fn from(rec: &Record) -> Self {
        Self::new(rec.fields.clone())
    }
}

/// Location of a record: buffer block plus heap slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordRef {
    /// Block holding the page
    pub block: BlockId,
    /// Heap slot on that page
    pub heap_no: HeapNo,
}

impl RecordRef {
    /// Create a record reference
    #[inline]
    pub const fn new(block: BlockId, heap_no: HeapNo) -> Self {
        Self { block, heap_no }
    }
}
