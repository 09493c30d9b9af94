//! Status codes and operation results for adaptive hash index operations
//!
//! Hash index lookups never fail visibly: a guess that cannot be used is a
//! miss, not an error. The codes below are returned by maintenance
//! operations and by the host shims so callers can tell a benign skip
//! (`Disabled`, `Aborted`) from a real problem.

use std::fmt;

/// Status code returned by index operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Status {
    /// Operation completed successfully
    #[default]
    Ok = 0,
    /// Key or page was not found
    NotFound = 1,
    /// The adaptive hash index is disabled
    Disabled = 2,
    /// Out of memory (node heap or buffer pool exhausted)
    OutOfMemory = 3,
    /// Operation gave up because of a concurrent conflicting change
    Aborted = 4,
    /// Resource is still referenced, retry later
    Busy = 5,
    /// Invalid argument provided
    InvalidArgument = 6,
    /// Invalid operation in current state
    InvalidOperation = 7,
    /// Data corruption detected
    Corruption = 8,
    /// A record with the same key already exists
    DuplicateKey = 9,
}

impl Status {
    /// Check if the status indicates success
    #[inline]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    /// Check if the key was not found
    #[inline]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Status::NotFound)
    }

    /// Check if the operation may succeed when retried
    #[inline]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Status::Aborted | Status::Busy)
    }

    /// Check if the status indicates an error
    #[inline]
    pub const fn is_error(&self) -> bool {
        matches!(
            self,
            Status::OutOfMemory
                | Status::InvalidArgument
                | Status::InvalidOperation
                | Status::Corruption
                | Status::DuplicateKey
        )
    }

    /// Convert into a `Result`, mapping `Ok` to `Ok(())`
    #[inline]
    pub fn into_result(self) -> Result<(), Status> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Get the status as a string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "Ok",
            Status::NotFound => "NotFound",
            Status::Disabled => "Disabled",
            Status::OutOfMemory => "OutOfMemory",
            Status::Aborted => "Aborted",
            Status::Busy => "Busy",
            Status::InvalidArgument => "InvalidArgument",
            Status::InvalidOperation => "InvalidOperation",
            Status::Corruption => "Corruption",
            Status::DuplicateKey => "DuplicateKey",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::error::Error for Status {}
