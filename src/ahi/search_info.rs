//! Per-index search statistics and the hash prefix recommendation.
//!
//! All fields are plain relaxed atomics. They are advisory: a lost or torn
//! update only delays or hastens a page build, it never makes a guess
//! return a wrong record, because every guess is verified.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicUsize, Ordering};

use crate::buf::BlockId;
use crate::constants::{HASH_ANALYSIS, POTENTIAL_CAP};

/// Which key prefix is hashed, and which record of an equal-fold run is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashPrefix {
    /// Whole leading fields hashed
    pub n_fields: usize,
    /// Bytes hashed from the field after them
    pub n_bytes: usize,
    /// Keep the left-most record of a run of equal folds (else right-most)
    pub left_side: bool,
}

impl HashPrefix {
    /// Initial recommendation: first field, left side
    pub const DEFAULT: HashPrefix = HashPrefix::new(1, 0, true);

    /// Create a prefix
    #[inline]
    pub const fn new(n_fields: usize, n_bytes: usize, left_side: bool) -> Self {
        Self {
            n_fields,
            n_bytes,
            left_side,
        }
    }

    /// Number of fields a tuple must carry to be folded with this prefix
    #[inline]
    pub const fn n_fields_required(&self) -> usize {
        self.n_fields + (self.n_bytes > 0) as usize
    }

    /// Whether the prefix is usable for an index with `n_unique` unique fields
    #[inline]
    pub const fn is_valid_for(&self, n_unique: usize) -> bool {
        self.n_fields + self.n_bytes > 0 && self.n_fields_required() <= n_unique
    }

    #[inline]
    const fn as_pair(&self) -> (usize, usize) {
        (self.n_fields, self.n_bytes)
    }
}

impl Default for HashPrefix {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Match depths a search reported against its low and up neighbours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchMatches {
    /// Whole fields matched against the low record
    pub low_match: usize,
    /// Extra bytes matched against the low record
    pub low_bytes: usize,
    /// Whole fields matched against the up record
    pub up_match: usize,
    /// Extra bytes matched against the up record
    pub up_bytes: usize,
}

const NO_ROOT: u32 = u32::MAX;

/// Search statistics of one index
#[derive(Debug)]
pub struct SearchInfo {
    n_fields: AtomicU16,
    n_bytes: AtomicU16,
    left_side: AtomicBool,
    hash_analysis: AtomicU32,
    n_hash_potential: AtomicU32,
    last_hash_succ: AtomicBool,
    ref_count: AtomicUsize,
    root_guess: AtomicU32,
}

impl Default for SearchInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchInfo {
    /// Fresh statistics recommending [`HashPrefix::DEFAULT`]
    pub fn new() -> Self {
        Self {
            n_fields: AtomicU16::new(HashPrefix::DEFAULT.n_fields as u16),
            n_bytes: AtomicU16::new(HashPrefix::DEFAULT.n_bytes as u16),
            left_side: AtomicBool::new(HashPrefix::DEFAULT.left_side),
            hash_analysis: AtomicU32::new(0),
            n_hash_potential: AtomicU32::new(0),
            last_hash_succ: AtomicBool::new(false),
            ref_count: AtomicUsize::new(0),
            root_guess: AtomicU32::new(NO_ROOT),
        }
    }

    /// Currently recommended prefix
    #[inline]
    pub fn prefix(&self) -> HashPrefix {
        HashPrefix {
            n_fields: self.n_fields.load(Ordering::Relaxed) as usize,
            n_bytes: self.n_bytes.load(Ordering::Relaxed) as usize,
            left_side: self.left_side.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn set_prefix(&self, prefix: HashPrefix) {
        self.n_fields.store(prefix.n_fields as u16, Ordering::Relaxed);
        self.n_bytes.store(prefix.n_bytes as u16, Ordering::Relaxed);
        self.left_side.store(prefix.left_side, Ordering::Relaxed);
    }

    /// Consecutive searches that would have succeeded with the recommendation
    #[inline]
    pub fn n_hash_potential(&self) -> u32 {
        self.n_hash_potential.load(Ordering::Relaxed)
    }

    pub(crate) fn bump_potential(&self) {
        let cur = self.n_hash_potential.load(Ordering::Relaxed);
        if cur < POTENTIAL_CAP {
            self.n_hash_potential.store(cur + 1, Ordering::Relaxed);
        }
    }

    /// Searches since the recommendation last changed
    #[inline]
    pub fn hash_analysis(&self) -> u32 {
        self.hash_analysis.load(Ordering::Relaxed)
    }

    /// Count one search and report whether statistics should be updated
    pub fn analysis_due(&self) -> bool {
        let n = self.hash_analysis.load(Ordering::Relaxed).saturating_add(1);
        self.hash_analysis.store(n, Ordering::Relaxed);
        n >= HASH_ANALYSIS
    }

    /// Whether the last search was answered from the hash index
    #[inline]
    pub fn last_hash_succ(&self) -> bool {
        self.last_hash_succ.load(Ordering::Relaxed)
    }

    pub(crate) fn set_last_hash_succ(&self, value: bool) {
        self.last_hash_succ.store(value, Ordering::Relaxed);
    }

    /// Number of blocks hashed under this index
    #[inline]
    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    // ref_count is only modified under the owning partition's exclusive latch.
    pub(crate) fn inc_ref_count(&self) {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn dec_ref_count(&self) {
        let prev = self.ref_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "search info ref_count underflow");
    }

    pub(crate) fn reset_ref_count(&self) {
        self.ref_count.store(0, Ordering::Release);
    }

    /// Cached root block of the tree
    pub fn root_guess(&self) -> Option<BlockId> {
        match self.root_guess.load(Ordering::Relaxed) {
            NO_ROOT => None,
            raw => Some(BlockId::new(raw)),
        }
    }

    /// Remember the root block of the tree
    pub fn set_root_guess(&self, block: Option<BlockId>) {
        let raw = block.map_or(NO_ROOT, BlockId::get);
        self.root_guess.store(raw, Ordering::Relaxed);
    }

    /// Update the recommendation after a B-tree search with matches `m`.
    ///
    /// When the current recommendation would have identified the search
    /// result, the potential grows; otherwise a new prefix is derived from
    /// the match depths and the potential restarts.
    pub(crate) fn update_hash(&self, m: &SearchMatches, n_unique: usize) {
        if self.n_hash_potential() > 0 {
            let cur = self.prefix();

            if cur.n_fields >= n_unique && m.up_match >= n_unique {
                self.bump_potential();
                return;
            }

            let low_cmp = cur.as_pair().cmp(&(m.low_match, m.low_bytes));
            let too_short = if cur.left_side {
                low_cmp.is_le()
            } else {
                low_cmp.is_gt()
            };
            if !too_short {
                let up_cmp = cur.as_pair().cmp(&(m.up_match, m.up_bytes));
                let fits = if cur.left_side {
                    up_cmp.is_le()
                } else {
                    up_cmp.is_gt()
                };
                if fits {
                    self.bump_potential();
                    return;
                }
            }
        }
        self.recommend(m, n_unique);
    }

    fn recommend(&self, m: &SearchMatches, n_unique: usize) {
        self.hash_analysis.store(0, Ordering::Relaxed);

        let up = (m.up_match, m.up_bytes);
        let low = (m.low_match, m.low_bytes);
        let prefix = match up.cmp(&low) {
            std::cmp::Ordering::Equal => {
                self.n_hash_potential.store(0, Ordering::Relaxed);
                HashPrefix::DEFAULT
            }
            std::cmp::Ordering::Greater => {
                self.n_hash_potential.store(1, Ordering::Relaxed);
                let (n_fields, n_bytes) = if m.up_match >= n_unique {
                    (n_unique, 0)
                } else if m.low_match < m.up_match {
                    (m.low_match + 1, 0)
                } else {
                    (m.low_match, m.low_bytes + 1)
                };
                HashPrefix::new(n_fields, n_bytes, true)
            }
            std::cmp::Ordering::Less => {
                self.n_hash_potential.store(1, Ordering::Relaxed);
                let (n_fields, n_bytes) = if m.low_match >= n_unique {
                    (n_unique, 0)
                } else if m.low_match > m.up_match {
                    (m.up_match + 1, 0)
                } else {
                    (m.up_match, m.up_bytes + 1)
                };
                HashPrefix::new(n_fields, n_bytes, false)
            }
        };
        self.set_prefix(prefix);
    }
}
