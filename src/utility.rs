//! Bit and hash mixing helpers shared by the fold computation and the
//! partition tables.

/// Check if a value is a power of two
#[inline]
pub const fn is_power_of_two(n: u64) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// Round up to the next power of two
#[inline]
pub const fn next_power_of_two(mut n: u64) -> u64 {
    if n == 0 {
        return 1;
    }
    n -= 1;
    n |= n >> 1;
    n |= n >> 2;
    n |= n >> 4;
    n |= n >> 8;
    n |= n >> 16;
    n |= n >> 32;
    n + 1
}

/// Mix `value` into an accumulated fold (boost::hash_combine style)
#[inline]
pub const fn fold_pair(seed: u64, value: u64) -> u64 {
    seed ^ (value
        .wrapping_add(0x9e3779b97f4a7c15)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2))
}

/// MurmurHash3 finalizer (64-bit)
#[inline]
pub const fn murmur3_finalize(mut h: u64) -> u64 {
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51afd7ed558ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ceb9fe1a85ec53);
    h ^= h >> 33;
    h
}
