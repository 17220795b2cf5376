//! Versioned string hash used for bucketing.
//!
//! Changing this function reshuffles every subject in every running test,
//! so any change must ship as a new `HASH_VERSION`.

/// Version of [`stable_hash`]. v1: 32-bit polynomial, multiplier 31.
pub const HASH_VERSION: u32 = 1;

/// Number of buckets subjects are spread across.
pub const BUCKETS: u32 = 100;

/// v1: `h = h * 31 + code_point` over Unicode scalar values in two's
/// complement 32-bit arithmetic, starting from 0, then the absolute value.
///
/// `i32::MIN` has no positive counterpart in `i32`; it maps to `2^31`.
pub fn stable_hash(input: &str) -> u32 {
    let mut hash: i32 = 0;
    for ch in input.chars() {
        hash = hash.wrapping_mul(31).wrapping_add(ch as i32);
    }
    hash.unsigned_abs()
}

/// Bucket in `0..BUCKETS` for a subject.
pub fn bucket(subject_id: &str) -> u32 {
    stable_hash(subject_id) % BUCKETS
}
