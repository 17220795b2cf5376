//! Assignment engine: deterministic bucketing of subjects into variants.

pub mod cache;
pub mod engine;
pub mod hash;

pub use cache::{CachedAssignment, SessionAssignments};
pub use engine::{Assignment, Exclusion, assign, assign_loaded, check_audience, select_variant};
pub use hash::{BUCKETS, HASH_VERSION, bucket, stable_hash};
