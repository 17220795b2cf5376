//! Property tests for assignment and statistics invariants.

mod assignment_props;
mod distribution_tests;
mod stats_props;
