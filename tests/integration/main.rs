//! Integration tests against the SQLite and in-memory stores.

mod lifecycle_tests;
mod service_flow_tests;
