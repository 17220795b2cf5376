pub mod app;
pub mod assignment;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod lifecycle;
pub mod service;
pub mod stats;
pub mod storage;
pub mod test_utils;
pub mod tracking;

pub use error::{Result, SplitError};

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
