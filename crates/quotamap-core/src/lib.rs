#![forbid(unsafe_code)]
//! quotamap-core: value model, handles, cost estimator, config and errors.
//!
//! This crate holds everything a caller needs to *describe* writes against a
//! budget without pulling in the arena/registry engine (`quotamap-mem`).
//! No I/O and no global mutable state beyond the once-per-kind warning set.

pub mod config;
pub mod cost;
pub mod error;
pub mod hash;
pub mod id;
pub mod plain;
pub mod prelude;
pub mod value;

/// Crate version string, stamped into stats snapshots.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
