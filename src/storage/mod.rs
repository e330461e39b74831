//! Persistence layer.
//!
//! The bet ledger lives in SQLite. Pick artifacts and line snapshots are
//! JSON files under the configured data directory.

pub mod ledger;
pub mod picks;
pub mod snapshots;
