//! Signal engine: sports odds consensus, line-move and arbitrage detection,
//! teaser and pattern scoring, tiered pick syndication, and prediction-market
//! settlement.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod odds;
pub mod data;
pub mod strategy;
pub mod engine;
pub mod platforms;
pub mod storage;
pub mod trigger;
