//! Signal strategies: line movement, cross-book arbitrage, teasers, and
//! pattern scoring. All are pure transforms over odds and picks.

pub mod cross_book;
pub mod line_movement;
pub mod patterns;
pub mod teaser;
