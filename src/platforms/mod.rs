//! Prediction-market integrations.
//!
//! Defines the `MarketSource` trait consumed by the settlement reconciler
//! and the Kalshi implementation.

pub mod kalshi;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::EngineError;

/// Current state of one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStatus {
    pub ticker: String,
    /// Lowercased venue status (`active`, `closed`, `settled`, ...).
    pub status: String,
    /// `yes` or `no` once resolved.
    pub result: Option<String>,
}

impl MarketStatus {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.status.as_str(), "cancelled" | "canceled")
    }

    /// Terminal statuses that carry a binary result.
    pub fn is_resolved(&self) -> bool {
        matches!(self.status.as_str(), "settled" | "closed" | "finalized")
    }
}

/// Read access to market resolution.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn market_status(&self, ticker: &str) -> Result<MarketStatus, EngineError>;
}
