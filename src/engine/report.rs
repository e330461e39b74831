//! Job reports.
//!
//! Every job reports attempted/succeeded/failed counts, even under partial
//! failure, so callers can tell "nothing to do" from "some sources failed".

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

use crate::strategy::cross_book::CrossBookArb;
use crate::types::Tier;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl JobCounts {
    pub fn record(&mut self, ok: bool) {
        self.attempted += 1;
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Syndication
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TierStatus {
    Posted,
    /// Accepted by the webhook, but some items failed validation.
    PostedWithErrors,
    Failed,
    DryRun,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierOutcome {
    pub tier: Tier,
    pub picks: usize,
    pub status: TierStatus,
    pub batch_id: String,
    pub checksum: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyndicationReport {
    pub run_id: String,
    pub date: String,
    pub dry_run: bool,
    /// Which artifact the picks came from, if any.
    pub source_artifact: Option<String>,
    pub total_picks: usize,
    pub elite: usize,
    pub premium: usize,
    pub free: usize,
    pub tiers: Vec<TierOutcome>,
    pub counts: JobCounts,
    /// Artifact entries that did not parse as a pick.
    pub skipped_picks: usize,
    /// Artifacts that could not be read at all.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub load_failures: Vec<String>,
}

impl fmt::Display for SyndicationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run {} ({}): {} picks (elite {}, premium {}, free {}, {} skipped) tiers {}/{} ok{}",
            self.run_id,
            self.date,
            self.total_picks,
            self.elite,
            self.premium,
            self.free,
            self.skipped_picks,
            self.counts.succeeded,
            self.counts.attempted,
            if self.dry_run { " [dry run]" } else { "" },
        )
    }
}

// ---------------------------------------------------------------------------
// Odds slate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct SlateReport {
    pub date: String,
    pub sports: JobCounts,
    pub games: usize,
    pub consensus_lines: usize,
    pub snapshots_written: usize,
    pub opportunities: usize,
    pub summaries: Vec<String>,
    pub cross_book: Vec<CrossBookArb>,
    pub failures: Vec<String>,
}

impl fmt::Display for SlateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "slate {}: sports {}/{} ok, {} games, {} line moves, {} cross-book arbs",
            self.date,
            self.sports.succeeded,
            self.sports.attempted,
            self.games,
            self.opportunities,
            self.cross_book.len(),
        )
    }
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SettlementReport {
    pub tickers_attempted: usize,
    pub tickers_succeeded: usize,
    pub tickers_failed: usize,
    /// Fetched fine but not yet resolved.
    pub tickers_pending: usize,
    pub rows_settled: usize,
    pub wins: usize,
    pub losses: usize,
    pub cancelled: usize,
    /// Dollars.
    pub total_payout: Decimal,
    /// Dollars.
    pub total_profit: Decimal,
}

impl SettlementReport {
    pub fn add_cents(&mut self, payout_cents: i64, profit_cents: i64) {
        self.total_payout += Decimal::new(payout_cents, 2);
        self.total_profit += Decimal::new(profit_cents, 2);
    }
}

impl fmt::Display for SettlementReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "settlement: tickers {}/{} ok ({} pending, {} failed), rows {} (W{} L{} C{}), payout ${} profit ${}",
            self.tickers_succeeded,
            self.tickers_attempted,
            self.tickers_pending,
            self.tickers_failed,
            self.rows_settled,
            self.wins,
            self.losses,
            self.cancelled,
            self.total_payout,
            self.total_profit,
        )
    }
}
