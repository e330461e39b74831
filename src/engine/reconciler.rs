//! Settlement reconciler.
//!
//! Sweeps the bet ledger for rows with a ticker and no result, fetches each
//! distinct market once and writes terminal results. Calls are sequential
//! with a fixed delay between tickers. A ticker that fails to fetch is
//! logged and left for the next sweep.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::engine::report::SettlementReport;
use crate::platforms::{MarketSource, MarketStatus};
use crate::storage::ledger::{BetLedger, Settlement};
use crate::types::{BetLedgerRow, BetResult, Side};

/// Payout per winning contract, in cents.
pub const CONTRACT_PAYOUT_CENTS: i64 = 100;

/// Terminal values for one row given its market's status, or `None` when
/// the market has not resolved yet.
pub fn resolve(row: &BetLedgerRow, market: &MarketStatus, now: DateTime<Utc>) -> Option<Settlement> {
    if market.is_cancelled() {
        return Some(Settlement {
            result: BetResult::Cancelled,
            payout_cents: row.stake_cents,
            profit_cents: 0,
            settled_at: now,
        });
    }

    if !market.is_resolved() {
        return None;
    }

    // Closed without a binary result yet
    let outcome = Side::from_str(market.result.as_deref()?).ok()?;
    let (result, payout_cents) = if outcome == row.side {
        (BetResult::Win, row.contracts * CONTRACT_PAYOUT_CENTS)
    } else {
        (BetResult::Loss, 0)
    };

    Some(Settlement {
        result,
        payout_cents,
        profit_cents: payout_cents - row.stake_cents,
        settled_at: now,
    })
}

pub struct Reconciler<'a> {
    source: &'a dyn MarketSource,
    ledger: &'a BetLedger,
    delay: Duration,
}

impl<'a> Reconciler<'a> {
    pub fn new(source: &'a dyn MarketSource, ledger: &'a BetLedger, delay: Duration) -> Self {
        Self { source, ledger, delay }
    }

    /// Run one sweep. Only a failure to read the pending rows is an error.
    pub async fn run(&self) -> Result<SettlementReport> {
        let pending = self.ledger.pending_settlement().await?;
        let mut by_ticker: BTreeMap<String, Vec<BetLedgerRow>> = BTreeMap::new();
        for row in pending {
            if let Some(ticker) = row.ticker.clone() {
                by_ticker.entry(ticker).or_default().push(row);
            }
        }

        info!(tickers = by_ticker.len(), "Settlement sweep starting");
        let mut report = SettlementReport::default();

        for (i, (ticker, rows)) in by_ticker.iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            report.tickers_attempted += 1;

            let market = match self.source.market_status(ticker).await {
                Ok(m) => m,
                Err(e) => {
                    warn!(ticker = %ticker, error = %e, "Market fetch failed, skipping ticker");
                    report.tickers_failed += 1;
                    continue;
                }
            };
            let now = Utc::now();
            let mut resolved_any = false;
            let mut write_failed = false;
            for row in rows {
                let Some(settlement) = resolve(row, &market, now) else {
                    continue;
                };
                resolved_any = true;

                match self.ledger.settle(row.id, &settlement).await {
                    Ok(true) => {
                        report.rows_settled += 1;
                        match settlement.result {
                            BetResult::Win => report.wins += 1,
                            BetResult::Loss => report.losses += 1,
                            BetResult::Cancelled => report.cancelled += 1,
                        }
                        report.add_cents(settlement.payout_cents, settlement.profit_cents);
                        info!(
                            bet_id = row.id,
                            ticker = %ticker,
                            result = %settlement.result,
                            payout_cents = settlement.payout_cents,
                            profit_cents = settlement.profit_cents,
                            "Bet settled"
                        );
                    }
                    Ok(false) => debug!(bet_id = row.id, "Already settled"),
                    Err(e) => {
                        warn!(bet_id = row.id, ticker = %ticker, error = %format!("{e:#}"), "Failed to write settlement");
                        write_failed = true;
                    }
                }
            }

            if write_failed {
                report.tickers_failed += 1;
                continue;
            }
            report.tickers_succeeded += 1;
            if !resolved_any {
                debug!(ticker = %ticker, status = %market.status, "Market not resolved yet");
                report.tickers_pending += 1;
            }
        }

        info!(%report, "Settlement sweep complete");
        Ok(report)
    }
}
