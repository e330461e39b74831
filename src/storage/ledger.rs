//! Bet ledger on SQLite.
//!
//! Rows are inserted when a wager is placed and moved to a terminal result
//! exactly once. The settle UPDATE is guarded by `result IS NULL`, so a
//! second reconciler pass over the same row is a no-op.

use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};
use tracing::info;

use crate::types::{BetLedgerRow, BetResult, Side};

/// A wager to record.
#[derive(Debug, Clone)]
pub struct NewBet {
    pub ticker: Option<String>,
    pub side: Side,
    pub contracts: i64,
    pub stake_cents: i64,
    pub placed_at: DateTime<Utc>,
}

/// Terminal values written by settlement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settlement {
    pub result: BetResult,
    pub payout_cents: i64,
    pub profit_cents: i64,
    pub settled_at: DateTime<Utc>,
}

pub struct BetLedger {
    pool: Pool<Sqlite>,
}

impl BetLedger {
    pub async fn connect(database_url: &str) -> Result<Self> {
        if let Some(path) = database_url.strip_prefix("sqlite:") {
            let path = path.trim_start_matches("//");
            if !path.starts_with(":memory:") {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).context("Failed to create ledger directory")?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid ledger database URL")?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to ledger database")?;

        let ledger = Self { pool };
        ledger.init_schema().await?;
        info!(database_url, "Bet ledger ready");
        Ok(ledger)
    }

    /// Private in-memory ledger. One connection, so every query sees the
    /// same database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory ledger")?;
        let ledger = Self { pool };
        ledger.init_schema().await?;
        Ok(ledger)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT,
                side TEXT NOT NULL,
                contracts INTEGER NOT NULL,
                stake_cents INTEGER NOT NULL,
                result TEXT,
                payout_cents INTEGER,
                profit_cents INTEGER,
                settled_at TEXT,
                placed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create bets table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_bets_result_ticker
            ON bets (result, ticker)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_bet(&self, bet: &NewBet) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO bets (ticker, side, contracts, stake_cents, placed_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&bet.ticker)
        .bind(bet.side.as_str())
        .bind(bet.contracts)
        .bind(bet.stake_cents)
        .bind(bet.placed_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to insert bet")?;

        Ok(result.last_insert_rowid())
    }

    /// Rows awaiting settlement: a ticker and no result yet.
    pub async fn pending_settlement(&self) -> Result<Vec<BetLedgerRow>> {
        let rows = sqlx::query_as::<_, LedgerRow>(
            r#"
            SELECT id, ticker, side, contracts, stake_cents, result,
                   payout_cents, profit_cents, settled_at
            FROM bets
            WHERE ticker IS NOT NULL AND result IS NULL
            ORDER BY ticker, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch pending bets")?;

        rows.into_iter().map(BetLedgerRow::try_from).collect()
    }

    pub async fn get(&self, id: i64) -> Result<Option<BetLedgerRow>> {
        let row = sqlx::query_as::<_, LedgerRow>(
            r#"
            SELECT id, ticker, side, contracts, stake_cents, result,
                   payout_cents, profit_cents, settled_at
            FROM bets WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch bet")?;

        row.map(BetLedgerRow::try_from).transpose()
    }

    /// Write a terminal result. Returns `false` when the row was already
    /// settled (or does not exist) and nothing changed.
    pub async fn settle(&self, id: i64, settlement: &Settlement) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE bets
            SET result = ?, payout_cents = ?, profit_cents = ?, settled_at = ?
            WHERE id = ? AND result IS NULL
            "#,
        )
        .bind(settlement.result.as_str())
        .bind(settlement.payout_cents)
        .bind(settlement.profit_cents)
        .bind(settlement.settled_at.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to settle bet {id}"))?;

        Ok(result.rows_affected() == 1)
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct LedgerRow {
    id: i64,
    ticker: Option<String>,
    side: String,
    contracts: i64,
    stake_cents: i64,
    result: Option<String>,
    payout_cents: Option<i64>,
    profit_cents: Option<i64>,
    settled_at: Option<String>,
}

impl TryFrom<LedgerRow> for BetLedgerRow {
    type Error = anyhow::Error;

    fn try_from(row: LedgerRow) -> Result<Self> {
        let side = Side::from_str(&row.side).map_err(|e| anyhow!("bet {}: {e}", row.id))?;
        let result = row
            .result
            .as_deref()
            .map(BetResult::from_str)
            .transpose()
            .map_err(|e| anyhow!("bet {}: {e}", row.id))?;
        let settled_at = row
            .settled_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(BetLedgerRow {
            id: row.id,
            ticker: row.ticker,
            side,
            contracts: row.contracts,
            stake_cents: row.stake_cents,
            result,
            payout_cents: row.payout_cents,
            profit_cents: row.profit_cents,
            settled_at,
        })
    }
}
