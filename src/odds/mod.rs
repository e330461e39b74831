//! Odds ingestion.
//!
//! Defines the `OddsSource` trait, the consensus builder, and the
//! concurrent per-sport slate fetch.

pub mod consensus;
pub mod the_odds_api;

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, warn};

use crate::types::{EngineError, GameQuotes, Sport};

/// Abstraction over bookmaker odds feeds.
#[async_trait]
pub trait OddsSource: Send + Sync {
    /// Source name for logging.
    fn name(&self) -> &str;

    /// Fetch every game currently quoted for one sport.
    async fn fetch_games(&self, sport: Sport) -> Result<Vec<GameQuotes>, EngineError>;
}

/// Result of one slate fetch across sports.
#[derive(Debug, Default)]
pub struct SlateFetch {
    pub games: Vec<GameQuotes>,
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<(Sport, EngineError)>,
}

/// Fetch all sports concurrently.
///
/// Each sport gets its own timeout; a failure or timeout in one sport is
/// recorded and never cancels the others.
pub async fn fetch_slate(source: &dyn OddsSource, sports: &[Sport], per_call_timeout: Duration) -> SlateFetch {
    let calls = sports.iter().map(|&sport| async move {
        let outcome = match tokio::time::timeout(per_call_timeout, source.fetch_games(sport)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::upstream(
                source.name(),
                format!("{sport} fetch timed out after {}s", per_call_timeout.as_secs_f64()),
            )),
        };
        (sport, outcome)
    });

    let mut slate = SlateFetch {
        attempted: sports.len(),
        ..SlateFetch::default()
    };

    for (sport, outcome) in join_all(calls).await {
        match outcome {
            Ok(games) => {
                slate.succeeded += 1;
                slate.games.extend(games);
            }
            Err(e) => {
                warn!(source = source.name(), sport = %sport, error = %e, "Odds fetch failed, continuing without");
                slate.failures.push((sport, e));
            }
        }
    }

    info!(
        source = source.name(),
        attempted = slate.attempted,
        succeeded = slate.succeeded,
        games = slate.games.len(),
        "Slate fetch complete"
    );
    slate
}
