//! Odds slate job.
//!
//! fetch → consensus → snapshot → detection. One run processes one date.
//! Sport fetch failures, a corrupt pick artifact, or a dead enrichment
//! feed only shrink the report; they never fail the job.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::data::{EnrichmentIndex, EnrichmentProvider};
use crate::engine::report::{JobCounts, SlateReport};
use crate::odds::consensus::ConsensusBuilder;
use crate::odds::{fetch_slate, OddsSource};
use crate::storage::picks::{load_picks, LoadedPicks, PickVariant};
use crate::storage::snapshots::SnapshotStore;
use crate::strategy::cross_book::CrossBookScanner;
use crate::strategy::line_movement::{LineMovementDetector, SnapshotPair};
use crate::types::{EngineError, Sport};

/// Parse configured league codes.
pub fn configured_sports(config: &AppConfig) -> Result<Vec<Sport>, EngineError> {
    config
        .odds
        .sports
        .iter()
        .map(|code| {
            Sport::from_str(code)
                .map_err(|e| EngineError::Configuration(format!("odds.sports: {e}")))
        })
        .collect()
}

pub struct SlateJob<'a> {
    source: &'a dyn OddsSource,
    enrichment: Option<&'a dyn EnrichmentProvider>,
    sports: Vec<Sport>,
    per_call_timeout: Duration,
    builder: ConsensusBuilder,
    detector: LineMovementDetector,
    scanner: CrossBookScanner,
    data_dir: PathBuf,
}

impl<'a> SlateJob<'a> {
    pub fn new(source: &'a dyn OddsSource, config: &AppConfig) -> Result<Self, EngineError> {
        Ok(Self {
            source,
            enrichment: None,
            sports: configured_sports(config)?,
            per_call_timeout: Duration::from_secs(config.odds.timeout_secs),
            builder: ConsensusBuilder::new(config.odds.max_bookmakers)
                .with_devig(config.odds.devig)
                .with_max_quote_age(config.odds.max_quote_age_secs),
            detector: LineMovementDetector::new(config.line_movement.clone()),
            scanner: CrossBookScanner::new(config.line_movement.cross_book_min_profit_pct)
                .with_max_quote_age(config.odds.max_quote_age_secs),
            data_dir: PathBuf::from(&config.engine.data_dir),
        })
    }

    pub fn with_enrichment(mut self, provider: &'a dyn EnrichmentProvider) -> Self {
        self.enrichment = Some(provider);
        self
    }

    pub async fn run(&self, date: &str) -> Result<SlateReport> {
        let mut report = SlateReport {
            date: date.to_string(),
            ..SlateReport::default()
        };

        let slate = fetch_slate(self.source, &self.sports, self.per_call_timeout).await;
        report.sports = JobCounts {
            attempted: slate.attempted,
            succeeded: slate.succeeded,
            failed: slate.failures.len(),
        };
        report.failures = slate
            .failures
            .iter()
            .map(|(sport, e)| format!("{sport}: {e}"))
            .collect();
        report.games = slate.games.len();

        let lines = self.builder.build_all(&slate.games);
        report.consensus_lines = lines.len();

        let mut store = SnapshotStore::open(&self.data_dir, date)?;
        for line in lines {
            store.record(line);
            report.snapshots_written += 1;
        }
        if report.snapshots_written > 0 {
            store.save()?;
        }

        report.cross_book = self.scanner.scan_all(&slate.games);

        let early = self.load_variant(date, PickVariant::Early, &mut report);
        let current = self.load_variant(date, PickVariant::Regular, &mut report);
        match (early, current) {
            (Some(early), Some(current)) => {
                let pairs = store.pairs();
                let enrichment = self.enrichment_for(&pairs_sports(&pairs)).await;
                let opportunities =
                    self.detector
                        .detect(&pairs, &early.picks, &current.picks, enrichment.as_ref());
                report.opportunities = opportunities.len();
                report.summaries = self.detector.summaries(&opportunities);
                for summary in &report.summaries {
                    info!(%summary, "Line move");
                }
            }
            (None, _) => info!(date, "No early picks, skipping line-move detection"),
            (_, None) => info!(date, "No current picks, skipping line-move detection"),
        }

        info!(%report, "Slate job complete");
        Ok(report)
    }

    fn load_variant(&self, date: &str, variant: PickVariant, report: &mut SlateReport) -> Option<LoadedPicks> {
        match load_picks(&self.data_dir, date, variant) {
            Ok(loaded) => {
                if let Some(l) = loaded.as_ref().filter(|l| l.skipped > 0) {
                    report
                        .failures
                        .push(format!("{}: {} malformed picks skipped", l.artifact, l.skipped));
                }
                loaded
            }
            Err(e) => {
                warn!(date, ?variant, error = %e, "Pick artifact unreadable, continuing without");
                report.failures.push(format!("{}: {e}", variant.file_name(date)));
                None
            }
        }
    }

    async fn enrichment_for(&self, sports: &BTreeSet<Sport>) -> Option<EnrichmentIndex> {
        let provider = self.enrichment?;
        let mut merged = EnrichmentIndex::new();
        for &sport in sports {
            match provider.fetch(sport).await {
                Ok(index) => merged.merge(index),
                Err(e) => warn!(sport = %sport, error = %e, "Enrichment failed, continuing without"),
            }
        }
        (!merged.is_empty()).then_some(merged)
    }
}

fn pairs_sports(pairs: &[SnapshotPair]) -> BTreeSet<Sport> {
    pairs.iter().map(|p| p.current.line.sport).collect()
}
