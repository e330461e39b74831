//! Batch jobs.
//!
//! Each `run_*` function wires one job from configuration, resolves the
//! secrets it needs before touching the network or the ledger, runs it
//! once and returns its report.

pub mod reconciler;
pub mod report;
pub mod slate;
pub mod syndicator;
pub mod tiers;

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::config::AppConfig;
use crate::data::injuries::HttpEnrichmentProvider;
use crate::odds::the_odds_api::TheOddsApiClient;
use crate::platforms::kalshi::{KalshiClient, RequestSigner};
use crate::storage::ledger::BetLedger;
use crate::storage::picks::load_for_syndication;

use reconciler::Reconciler;
use report::{SettlementReport, SlateReport, SyndicationReport};
use slate::{configured_sports, SlateJob};
use syndicator::{HttpWebhook, Syndicator, WebhookTransport};
use tiers::TierAllocator;

/// Run id shared by every batch of one syndication run.
pub fn run_id(config: &AppConfig, date: &str) -> String {
    format!("{}-{date}", config.engine.run_id_prefix)
}

/// Allocate and publish the date's picks.
pub async fn run_syndicate(config: &AppConfig, date: &str, dry_run: bool) -> Result<SyndicationReport> {
    let dry_run = dry_run || config.engine.dry_run;
    let transport: Option<Box<dyn WebhookTransport>> = if dry_run {
        None
    } else {
        let url = config.webhook_url()?;
        Some(Box::new(HttpWebhook::new(url, config.syndication.timeout_secs)?))
    };

    let input = load_for_syndication(Path::new(&config.engine.data_dir), date);
    let (picks, artifact, skipped) = match input.loaded {
        Some(l) => (l.picks, Some(l.artifact), l.skipped),
        None => {
            info!(date, "No pick artifact for date");
            (Vec::new(), None, 0)
        }
    };

    let syndicator = Syndicator::new(
        TierAllocator::new(config.tiers.clone()),
        transport,
        config.syndication.source.clone(),
    );
    let mut report = syndicator
        .publish(&run_id(config, date), date, picks, artifact, dry_run)
        .await?;
    report.skipped_picks = skipped;
    report.load_failures = input.failures;
    Ok(report)
}

/// One settlement sweep over the ledger.
pub async fn run_settle(config: &AppConfig) -> Result<SettlementReport> {
    let key_id = config.settlement_key_id()?;
    let private_key = config.settlement_private_key()?;

    let client = KalshiClient::new(
        &config.settlement.base_url,
        RequestSigner::new(key_id, private_key),
        config.settlement.timeout_secs,
    )?;
    let ledger = BetLedger::connect(&config.ledger.database_url).await?;

    Reconciler::new(
        &client,
        &ledger,
        Duration::from_millis(config.settlement.inter_call_delay_ms),
    )
    .run()
    .await
}

/// Fetch the slate, refresh snapshots and scan for opportunities.
pub async fn run_odds(config: &AppConfig, date: &str) -> Result<SlateReport> {
    let api_key = config.odds_api_key()?;
    configured_sports(config)?;

    let source = TheOddsApiClient::new(&config.odds.base_url, api_key, config.odds.timeout_secs)?;
    let enrichment = match &config.odds.enrichment_url {
        Some(url) => Some(HttpEnrichmentProvider::new(url, config.odds.timeout_secs)?),
        None => None,
    };

    let mut job = SlateJob::new(&source, config)?;
    if let Some(provider) = &enrichment {
        job = job.with_enrichment(provider);
    }
    job.run(date).await
}
