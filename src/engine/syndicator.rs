//! Tiered signal syndication.
//!
//! Each non-empty tier is POSTed as one batch carrying a checksum and a
//! `batchId` of `{run_id}-{tier}` so downstream can dedupe retries.
//! A rejected tier is recorded and not retried within the run.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::report::{JobCounts, SyndicationReport, TierOutcome, TierStatus};
use super::tiers::{TierAllocation, TierAllocator};
use crate::types::{normalize_error_body, EngineError, Pick, Tier};

const CHECKSUM_LEN: usize = 16;

/// Wire body for one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyndicationBatch {
    pub tier: Tier,
    pub picks: Vec<Pick>,
    pub batch_id: String,
    pub checksum: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

/// Truncated SHA-256 over the serialized picks.
pub fn batch_checksum(tier: Tier, picks: &[Pick]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tier.as_str().as_bytes());
    hasher.update(serde_json::to_vec(picks).unwrap_or_default());
    let digest = hex::encode(hasher.finalize());
    digest[..CHECKSUM_LEN].to_string()
}

pub fn batch_id(run_id: &str, tier: Tier) -> String {
    format!("{run_id}-{tier}")
}

/// What the webhook said about an accepted batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebhookResponse {
    pub status: u16,
    /// Per-item validation errors, if any.
    pub errors: Vec<String>,
}

/// Delivery seam for batches.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// `Err` when the batch was not accepted at all.
    async fn post(&self, batch: &SyndicationBatch) -> Result<WebhookResponse, EngineError>;
}

// ---------------------------------------------------------------------------
// HTTP transport
// ---------------------------------------------------------------------------

pub struct HttpWebhook {
    http: Client,
    url: String,
}

impl HttpWebhook {
    pub fn new(url: String, timeout_secs: u64) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("signal-engine/0.1.0")
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self { http, url })
    }
}

/// Pull `errors[]` out of a webhook response body.
fn response_errors(body: &str) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return Vec::new();
    };
    value
        .get("errors")
        .and_then(|e| e.as_array())
        .map(|items| {
            items
                .iter()
                .map(|e| match e.as_str() {
                    Some(s) => s.to_string(),
                    None => e.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl WebhookTransport for HttpWebhook {
    async fn post(&self, batch: &SyndicationBatch) -> Result<WebhookResponse, EngineError> {
        let resp = self
            .http
            .post(&self.url)
            .json(batch)
            .send()
            .await
            .map_err(|e| EngineError::WebhookRejection {
                tier: batch.tier.to_string(),
                status: 0,
                message: e.to_string(),
            })?;

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        if !(200..300).contains(&status) {
            return Err(EngineError::WebhookRejection {
                tier: batch.tier.to_string(),
                status,
                message: normalize_error_body(status, &body),
            });
        }
        Ok(WebhookResponse {
            status,
            errors: response_errors(&body),
        })
    }
}

// ---------------------------------------------------------------------------
// Syndicator
// ---------------------------------------------------------------------------

pub struct Syndicator {
    allocator: TierAllocator,
    transport: Option<Box<dyn WebhookTransport>>,
    source: String,
}

impl Syndicator {
    /// `transport` may be `None` only for dry runs.
    pub fn new(allocator: TierAllocator, transport: Option<Box<dyn WebhookTransport>>, source: impl Into<String>) -> Self {
        Self {
            allocator,
            transport,
            source: source.into(),
        }
    }

    pub fn build_batches(&self, run_id: &str, allocation: &TierAllocation) -> Vec<SyndicationBatch> {
        let now = Utc::now();
        allocation
            .non_empty()
            .map(|(tier, picks)| SyndicationBatch {
                tier,
                picks: picks.to_vec(),
                batch_id: batch_id(run_id, tier),
                checksum: batch_checksum(tier, picks),
                timestamp: now,
                source: self.source.clone(),
            })
            .collect()
    }

    /// Allocate and publish one date's picks.
    pub async fn publish(
        &self,
        run_id: &str,
        date: &str,
        picks: Vec<Pick>,
        source_artifact: Option<String>,
        dry_run: bool,
    ) -> Result<SyndicationReport, EngineError> {
        let transport = match (&self.transport, dry_run) {
            (_, true) => None,
            (Some(t), false) => Some(t.as_ref()),
            (None, false) => {
                return Err(EngineError::Configuration(
                    "syndication webhook is not configured".into(),
                ))
            }
        };

        let allocation = self.allocator.allocate(picks);
        let batches = self.build_batches(run_id, &allocation);
        let mut counts = JobCounts::default();
        let mut tiers = Vec::with_capacity(batches.len());

        for batch in &batches {
            let mut outcome = TierOutcome {
                tier: batch.tier,
                picks: batch.picks.len(),
                status: TierStatus::DryRun,
                batch_id: batch.batch_id.clone(),
                checksum: batch.checksum.clone(),
                errors: Vec::new(),
            };

            let Some(transport) = transport else {
                info!(tier = %batch.tier, picks = batch.picks.len(), batch_id = %batch.batch_id, "[DRY RUN] Would post batch");
                counts.record(true);
                tiers.push(outcome);
                continue;
            };

            match transport.post(batch).await {
                Ok(resp) if resp.errors.is_empty() => {
                    info!(tier = %batch.tier, picks = batch.picks.len(), batch_id = %batch.batch_id, "Batch posted");
                    outcome.status = TierStatus::Posted;
                    counts.record(true);
                }
                Ok(resp) => {
                    warn!(
                        tier = %batch.tier,
                        batch_id = %batch.batch_id,
                        errors = resp.errors.len(),
                        "Batch posted with item errors"
                    );
                    outcome.status = TierStatus::PostedWithErrors;
                    outcome.errors = resp.errors;
                    counts.record(true);
                }
                Err(e) => {
                    warn!(tier = %batch.tier, batch_id = %batch.batch_id, error = %e, "Batch rejected");
                    outcome.status = TierStatus::Failed;
                    outcome.errors = vec![e.to_string()];
                    counts.record(false);
                }
            }
            tiers.push(outcome);
        }

        let report = SyndicationReport {
            run_id: run_id.to_string(),
            date: date.to_string(),
            dry_run,
            source_artifact,
            total_picks: allocation.total(),
            elite: allocation.elite.len(),
            premium: allocation.premium.len(),
            free: allocation.free.len(),
            tiers,
            counts,
            skipped_picks: 0,
            load_failures: Vec::new(),
        };
        info!(%report, "Syndication complete");
        Ok(report)
    }
}
