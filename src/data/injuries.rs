//! HTTP injury/news feed.
//!
//! Expects two JSON endpoints under a base URL:
//! `GET {base}/injuries?sport={code}` → `[{team, player, status, detail?}]`
//! `GET {base}/news?sport={code}` → `[{team, headline}]`
//!
//! The news endpoint is best-effort; injuries alone still yield an index.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{EnrichmentIndex, EnrichmentProvider, InjuryNote};
use crate::types::{normalize_error_body, EngineError, Sport};

const SOURCE_NAME: &str = "enrichment";

#[derive(Debug, Deserialize)]
struct InjuryRow {
    team: String,
    player: String,
    status: String,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsRow {
    team: String,
    headline: String,
}

pub struct HttpEnrichmentProvider {
    http: Client,
    base_url: String,
}

impl HttpEnrichmentProvider {
    pub fn new(base_url: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("signal-engine/0.1.0")
            .build()
            .context("Failed to build enrichment HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str, sport: Sport) -> Result<T, EngineError> {
        let url = format!("{}/{}?sport={}", self.base_url, path, sport.code());
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::upstream(SOURCE_NAME, e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::upstream(
                SOURCE_NAME,
                normalize_error_body(status.as_u16(), &body),
            ));
        }
        resp.json()
            .await
            .map_err(|e| EngineError::upstream(SOURCE_NAME, format!("invalid {path} payload: {e}")))
    }
}

fn build_index(injuries: Vec<InjuryRow>, news: Vec<NewsRow>) -> EnrichmentIndex {
    let mut idx = EnrichmentIndex::new();
    for row in injuries {
        idx.add_injury(
            &row.team,
            InjuryNote {
                player: row.player,
                status: row.status,
                detail: row.detail,
            },
        );
    }
    for row in news {
        idx.add_headline(&row.team, row.headline);
    }
    idx
}

#[async_trait]
impl EnrichmentProvider for HttpEnrichmentProvider {
    async fn fetch(&self, sport: Sport) -> Result<EnrichmentIndex, EngineError> {
        let injuries: Vec<InjuryRow> = self.get_json("injuries", sport).await?;
        let news: Vec<NewsRow> = match self.get_json("news", sport).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(sport = %sport, error = %e, "News feed unavailable");
                Vec::new()
            }
        };
        let idx = build_index(injuries, news);
        debug!(sport = %sport, teams = idx.len(), "Enrichment loaded");
        Ok(idx)
    }
}
