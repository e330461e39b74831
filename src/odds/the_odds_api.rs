//! The Odds API client (v4).
//!
//! API: `https://api.the-odds-api.com/v4/sports/{sport_key}/odds`
//! Auth: `apiKey` query parameter.
//!
//! Only outcome name, price and point are consumed; everything else in the
//! payload is ignored.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use super::OddsSource;
use crate::types::{normalize_error_body, EngineError, GameQuotes, MarketKind, OddsQuote, QuoteSide, Sport};

const SOURCE_NAME: &str = "the-odds-api";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct ApiEvent {
    id: String,
    #[serde(default)]
    commence_time: Option<DateTime<Utc>>,
    home_team: String,
    away_team: String,
    #[serde(default)]
    bookmakers: Vec<ApiBookmaker>,
}

#[derive(Debug, Deserialize)]
struct ApiBookmaker {
    key: String,
    #[serde(default)]
    last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    markets: Vec<ApiMarket>,
}

#[derive(Debug, Deserialize)]
struct ApiMarket {
    key: String,
    #[serde(default)]
    last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    outcomes: Vec<ApiOutcome>,
}

#[derive(Debug, Deserialize)]
struct ApiOutcome {
    name: String,
    price: f64,
    #[serde(default)]
    point: Option<f64>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn market_kind(key: &str) -> Option<MarketKind> {
    match key {
        "h2h" => Some(MarketKind::Moneyline),
        "spreads" => Some(MarketKind::Spread),
        "totals" => Some(MarketKind::Total),
        _ => None,
    }
}

fn outcome_side(kind: MarketKind, name: &str, event: &ApiEvent) -> Option<QuoteSide> {
    match kind {
        MarketKind::Total => match name.to_lowercase().as_str() {
            "over" => Some(QuoteSide::Over),
            "under" => Some(QuoteSide::Under),
            _ => None,
        },
        _ if name == event.home_team => Some(QuoteSide::Home),
        _ if name == event.away_team => Some(QuoteSide::Away),
        _ => None,
    }
}

/// Flatten the API's event list into per-game quote bundles.
pub(crate) fn parse_events(sport: Sport, events: Vec<ApiEvent>, fetched_at: DateTime<Utc>) -> Vec<GameQuotes> {
    events
        .into_iter()
        .map(|event| {
            let mut quotes = Vec::new();
            for book in &event.bookmakers {
                for market in &book.markets {
                    let Some(kind) = market_kind(&market.key) else {
                        continue;
                    };
                    let captured_at = market.last_update.or(book.last_update).unwrap_or(fetched_at);
                    for outcome in &market.outcomes {
                        let Some(side) = outcome_side(kind, &outcome.name, &event) else {
                            debug!(game_id = %event.id, outcome = %outcome.name, "Unmatched outcome name");
                            continue;
                        };
                        quotes.push(OddsQuote {
                            bookmaker_id: book.key.clone(),
                            market: kind,
                            side,
                            price: outcome.price,
                            point: outcome.point,
                            captured_at,
                        });
                    }
                }
            }
            GameQuotes {
                game_id: event.id,
                sport,
                home_team: event.home_team,
                away_team: event.away_team,
                commence_time: event.commence_time,
                quotes,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct TheOddsApiClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl TheOddsApiClient {
    pub fn new(base_url: &str, api_key: SecretString, timeout_secs: u64) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("signal-engine/0.1.0")
            .build()
            .context("Failed to build odds HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn odds_url(&self, sport_key: &str) -> String {
        format!(
            "{}/sports/{}/odds/?apiKey={}&regions=us&markets=h2h,spreads,totals&oddsFormat=american",
            self.base_url,
            sport_key,
            urlencoding::encode(self.api_key.expose_secret()),
        )
    }
}

#[async_trait]
impl OddsSource for TheOddsApiClient {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch_games(&self, sport: Sport) -> Result<Vec<GameQuotes>, EngineError> {
        let sport_key = sport
            .odds_api_key()
            .ok_or_else(|| EngineError::upstream(SOURCE_NAME, format!("no sport key for {sport}")))?;

        let resp = self
            .http
            .get(self.odds_url(sport_key))
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

        let events: Vec<ApiEvent> = resp
            .json()
            .await
            .map_err(|e| EngineError::upstream(SOURCE_NAME, format!("invalid odds payload: {e}")))?;

        let games = parse_events(sport, events, Utc::now());
        debug!(sport = %sport, games = games.len(), "Odds fetched");
        Ok(games)
    }
}
