//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys, private keys, shared credentials) are referenced by
//! env-var name in the config and resolved at runtime.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

use crate::odds::consensus::DevigMethod;
use crate::types::EngineError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub odds: OddsConfig,
    pub line_movement: LineMovementConfig,
    pub teaser: TeaserConfig,
    pub tiers: TierConfig,
    pub syndication: SyndicationConfig,
    pub settlement: SettlementConfig,
    pub ledger: LedgerConfig,
    pub trigger: TriggerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding pick artifacts and line snapshots.
    pub data_dir: String,
    pub dry_run: bool,
    /// Prefix for syndication run ids (`{prefix}-{date}`).
    pub run_id_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            dry_run: false,
            run_id_prefix: "signals".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OddsConfig {
    pub base_url: String,
    pub api_key_env: String,
    /// League codes (`nfl`, `nba`, ...).
    pub sports: Vec<String>,
    pub timeout_secs: u64,
    pub max_bookmakers: usize,
    /// Optional injury/news feed base URL.
    pub enrichment_url: Option<String>,
    /// Quotes older than this are ignored; `0` disables the check.
    pub max_quote_age_secs: u64,
    pub devig: DevigMethod,
}

impl Default for OddsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.the-odds-api.com/v4".to_string(),
            api_key_env: "ODDS_API_KEY".to_string(),
            sports: vec!["nfl".into(), "nba".into(), "nhl".into(), "mlb".into()],
            timeout_secs: 10,
            max_bookmakers: 5,
            enrichment_url: None,
            max_quote_age_secs: 600,
            devig: DevigMethod::Proportional,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LineMovementConfig {
    /// Minimum spread move, in points, to count as significant.
    pub spread_points: f64,
    /// Minimum implied-probability shift (0.03 = 3%).
    pub probability_shift: f64,
    /// Number of opportunities rendered as summaries.
    pub top_n: usize,
    /// Minimum cross-book arbitrage profit percentage.
    pub cross_book_min_profit_pct: f64,
}

impl Default for LineMovementConfig {
    fn default() -> Self {
        Self {
            spread_points: 1.5,
            probability_shift: 0.03,
            top_n: 5,
            cross_book_min_profit_pct: 0.5,
        }
    }
}

/// Teaser tables. Keys are sport codes, inner keys teaser points as text
/// (`"6"`, `"6.5"`).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TeaserConfig {
    pub base_rates: HashMap<String, HashMap<String, f64>>,
    pub key_numbers: HashMap<String, Vec<f64>>,
    pub key_number_bonus: f64,
    pub pick_em_bonus: f64,
    pub max_leg_rate: f64,
    pub same_game_deflation: f64,
}

impl Default for TeaserConfig {
    fn default() -> Self {
        let table = |pairs: &[(&str, f64)]| -> HashMap<String, f64> {
            pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
        };
        let gridiron = table(&[("6", 0.725), ("6.5", 0.74), ("7", 0.755), ("10", 0.80)]);
        let court = table(&[("4", 0.67), ("4.5", 0.685), ("5", 0.70)]);

        let mut base_rates = HashMap::new();
        base_rates.insert("nfl".to_string(), gridiron.clone());
        base_rates.insert("ncaaf".to_string(), gridiron);
        base_rates.insert("nba".to_string(), court.clone());
        base_rates.insert("ncaab".to_string(), court);

        let mut key_numbers = HashMap::new();
        key_numbers.insert("nfl".to_string(), vec![3.0, 7.0, 10.0, 14.0]);
        key_numbers.insert("ncaaf".to_string(), vec![3.0, 7.0, 10.0, 14.0]);
        key_numbers.insert("nba".to_string(), Vec::new());
        key_numbers.insert("ncaab".to_string(), Vec::new());

        Self {
            base_rates,
            key_numbers,
            key_number_bonus: 0.025,
            pick_em_bonus: 0.015,
            max_leg_rate: 0.80,
            same_game_deflation: 0.95,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TierConfig {
    pub elite_min_confidence: f64,
    pub premium_min_confidence: f64,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            elite_min_confidence: 80.0,
            premium_min_confidence: 65.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SyndicationConfig {
    pub webhook_url_env: String,
    pub source: String,
    pub timeout_secs: u64,
}

impl Default for SyndicationConfig {
    fn default() -> Self {
        Self {
            webhook_url_env: "SYNDICATION_WEBHOOK_URL".to_string(),
            source: "signal-engine".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SettlementConfig {
    pub base_url: String,
    pub key_id_env: String,
    pub private_key_env: String,
    pub inter_call_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.elections.kalshi.com/trade-api/v2".to_string(),
            key_id_env: "KALSHI_API_KEY_ID".to_string(),
            private_key_env: "KALSHI_PRIVATE_KEY".to_string(),
            inter_call_delay_ms: 250,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LedgerConfig {
    pub database_url: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:data/ledger.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TriggerConfig {
    pub port: u16,
    pub credential_env: String,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            port: 8787,
            credential_env: "ENGINE_TRIGGER_SECRET".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text. Missing sections take defaults.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve a required secret, failing with a configuration error when
    /// the variable is unset or blank.
    pub fn require_secret(env_name: &str) -> Result<SecretString, EngineError> {
        match std::env::var(env_name) {
            Ok(v) if !v.trim().is_empty() => Ok(SecretString::new(v)),
            _ => Err(EngineError::Configuration(format!(
                "required environment variable {env_name} is not set"
            ))),
        }
    }

    pub fn odds_api_key(&self) -> Result<SecretString, EngineError> {
        Self::require_secret(&self.odds.api_key_env)
    }

    pub fn webhook_url(&self) -> Result<String, EngineError> {
        use secrecy::ExposeSecret;
        Self::require_secret(&self.syndication.webhook_url_env).map(|s| s.expose_secret().clone())
    }

    pub fn settlement_key_id(&self) -> Result<String, EngineError> {
        use secrecy::ExposeSecret;
        Self::require_secret(&self.settlement.key_id_env).map(|s| s.expose_secret().clone())
    }

    pub fn settlement_private_key(&self) -> Result<SecretString, EngineError> {
        Self::require_secret(&self.settlement.private_key_env)
    }

    pub fn trigger_credential(&self) -> Result<SecretString, EngineError> {
        Self::require_secret(&self.trigger.credential_env)
    }
}
