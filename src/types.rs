//! Shared types for the signal engine.
//!
//! These types form the data model used across all modules.
//! Odds, strategy, engine, and storage modules depend on them
//! without depending on each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Sport
// ---------------------------------------------------------------------------

/// Leagues the engine understands. Anything else is carried as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Nfl,
    Ncaaf,
    Nba,
    Ncaab,
    Nhl,
    Mlb,
    Other,
}

impl Sport {
    pub const ALL: &'static [Sport] = &[
        Sport::Nfl,
        Sport::Ncaaf,
        Sport::Nba,
        Sport::Ncaab,
        Sport::Nhl,
        Sport::Mlb,
    ];

    /// Short lowercase code used as the key in configuration tables.
    pub fn code(&self) -> &'static str {
        match self {
            Sport::Nfl => "nfl",
            Sport::Ncaaf => "ncaaf",
            Sport::Nba => "nba",
            Sport::Ncaab => "ncaab",
            Sport::Nhl => "nhl",
            Sport::Mlb => "mlb",
            Sport::Other => "other",
        }
    }

    /// Sport key used by the odds source.
    pub fn odds_api_key(&self) -> Option<&'static str> {
        match self {
            Sport::Nfl => Some("americanfootball_nfl"),
            Sport::Ncaaf => Some("americanfootball_ncaaf"),
            Sport::Nba => Some("basketball_nba"),
            Sport::Ncaab => Some("basketball_ncaab"),
            Sport::Nhl => Some("icehockey_nhl"),
            Sport::Mlb => Some("baseball_mlb"),
            Sport::Other => None,
        }
    }

    /// Football codes (pro and college).
    pub fn is_gridiron(&self) -> bool {
        matches!(self, Sport::Nfl | Sport::Ncaaf)
    }

    /// Basketball codes (pro and college).
    pub fn is_court(&self) -> bool {
        matches!(self, Sport::Nba | Sport::Ncaab)
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code().to_uppercase())
    }
}

/// Case-insensitive parse accepting league codes, common aliases, and
/// odds-source sport keys (`basketball_nba`).
impl std::str::FromStr for Sport {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let key = lower
            .trim_start_matches("americanfootball_")
            .trim_start_matches("basketball_")
            .trim_start_matches("icehockey_")
            .trim_start_matches("baseball_");
        match key {
            "nfl" => Ok(Sport::Nfl),
            "ncaaf" | "cfb" | "college football" => Ok(Sport::Ncaaf),
            "nba" => Ok(Sport::Nba),
            "ncaab" | "cbb" | "college basketball" => Ok(Sport::Ncaab),
            "nhl" | "hockey" => Ok(Sport::Nhl),
            "mlb" | "baseball" => Ok(Sport::Mlb),
            "other" => Ok(Sport::Other),
            _ => Err(anyhow::anyhow!("Unknown sport: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Odds
// ---------------------------------------------------------------------------

/// Market a bookmaker quote belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketKind {
    Moneyline,
    Spread,
    Total,
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketKind::Moneyline => write!(f, "moneyline"),
            MarketKind::Spread => write!(f, "spread"),
            MarketKind::Total => write!(f, "total"),
        }
    }
}

/// Which side of a market a quote prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSide {
    Home,
    Away,
    Over,
    Under,
}

/// A single bookmaker price, one fetch cycle's input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsQuote {
    pub bookmaker_id: String,
    pub market: MarketKind,
    pub side: QuoteSide,
    /// American odds.
    pub price: f64,
    /// Spread or total line; `None` for moneyline.
    pub point: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

/// All quotes for one game from one fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameQuotes {
    pub game_id: String,
    pub sport: Sport,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: Option<DateTime<Utc>>,
    pub quotes: Vec<OddsQuote>,
}

/// Best price for one side and the book offering it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookPrice {
    pub bookmaker_id: String,
    pub price: f64,
}

/// Vig-free probability pair. `home + away == 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoVigProbability {
    pub home: f64,
    pub away: f64,
}

/// Per-game aggregate over all valid bookmaker quotes.
///
/// Numeric fields are `None` when the market had no valid quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusLine {
    pub game_id: String,
    pub sport: Sport,
    pub home_team: String,
    pub away_team: String,
    pub home_ml_avg: Option<f64>,
    pub home_ml_best: Option<BookPrice>,
    pub away_ml_avg: Option<f64>,
    pub away_ml_best: Option<BookPrice>,
    /// Home-team spread, averaged.
    pub spread_avg: Option<f64>,
    pub total_avg: Option<f64>,
    pub no_vig_probability: Option<NoVigProbability>,
    pub bookmaker_count: usize,
    pub captured_at: DateTime<Utc>,
}

impl fmt::Display for ConsensusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmt_opt = |v: Option<f64>| match v {
            Some(x) => format!("{x:+.1}"),
            None => "n/a".to_string(),
        };
        write!(
            f,
            "[{}] {} @ {} ML {}/{} spread {} total {} ({} books)",
            self.sport,
            self.away_team,
            self.home_team,
            fmt_opt(self.away_ml_avg),
            fmt_opt(self.home_ml_avg),
            fmt_opt(self.spread_avg),
            self.total_avg.map(|t| format!("{t:.1}")).unwrap_or_else(|| "n/a".into()),
            self.bookmaker_count,
        )
    }
}

impl ConsensusLine {
    /// Whether `team` names the home side (case-insensitive).
    pub fn is_home(&self, team: &str) -> Option<bool> {
        if team.eq_ignore_ascii_case(&self.home_team) {
            Some(true)
        } else if team.eq_ignore_ascii_case(&self.away_team) {
            Some(false)
        } else {
            None
        }
    }

    /// No-vig probability for the named team.
    pub fn no_vig_for(&self, team: &str) -> Option<f64> {
        let nv = self.no_vig_probability?;
        self.is_home(team).map(|home| if home { nv.home } else { nv.away })
    }
}

/// A consensus line retained for later comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSnapshot {
    pub captured_at: DateTime<Utc>,
    pub line: ConsensusLine,
}

impl LineSnapshot {
    pub fn new(line: ConsensusLine) -> Self {
        Self { captured_at: line.captured_at, line }
    }
}

// ---------------------------------------------------------------------------
// Picks & tiers
// ---------------------------------------------------------------------------

/// Distribution class for a pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Elite,
    Premium,
    Free,
}

impl Tier {
    pub const ALL: &'static [Tier] = &[Tier::Elite, Tier::Premium, Tier::Free];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Elite => "elite",
            Tier::Premium => "premium",
            Tier::Free => "free",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An upstream-scored pick. Only `tier` is mutated by this engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    #[serde(alias = "gameId")]
    pub game_id: String,
    pub sport: String,
    #[serde(alias = "pick")]
    pub selection: String,
    #[serde(default, alias = "pickType")]
    pub pick_type: String,
    /// 0–100.
    pub confidence: f64,
    #[serde(default)]
    pub edge: f64,
    #[serde(default, alias = "expectedValue")]
    pub expected_value: f64,
    #[serde(default, alias = "oddsAtPick", alias = "odds")]
    pub odds_at_pick: Option<f64>,
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default, alias = "compositeScore")]
    pub composite_score: Option<f64>,
}

impl fmt::Display for Pick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}) conf={:.0} edge={:.1}",
            self.sport, self.selection, self.game_id, self.confidence, self.edge,
        )
    }
}

impl Pick {
    /// Ranking value: the explicit composite score, else `edge×2.5 + confidence`.
    pub fn sort_score(&self) -> f64 {
        self.composite_score
            .unwrap_or(self.edge * 2.5 + self.confidence)
    }

    /// Whether two picks back the same side of the same game.
    pub fn agrees_with(&self, other: &Pick) -> bool {
        self.game_id == other.game_id
            && self.selection.trim().eq_ignore_ascii_case(other.selection.trim())
    }

    /// Helper to build a test pick with sensible defaults.
    #[cfg(test)]
    pub fn sample(game_id: &str, selection: &str, confidence: f64) -> Self {
        Pick {
            game_id: game_id.to_string(),
            sport: "NFL".to_string(),
            selection: selection.to_string(),
            pick_type: "moneyline".to_string(),
            confidence,
            edge: 0.0,
            expected_value: 0.0,
            odds_at_pick: None,
            tier: None,
            composite_score: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Contract side on the prediction market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "yes",
            Side::No => "no",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

impl std::str::FromStr for Side {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yes" => Ok(Side::Yes),
            "no" => Ok(Side::No),
            _ => Err(anyhow::anyhow!("Unknown side: {s}")),
        }
    }
}

/// Terminal outcome of a wager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetResult {
    Win,
    Loss,
    Cancelled,
}

impl BetResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetResult::Win => "win",
            BetResult::Loss => "loss",
            BetResult::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BetResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BetResult {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "win" => Ok(BetResult::Win),
            "loss" => Ok(BetResult::Loss),
            "cancelled" | "canceled" => Ok(BetResult::Cancelled),
            _ => Err(anyhow::anyhow!("Unknown bet result: {s}")),
        }
    }
}

/// A wager placed on the prediction market.
///
/// Created externally with `result == None`; moved to a terminal result
/// exactly once by the settlement reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetLedgerRow {
    pub id: i64,
    pub ticker: Option<String>,
    pub side: Side,
    pub contracts: i64,
    pub stake_cents: i64,
    pub result: Option<BetResult>,
    pub payout_cents: Option<i64>,
    pub profit_cents: Option<i64>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl fmt::Display for BetLedgerRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {} x{} stake={}¢ result={}",
            self.id,
            self.ticker.as_deref().unwrap_or("-"),
            self.side,
            self.contracts,
            self.stake_cents,
            self.result.map(|r| r.as_str()).unwrap_or("pending"),
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Error taxonomy for the engine.
///
/// Everything except `Configuration` is caught at the narrowest scope and
/// downgraded to "skip and continue".
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Upstream fetch failed ({source_name}): {message}")]
    UpstreamFetch { source_name: String, message: String },

    #[error("Malformed quote from {bookmaker}: {reason}")]
    MalformedQuote { bookmaker: String, reason: String },

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Webhook rejected {tier} batch (HTTP {status}): {message}")]
    WebhookRejection { tier: String, status: u16, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Only configuration errors halt a job.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Configuration(_))
    }

    pub fn upstream(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::UpstreamFetch {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

/// Collapse a loosely structured upstream error body into one message.
///
/// Understands `{"error": {"message": ..}}`, `{"error": ".."}`,
/// `{"message": ..}` and `{"errors": [..]}`; falls back to the raw text.
pub fn normalize_error_body(status: u16, body: &str) -> String {
    let trimmed = body.trim();
    let detail = serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|v| extract_error_message(&v));

    match detail {
        Some(msg) => format!("HTTP {status}: {msg}"),
        None if trimmed.is_empty() => format!("HTTP {status}"),
        None => {
            let snippet: String = trimmed.chars().take(200).collect();
            format!("HTTP {status}: {snippet}")
        }
    }
}

fn extract_error_message(v: &serde_json::Value) -> Option<String> {
    if let Some(err) = v.get("error") {
        if let Some(s) = err.as_str() {
            return Some(s.to_string());
        }
        if let Some(s) = err.get("message").and_then(|m| m.as_str()) {
            return Some(s.to_string());
        }
    }
    if let Some(s) = v.get("message").and_then(|m| m.as_str()) {
        return Some(s.to_string());
    }
    if let Some(errors) = v.get("errors").and_then(|e| e.as_array()) {
        let parts: Vec<String> = errors
            .iter()
            .map(|e| match e.as_str() {
                Some(s) => s.to_string(),
                None => e
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(String::from)
                    .unwrap_or_else(|| e.to_string()),
            })
            .collect();
        if !parts.is_empty() {
            return Some(parts.join("; "));
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
