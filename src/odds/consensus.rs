//! Consensus line builder.
//!
//! Pure transform from one game's raw bookmaker quotes to a
//! [`ConsensusLine`]: averaged moneylines/spread/total, best price per
//! side, and the vig-free probability pair. Malformed or stale quotes are
//! skipped individually; they never void the whole consensus.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{
    BookPrice, ConsensusLine, EngineError, GameQuotes, MarketKind, NoVigProbability, OddsQuote,
    QuoteSide,
};

/// Smallest magnitude a real American price can have.
const MIN_ABS_PRICE: f64 = 100.0;
/// Anything beyond this is a feed error, not a price.
const MAX_ABS_PRICE: f64 = 10_000.0;
/// Spreads beyond this many points are treated as feed errors.
const MAX_ABS_SPREAD: f64 = 30.0;
const MAX_TOTAL: f64 = 400.0;

// ---------------------------------------------------------------------------
// Probability conversions
// ---------------------------------------------------------------------------

/// Implied probability of an American price.
pub fn american_to_implied(odds: f64) -> f64 {
    if odds > 0.0 {
        100.0 / (odds + 100.0)
    } else {
        odds.abs() / (odds.abs() + 100.0)
    }
}

/// Inverse of [`american_to_implied`]. Probabilities are clamped to
/// `(0, 1)` exclusive so the result is always finite.
pub fn implied_to_american(probability: f64) -> f64 {
    let p = probability.clamp(1e-6, 1.0 - 1e-6);
    if p >= 0.5 {
        -(p / (1.0 - p)) * 100.0
    } else {
        ((1.0 - p) / p) * 100.0
    }
}

/// Remove the house margin by normalising both sides to sum to one.
pub fn no_vig(home_implied: f64, away_implied: f64) -> Option<NoVigProbability> {
    let sum = home_implied + away_implied;
    if !sum.is_finite() || sum <= 0.0 {
        return None;
    }
    Some(NoVigProbability {
        home: home_implied / sum,
        away: away_implied / sum,
    })
}

/// No-vig pair straight from two American prices.
pub fn no_vig_from_american(home_odds: f64, away_odds: f64) -> Option<NoVigProbability> {
    no_vig(american_to_implied(home_odds), american_to_implied(away_odds))
}

const SHIN_EPS: f64 = 1e-9;

/// Fixed point of `p = implied - z * sqrt(p * (1 - p))`.
fn shin_true_probability(implied: f64, z: f64) -> f64 {
    let mut p = implied.clamp(SHIN_EPS, 1.0 - SHIN_EPS);
    for _ in 0..25 {
        let next = (implied - z * (p * (1.0 - p)).sqrt()).clamp(SHIN_EPS, 1.0 - SHIN_EPS);
        if (next - p).abs() < SHIN_EPS {
            return next;
        }
        p = next;
    }
    p
}

/// Shin's method: finds the insider share `z` (bisection on `[0, 2]`) at
/// which both sides' true probabilities sum to one.
pub fn shin_no_vig(home_implied: f64, away_implied: f64) -> Option<NoVigProbability> {
    let sum = home_implied + away_implied;
    if !sum.is_finite() || sum <= 0.0 {
        return None;
    }

    let (mut lo, mut hi) = (0.0_f64, 2.0_f64);
    for _ in 0..40 {
        let z = (lo + hi) / 2.0;
        let total = shin_true_probability(home_implied, z) + shin_true_probability(away_implied, z);
        if (total - 1.0).abs() < SHIN_EPS {
            lo = z;
            hi = z;
            break;
        }
        if total > 1.0 {
            lo = z;
        } else {
            hi = z;
        }
    }
    let z = (lo + hi) / 2.0;
    no_vig(
        shin_true_probability(home_implied, z),
        shin_true_probability(away_implied, z),
    )
}

/// How the house margin is removed from a two-way market.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevigMethod {
    #[default]
    Proportional,
    Shin,
}

impl DevigMethod {
    pub fn apply(self, home_implied: f64, away_implied: f64) -> Option<NoVigProbability> {
        match self {
            DevigMethod::Proportional => no_vig(home_implied, away_implied),
            DevigMethod::Shin => shin_no_vig(home_implied, away_implied),
        }
    }
}

/// Whether a quote is older than `max_age` at `now`.
pub fn is_stale(quote: &OddsQuote, max_age: Option<Duration>, now: DateTime<Utc>) -> bool {
    max_age.is_some_and(|age| now - quote.captured_at > age)
}

/// `0` disables the age check.
pub fn quote_age_limit(max_age_secs: u64) -> Option<Duration> {
    (max_age_secs > 0).then(|| Duration::seconds(max_age_secs as i64))
}

/// Reject quotes no sane book would post.
pub fn validate_quote(quote: &OddsQuote) -> Result<(), EngineError> {
    let malformed = |reason: String| EngineError::MalformedQuote {
        bookmaker: quote.bookmaker_id.clone(),
        reason,
    };

    if !quote.price.is_finite() {
        return Err(malformed("non-finite price".into()));
    }
    let abs = quote.price.abs();
    if abs < MIN_ABS_PRICE {
        return Err(malformed(format!("price {} inside (-100, 100)", quote.price)));
    }
    if abs > MAX_ABS_PRICE {
        return Err(malformed(format!("price {} beyond ±{MAX_ABS_PRICE}", quote.price)));
    }

    match quote.market {
        MarketKind::Moneyline => Ok(()),
        MarketKind::Spread => match quote.point {
            Some(p) if p.is_finite() && p.abs() <= MAX_ABS_SPREAD => Ok(()),
            Some(p) => Err(malformed(format!("spread {p} out of range"))),
            None => Err(malformed("spread quote without a point".into())),
        },
        MarketKind::Total => match quote.point {
            Some(p) if p.is_finite() && p > 0.0 && p <= MAX_TOTAL => Ok(()),
            Some(p) => Err(malformed(format!("total {p} out of range"))),
            None => Err(malformed("total quote without a point".into())),
        },
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds consensus lines from raw quotes.
#[derive(Debug, Clone)]
pub struct ConsensusBuilder {
    max_bookmakers: usize,
    devig: DevigMethod,
    max_quote_age: Option<Duration>,
}

impl Default for ConsensusBuilder {
    fn default() -> Self {
        Self {
            max_bookmakers: 5,
            devig: DevigMethod::default(),
            max_quote_age: None,
        }
    }
}

#[derive(Default)]
struct SideAccumulator {
    implied_sum: f64,
    count: usize,
    best: Option<BookPrice>,
}

impl SideAccumulator {
    fn push(&mut self, quote: &OddsQuote) {
        self.implied_sum += american_to_implied(quote.price);
        self.count += 1;
        // Higher signed American odds always pay more
        let better = self.best.as_ref().map_or(true, |b| quote.price > b.price);
        if better {
            self.best = Some(BookPrice {
                bookmaker_id: quote.bookmaker_id.clone(),
                price: quote.price,
            });
        }
    }

    fn avg_implied(&self) -> Option<f64> {
        (self.count > 0).then(|| self.implied_sum / self.count as f64)
    }
}

fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

impl ConsensusBuilder {
    pub fn new(max_bookmakers: usize) -> Self {
        Self {
            max_bookmakers: max_bookmakers.max(1),
            ..Self::default()
        }
    }

    pub fn with_devig(mut self, devig: DevigMethod) -> Self {
        self.devig = devig;
        self
    }

    /// Ignore quotes older than `secs`; `0` keeps every quote.
    pub fn with_max_quote_age(mut self, secs: u64) -> Self {
        self.max_quote_age = quote_age_limit(secs);
        self
    }

    /// Aggregate one game's quotes as of now.
    pub fn build(&self, game: &GameQuotes) -> ConsensusLine {
        self.build_at(game, Utc::now())
    }

    /// Aggregate one game's quotes.
    ///
    /// Only the first `max_bookmakers` distinct books in arrival order that
    /// have at least one valid, fresh quote contribute.
    pub fn build_at(&self, game: &GameQuotes, now: DateTime<Utc>) -> ConsensusLine {
        let mut skipped = 0usize;
        let mut usable: Vec<&OddsQuote> = Vec::with_capacity(game.quotes.len());
        for quote in &game.quotes {
            if let Err(e) = validate_quote(quote) {
                debug!(game_id = %game.game_id, error = %e, "Skipping malformed quote");
                skipped += 1;
            } else if is_stale(quote, self.max_quote_age, now) {
                debug!(game_id = %game.game_id, bookmaker = %quote.bookmaker_id, "Skipping stale quote");
                skipped += 1;
            } else {
                usable.push(quote);
            }
        }

        let mut books: Vec<&str> = Vec::new();
        for q in &usable {
            if !books.contains(&q.bookmaker_id.as_str()) {
                books.push(q.bookmaker_id.as_str());
            }
        }
        books.truncate(self.max_bookmakers);
        let allowed: HashSet<&str> = books.into_iter().collect();

        let mut home = SideAccumulator::default();
        let mut away = SideAccumulator::default();
        let mut spreads: Vec<f64> = Vec::new();
        let mut totals: Vec<f64> = Vec::new();
        let mut contributing: HashSet<&str> = HashSet::new();

        for quote in usable
            .into_iter()
            .filter(|q| allowed.contains(q.bookmaker_id.as_str()))
        {
            contributing.insert(quote.bookmaker_id.as_str());

            match (quote.market, quote.side) {
                (MarketKind::Moneyline, QuoteSide::Home) => home.push(quote),
                (MarketKind::Moneyline, QuoteSide::Away) => away.push(quote),
                (MarketKind::Spread, QuoteSide::Home) => spreads.extend(quote.point),
                (MarketKind::Spread, QuoteSide::Away) => spreads.extend(quote.point.map(|p| -p)),
                (MarketKind::Total, QuoteSide::Over | QuoteSide::Under) => {
                    totals.extend(quote.point)
                }
                _ => {
                    skipped += 1;
                }
            }
        }

        let home_implied = home.avg_implied();
        let away_implied = away.avg_implied();
        let no_vig_probability = match (home_implied, away_implied) {
            (Some(h), Some(a)) => self.devig.apply(h, a),
            _ => None,
        };

        let captured_at = game
            .quotes
            .iter()
            .map(|q| q.captured_at)
            .max()
            .unwrap_or(now);

        if skipped > 0 {
            debug!(game_id = %game.game_id, skipped, "Quotes skipped during consensus");
        }

        ConsensusLine {
            game_id: game.game_id.clone(),
            sport: game.sport,
            home_team: game.home_team.clone(),
            away_team: game.away_team.clone(),
            home_ml_avg: home_implied.map(implied_to_american),
            home_ml_best: home.best,
            away_ml_avg: away_implied.map(implied_to_american),
            away_ml_best: away.best,
            spread_avg: average(&spreads),
            total_avg: average(&totals),
            no_vig_probability,
            bookmaker_count: contributing.len(),
            captured_at,
        }
    }

    /// Build consensus for a whole slate.
    pub fn build_all(&self, games: &[GameQuotes]) -> Vec<ConsensusLine> {
        let now = Utc::now();
        games.iter().map(|g| self.build_at(g, now)).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
