//! Cross-book arbitrage.
//!
//! Takes the best price per side of a market across books. When the two
//! best prices come from different books and their implied probabilities
//! sum below one, backing both sides locks in a profit. Stale quotes never
//! take part.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::odds::consensus::{american_to_implied, is_stale, quote_age_limit, validate_quote};
use crate::types::{GameQuotes, MarketKind, OddsQuote, QuoteSide};

/// Rounding slack on the probability sum.
const PROBABILITY_TOLERANCE: f64 = 0.001;
/// Stale-price slack added on top of the configured minimum profit.
const PRICE_TOLERANCE_PCT: f64 = 0.5;
/// Notional total stake the leg stakes are quoted against.
const TOTAL_STAKE: f64 = 1000.0;
/// Share of the minimum profit that must survive stake rounding.
const ROUNDED_PROFIT_FLOOR: f64 = 0.98;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbLeg {
    pub bookmaker_id: String,
    pub side: QuoteSide,
    pub price: f64,
    pub point: Option<f64>,
    pub stake: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossBookArb {
    pub game_id: String,
    pub market: MarketKind,
    pub legs: [ArbLeg; 2],
    pub total_stake: f64,
    /// `(1 - Σ implied) × 100`.
    pub profit_pct: f64,
    /// Worst-case return minus total stake, after rounding stakes to cents.
    pub guaranteed_profit: f64,
    /// Age of the older leg's quote when the arb was found.
    pub quote_age_secs: i64,
}

/// Decimal payout multiplier (stake included).
fn decimal_odds(american: f64) -> f64 {
    if american > 0.0 {
        american / 100.0 + 1.0
    } else {
        100.0 / american.abs() + 1.0
    }
}

fn best_by_side<'a>(quotes: impl Iterator<Item = &'a OddsQuote>) -> HashMap<QuoteSide, &'a OddsQuote> {
    let mut best: HashMap<QuoteSide, &OddsQuote> = HashMap::new();
    for q in quotes {
        best.entry(q.side)
            .and_modify(|held| {
                if q.price > held.price {
                    *held = q;
                }
            })
            .or_insert(q);
    }
    best
}

/// Point key for grouping spread/total quotes that price the same line.
/// Spreads are keyed on the home number so opposite sides line up.
fn line_key(q: &OddsQuote) -> Option<i64> {
    let p = q.point?;
    let home_number = match (q.market, q.side) {
        (MarketKind::Spread, QuoteSide::Away) => -p,
        _ => p,
    };
    Some((home_number * 10.0).round() as i64)
}

/// Whether the rounded-stake profit still clears the configured minimum.
fn rounded_profit_clears(guaranteed_profit: f64, min_profit_pct: f64) -> bool {
    guaranteed_profit >= min_profit_pct * TOTAL_STAKE / 100.0 * ROUNDED_PROFIT_FLOOR
}

pub struct CrossBookScanner {
    min_profit_pct: f64,
    max_quote_age: Option<Duration>,
}

impl CrossBookScanner {
    pub fn new(min_profit_pct: f64) -> Self {
        Self {
            min_profit_pct,
            max_quote_age: None,
        }
    }

    /// Ignore quotes older than `secs`; `0` keeps every quote.
    pub fn with_max_quote_age(mut self, secs: u64) -> Self {
        self.max_quote_age = quote_age_limit(secs);
        self
    }

    /// Every arbitrage across all markets of one game as of now, best first.
    pub fn scan(&self, game: &GameQuotes) -> Vec<CrossBookArb> {
        self.scan_at(game, Utc::now())
    }

    pub fn scan_at(&self, game: &GameQuotes, now: DateTime<Utc>) -> Vec<CrossBookArb> {
        let valid: Vec<&OddsQuote> = game
            .quotes
            .iter()
            .filter(|q| validate_quote(q).is_ok() && !is_stale(q, self.max_quote_age, now))
            .collect();

        let mut found = Vec::new();

        let moneyline = best_by_side(valid.iter().copied().filter(|q| q.market == MarketKind::Moneyline));
        if let Some(arb) = self.evaluate(game, MarketKind::Moneyline, &moneyline, QuoteSide::Home, QuoteSide::Away, now) {
            found.push(arb);
        }

        for (market, a, b) in [
            (MarketKind::Spread, QuoteSide::Home, QuoteSide::Away),
            (MarketKind::Total, QuoteSide::Over, QuoteSide::Under),
        ] {
            let mut by_line: HashMap<i64, Vec<&OddsQuote>> = HashMap::new();
            for q in valid.iter().copied().filter(|q| q.market == market) {
                if let Some(key) = line_key(q) {
                    by_line.entry(key).or_default().push(q);
                }
            }
            for quotes in by_line.values() {
                let best = best_by_side(quotes.iter().copied());
                if let Some(arb) = self.evaluate(game, market, &best, a, b, now) {
                    found.push(arb);
                }
            }
        }

        found.sort_by(|x, y| {
            y.profit_pct
                .partial_cmp(&x.profit_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        found
    }

    pub fn scan_all(&self, games: &[GameQuotes]) -> Vec<CrossBookArb> {
        let now = Utc::now();
        let mut all: Vec<CrossBookArb> = games.iter().flat_map(|g| self.scan_at(g, now)).collect();
        all.sort_by(|x, y| {
            y.profit_pct
                .partial_cmp(&x.profit_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        all
    }

    fn evaluate(
        &self,
        game: &GameQuotes,
        market: MarketKind,
        best: &HashMap<QuoteSide, &OddsQuote>,
        side_a: QuoteSide,
        side_b: QuoteSide,
        now: DateTime<Utc>,
    ) -> Option<CrossBookArb> {
        let a = *best.get(&side_a)?;
        let b = *best.get(&side_b)?;
        if a.bookmaker_id == b.bookmaker_id {
            return None;
        }

        let pa = american_to_implied(a.price);
        let pb = american_to_implied(b.price);
        let sum = pa + pb;
        if sum >= 1.0 - PROBABILITY_TOLERANCE {
            return None;
        }

        let profit_pct = (1.0 - sum) * 100.0;
        if profit_pct < self.min_profit_pct + PRICE_TOLERANCE_PCT {
            debug!(game_id = %game.game_id, market = %market, profit_pct, "Arb below minimum profit");
            return None;
        }

        let stake_a = ((TOTAL_STAKE * pa / sum) * 100.0).round() / 100.0;
        let stake_b = ((TOTAL_STAKE * pb / sum) * 100.0).round() / 100.0;
        let min_return = (stake_a * decimal_odds(a.price)).min(stake_b * decimal_odds(b.price));
        let guaranteed_profit = min_return - (stake_a + stake_b);
        if !rounded_profit_clears(guaranteed_profit, self.min_profit_pct) {
            debug!(game_id = %game.game_id, market = %market, guaranteed_profit, "Arb lost to stake rounding");
            return None;
        }
        let oldest = a.captured_at.min(b.captured_at);

        Some(CrossBookArb {
            game_id: game.game_id.clone(),
            market,
            legs: [
                ArbLeg {
                    bookmaker_id: a.bookmaker_id.clone(),
                    side: a.side,
                    price: a.price,
                    point: a.point,
                    stake: stake_a,
                },
                ArbLeg {
                    bookmaker_id: b.bookmaker_id.clone(),
                    side: b.side,
                    price: b.price,
                    point: b.point,
                    stake: stake_b,
                },
            ],
            total_stake: stake_a + stake_b,
            profit_pct,
            guaranteed_profit,
            quote_age_secs: (now - oldest).num_seconds().max(0),
        })
    }
}
