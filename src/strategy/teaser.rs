//! Teaser cover-rate and EV calculator.
//!
//! Each leg's spread is shifted toward the bettor by the teaser points.
//! A leg's cover rate starts from an empirical base rate for
//! (sport, points) and is bumped for every key number crossed and for
//! landing near pick-em. Legs are averaged into one adjusted rate that is
//! raised to the leg count.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::TeaserConfig;
use crate::odds::consensus::{american_to_implied, implied_to_american};
use crate::types::Sport;

const PICK_EM_WINDOW: f64 = 1.0;
const STRONG_PLAY_EV: f64 = 10.0;
const PLAY_EV: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TeaserError {
    #[error("teaser has no legs")]
    NoLegs,
    #[error("no base cover rate for {sport} at {points} points")]
    UnsupportedPoints { sport: Sport, points: String },
    #[error("original odds {0} are not a valid American price")]
    InvalidOdds(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeaserLeg {
    pub team: String,
    pub original_spread: f64,
    pub sport: Sport,
    /// Set when two legs may come from the same game.
    #[serde(default)]
    pub game_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeaserBet {
    pub legs: Vec<TeaserLeg>,
    pub teaser_points: f64,
    /// Quoted American price for the whole teaser.
    pub original_odds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongPlay,
    Play,
    Avoid,
}

impl Recommendation {
    pub fn from_ev(ev: f64) -> Self {
        if ev > STRONG_PLAY_EV {
            Recommendation::StrongPlay
        } else if ev > PLAY_EV {
            Recommendation::Play
        } else {
            Recommendation::Avoid
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegEvaluation {
    pub team: String,
    pub original_spread: f64,
    pub teaser_spread: f64,
    pub key_numbers_crossed: Vec<f64>,
    pub near_pick_em: bool,
    pub adjusted_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeaserEvaluation {
    pub legs: Vec<LegEvaluation>,
    pub teaser_points: f64,
    pub original_odds: f64,
    pub implied_win_rate: f64,
    pub combined_probability: f64,
    pub fair_odds: f64,
    /// Percent.
    pub ev: f64,
    pub recommendation: Recommendation,
    pub same_game: bool,
}

/// Table key for a points value: `6` → "6", `6.5` → "6.5".
pub fn points_key(points: f64) -> String {
    if points.fract() == 0.0 {
        format!("{points:.0}")
    } else {
        format!("{points}")
    }
}

/// Whether moving a spread from `original` to `teased` crosses `key`.
///
/// A bet at spread `s` wins on margins `m > -s`, so teasing newly covers
/// margins in `(-teased, -original]`. The key counts when either `key` or
/// `-key` falls in that window.
pub fn crosses_key(original: f64, teased: f64, key: f64) -> bool {
    let lo = -teased;
    let hi = -original;
    [key, -key].iter().any(|&m| m > lo && m <= hi)
}

/// Every leg crosses both 3 and 7.
pub fn is_double_key_teaser(legs: &[TeaserLeg], teaser_points: f64) -> bool {
    !legs.is_empty()
        && legs.iter().all(|leg| {
            let teased = leg.original_spread + teaser_points;
            crosses_key(leg.original_spread, teased, 3.0) && crosses_key(leg.original_spread, teased, 7.0)
        })
}

pub struct TeaserCalculator {
    config: TeaserConfig,
}

impl TeaserCalculator {
    pub fn new(config: TeaserConfig) -> Self {
        Self { config }
    }

    fn base_rate(&self, sport: Sport, points: f64) -> Result<f64, TeaserError> {
        let key = points_key(points);
        self.config
            .base_rates
            .get(sport.code())
            .and_then(|table| table.get(&key))
            .copied()
            .ok_or(TeaserError::UnsupportedPoints { sport, points: key })
    }

    fn key_numbers(&self, sport: Sport) -> &[f64] {
        self.config
            .key_numbers
            .get(sport.code())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn evaluate_leg(&self, leg: &TeaserLeg, teaser_points: f64) -> Result<LegEvaluation, TeaserError> {
        let base = self.base_rate(leg.sport, teaser_points)?;
        let teased = leg.original_spread + teaser_points;

        let crossed: Vec<f64> = self
            .key_numbers(leg.sport)
            .iter()
            .copied()
            .filter(|&k| crosses_key(leg.original_spread, teased, k))
            .collect();
        let near_pick_em = teased.abs() <= PICK_EM_WINDOW;

        let mut rate = base + crossed.len() as f64 * self.config.key_number_bonus;
        if near_pick_em {
            rate += self.config.pick_em_bonus;
        }

        Ok(LegEvaluation {
            team: leg.team.clone(),
            original_spread: leg.original_spread,
            teaser_spread: teased,
            key_numbers_crossed: crossed,
            near_pick_em,
            adjusted_rate: rate.min(self.config.max_leg_rate),
        })
    }

    pub fn evaluate(&self, bet: &TeaserBet) -> Result<TeaserEvaluation, TeaserError> {
        if bet.legs.is_empty() {
            return Err(TeaserError::NoLegs);
        }
        let implied = american_to_implied(bet.original_odds);
        if !bet.original_odds.is_finite() || bet.original_odds.abs() < 100.0 || implied <= 0.0 {
            return Err(TeaserError::InvalidOdds(bet.original_odds));
        }

        let legs = bet
            .legs
            .iter()
            .map(|leg| self.evaluate_leg(leg, bet.teaser_points))
            .collect::<Result<Vec<_>, _>>()?;

        let adjusted = legs.iter().map(|l| l.adjusted_rate).sum::<f64>() / legs.len() as f64;
        let mut combined = adjusted.powi(legs.len() as i32);

        let same_game = bet.legs.len() == 2
            && matches!(
                (&bet.legs[0].game_id, &bet.legs[1].game_id),
                (Some(a), Some(b)) if a == b
            );
        if same_game {
            combined *= self.config.same_game_deflation;
        }

        let ev = (combined / implied - 1.0) * 100.0;

        Ok(TeaserEvaluation {
            legs,
            teaser_points: bet.teaser_points,
            original_odds: bet.original_odds,
            implied_win_rate: adjusted,
            combined_probability: combined,
            fair_odds: implied_to_american(combined),
            ev,
            recommendation: Recommendation::from_ev(ev),
            same_game,
        })
    }
}
