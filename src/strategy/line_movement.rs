//! Line movement and early/current pick agreement.
//!
//! Compares two consensus snapshots of the same game. When the early-run
//! and current-run model picks back the same side and the market moved
//! toward that side past the significance thresholds, an
//! [`ArbOpportunity`] is emitted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LineMovementConfig;
use crate::data::{EnrichmentIndex, TeamContext};
use crate::types::{ConsensusLine, LineSnapshot, Pick};

// ---------------------------------------------------------------------------
// Movement
// ---------------------------------------------------------------------------

/// Difference between an early and a current consensus line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineMovement {
    pub game_id: String,
    pub spread_early: Option<f64>,
    pub spread_current: Option<f64>,
    /// `current - early`, on the home spread.
    pub spread_delta: Option<f64>,
    pub home_prob_early: Option<f64>,
    pub home_prob_current: Option<f64>,
    /// `current - early`, on the home no-vig probability.
    pub home_prob_shift: Option<f64>,
    pub early_at: DateTime<Utc>,
    pub current_at: DateTime<Utc>,
}

fn delta(early: Option<f64>, current: Option<f64>) -> Option<f64> {
    Some(current? - early?)
}

impl LineMovement {
    pub fn between(early: &ConsensusLine, current: &ConsensusLine) -> Self {
        let home_early = early.no_vig_probability.map(|p| p.home);
        let home_current = current.no_vig_probability.map(|p| p.home);
        Self {
            game_id: current.game_id.clone(),
            spread_early: early.spread_avg,
            spread_current: current.spread_avg,
            spread_delta: delta(early.spread_avg, current.spread_avg),
            home_prob_early: home_early,
            home_prob_current: home_current,
            home_prob_shift: delta(home_early, home_current),
            early_at: early.captured_at,
            current_at: current.captured_at,
        }
    }

    /// Whether either dimension moved at least its threshold.
    pub fn is_significant(&self, config: &LineMovementConfig) -> bool {
        let spread = self
            .spread_delta
            .is_some_and(|d| d.abs() >= config.spread_points);
        let prob = self
            .home_prob_shift
            .is_some_and(|d| d.abs() >= config.probability_shift);
        spread || prob
    }

    /// Probability shift expressed for one side (positive = toward it).
    pub fn prob_shift_toward(&self, home: bool) -> Option<f64> {
        self.home_prob_shift.map(|d| if home { d } else { -d })
    }

    /// Spread move expressed for one side (positive = toward it).
    ///
    /// A home spread going from -3 to -5 is a move toward the home side.
    pub fn spread_move_toward(&self, home: bool) -> Option<f64> {
        self.spread_delta.map(|d| if home { -d } else { d })
    }

    /// Edge for one side, taken from a dimension that crossed its threshold
    /// in that side's favor.
    ///
    /// `None` when nothing is significant or when any significant dimension
    /// moved against the side. Probability wins over spread when both
    /// qualify.
    pub fn favorable_edge(&self, home: bool, config: &LineMovementConfig) -> Option<f64> {
        let prob = self
            .prob_shift_toward(home)
            .filter(|d| d.abs() >= config.probability_shift);
        let spread = self
            .spread_move_toward(home)
            .filter(|d| d.abs() >= config.spread_points);

        if prob.is_some_and(|d| d <= 0.0) || spread.is_some_and(|d| d <= 0.0) {
            return None;
        }
        prob.map(|d| d * 100.0).or(spread)
    }
}

// ---------------------------------------------------------------------------
// Opportunities
// ---------------------------------------------------------------------------

/// Early and current picks agree and the market followed them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbOpportunity {
    pub game_id: String,
    pub sport: String,
    pub home_team: String,
    pub away_team: String,
    pub selection: String,
    pub early_pick: Pick,
    pub current_pick: Pick,
    pub movement: LineMovement,
    /// Favorable move in percentage points of probability, or spread points
    /// when only the spread crossed its threshold.
    pub edge: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_context: Option<TeamContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent_context: Option<TeamContext>,
}

impl ArbOpportunity {
    pub fn summary(&self) -> String {
        let mut parts = vec![format!(
            "[{}] {} @ {}: early and current models both on {} (edge {:.1})",
            self.sport, self.away_team, self.home_team, self.selection, self.edge
        )];
        if let (Some(e), Some(c)) = (self.movement.spread_early, self.movement.spread_current) {
            parts.push(format!("spread {e:+.1} → {c:+.1}"));
        }
        if let (Some(e), Some(c)) = (self.movement.home_prob_early, self.movement.home_prob_current) {
            parts.push(format!("home no-vig {:.1}% → {:.1}%", e * 100.0, c * 100.0));
        }
        if let Some(ctx) = &self.opponent_context {
            let out: Vec<&str> = ctx.key_absences().map(|i| i.player.as_str()).collect();
            if !out.is_empty() {
                parts.push(format!("{} out: {}", ctx.team, out.join(", ")));
            }
        }
        parts.join(" | ")
    }
}

/// An early/current snapshot pair for one game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPair {
    pub early: LineSnapshot,
    pub current: LineSnapshot,
}

impl SnapshotPair {
    pub fn game_id(&self) -> &str {
        &self.current.line.game_id
    }
}

/// Keep only the most recent pair per game.
pub fn latest_pairs(pairs: &[SnapshotPair]) -> Vec<&SnapshotPair> {
    let mut latest: HashMap<&str, &SnapshotPair> = HashMap::new();
    for pair in pairs {
        latest
            .entry(pair.game_id())
            .and_modify(|held| {
                if pair.current.captured_at > held.current.captured_at {
                    *held = pair;
                }
            })
            .or_insert(pair);
    }
    let mut out: Vec<&SnapshotPair> = latest.into_values().collect();
    out.sort_by(|a, b| a.game_id().cmp(b.game_id()));
    out
}

/// Resolve a free-text selection to a side of the line.
fn selection_is_home(line: &ConsensusLine, selection: &str) -> Option<bool> {
    if let Some(home) = line.is_home(selection) {
        return Some(home);
    }
    let sel = selection.trim().to_lowercase();
    if sel.is_empty() {
        return None;
    }
    let home = line.home_team.to_lowercase();
    let away = line.away_team.to_lowercase();
    let hits_home = home.contains(&sel) || sel.contains(&home);
    let hits_away = away.contains(&sel) || sel.contains(&away);
    match (hits_home, hits_away) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    }
}

pub struct LineMovementDetector {
    config: LineMovementConfig,
}

impl LineMovementDetector {
    pub fn new(config: LineMovementConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LineMovementConfig {
        &self.config
    }

    /// Find agreeing picks on games whose line moved their way.
    ///
    /// Output is ranked by edge, largest first.
    pub fn detect(
        &self,
        pairs: &[SnapshotPair],
        early_picks: &[Pick],
        current_picks: &[Pick],
        enrichment: Option<&EnrichmentIndex>,
    ) -> Vec<ArbOpportunity> {
        let mut opportunities = Vec::new();

        for pair in latest_pairs(pairs) {
            let movement = LineMovement::between(&pair.early.line, &pair.current.line);
            if !movement.is_significant(&self.config) {
                continue;
            }
            let game_id = pair.game_id();

            let Some(current) = current_picks.iter().find(|p| p.game_id == game_id) else {
                continue;
            };
            let Some(early) = early_picks.iter().find(|p| p.agrees_with(current)) else {
                debug!(game_id, "Early and current picks disagree or early pick missing");
                continue;
            };

            let line = &pair.current.line;
            let Some(home) = selection_is_home(line, &current.selection) else {
                debug!(game_id, selection = %current.selection, "Selection does not name either team");
                continue;
            };

            let Some(edge) = movement.favorable_edge(home, &self.config) else {
                debug!(game_id, "Significant move does not favor the selection");
                continue;
            };

            let (selected, opponent) = if home {
                (&line.home_team, &line.away_team)
            } else {
                (&line.away_team, &line.home_team)
            };

            opportunities.push(ArbOpportunity {
                game_id: game_id.to_string(),
                sport: line.sport.to_string(),
                home_team: line.home_team.clone(),
                away_team: line.away_team.clone(),
                selection: selected.clone(),
                early_pick: early.clone(),
                current_pick: current.clone(),
                movement,
                edge,
                selection_context: enrichment.and_then(|e| e.for_team(selected)).cloned(),
                opponent_context: enrichment.and_then(|e| e.for_team(opponent)).cloned(),
            });
        }

        opportunities.sort_by(|a, b| {
            b.edge
                .partial_cmp(&a.edge)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        opportunities
    }

    /// Human-readable lines for the top opportunities.
    pub fn summaries(&self, opportunities: &[ArbOpportunity]) -> Vec<String> {
        opportunities
            .iter()
            .take(self.config.top_n)
            .map(ArbOpportunity::summary)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InjuryNote;
    use crate::types::{NoVigProbability, Sport};
    use chrono::Duration;

    fn line(game_id: &str, spread: Option<f64>, home_prob: Option<f64>, at: DateTime<Utc>) -> ConsensusLine {
        ConsensusLine {
            game_id: game_id.into(),
            sport: Sport::Nfl,
            home_team: "Kansas City Chiefs".into(),
            away_team: "Buffalo Bills".into(),
            home_ml_avg: None,
            home_ml_best: None,
            away_ml_avg: None,
            away_ml_best: None,
            spread_avg: spread,
            total_avg: None,
            no_vig_probability: home_prob.map(|h| NoVigProbability { home: h, away: 1.0 - h }),
            bookmaker_count: 3,
            captured_at: at,
        }
    }

    fn pair(game_id: &str, early: (Option<f64>, Option<f64>), current: (Option<f64>, Option<f64>)) -> SnapshotPair {
        let t0 = Utc::now() - Duration::hours(6);
        SnapshotPair {
            early: LineSnapshot::new(line(game_id, early.0, early.1, t0)),
            current: LineSnapshot::new(line(game_id, current.0, current.1, Utc::now())),
        }
    }

    fn detector() -> LineMovementDetector {
        LineMovementDetector::new(LineMovementConfig::default())
    }

    #[test]
    fn test_sub_threshold_move_never_emits() {
        // 1.0 point and 2% are both under the defaults
        let pairs = vec![pair("g1", (Some(-3.0), Some(0.58)), (Some(-4.0), Some(0.60)))];
        let picks = vec![Pick::sample("g1", "Kansas City Chiefs", 75.0)];
        let out = detector().detect(&pairs, &picks, &picks, None);
        assert!(out.is_empty());
    }

    #[test]
    fn test_agreeing_picks_with_favorable_move_emit() {
        let pairs = vec![pair("g1", (Some(-3.0), Some(0.58)), (Some(-4.5), Some(0.63)))];
        let early = vec![Pick::sample("g1", "Kansas City Chiefs", 70.0)];
        let current = vec![Pick::sample("g1", "kansas city chiefs", 78.0)];
        let out = detector().detect(&pairs, &early, &current, None);
        assert_eq!(out.len(), 1);
        let opp = &out[0];
        assert_eq!(opp.selection, "Kansas City Chiefs");
        assert!((opp.edge - 5.0).abs() < 1e-9);
        assert!(opp.selection_context.is_none());
        assert!(opp.opponent_context.is_none());
    }

    #[test]
    fn test_disagreeing_picks_do_not_emit() {
        let pairs = vec![pair("g1", (Some(-3.0), Some(0.58)), (Some(-6.0), Some(0.66)))];
        let early = vec![Pick::sample("g1", "Buffalo Bills", 70.0)];
        let current = vec![Pick::sample("g1", "Kansas City Chiefs", 78.0)];
        assert!(detector().detect(&pairs, &early, &current, None).is_empty());
    }

    #[test]
    fn test_move_against_pick_does_not_emit() {
        let pairs = vec![pair("g1", (Some(-3.0), Some(0.58)), (Some(-1.0), Some(0.52)))];
        let picks = vec![Pick::sample("g1", "Chiefs", 70.0)];
        assert!(detector().detect(&pairs, &picks, &picks, None).is_empty());
        // Same move is favorable for the away side
        let away = vec![Pick::sample("g1", "Bills", 70.0)];
        assert_eq!(detector().detect(&pairs, &away, &away, None).len(), 1);
    }

    #[test]
    fn test_spread_against_pick_is_not_rescued_by_small_prob_tick() {
        // 2.5 points toward the away side, home probability up 0.2%
        let pairs = vec![pair("g1", (Some(-3.0), Some(0.580)), (Some(-0.5), Some(0.582)))];
        let picks = vec![Pick::sample("g1", "Kansas City Chiefs", 70.0)];
        assert!(detector().detect(&pairs, &picks, &picks, None).is_empty());

        // The away side gets the spread as its edge
        let away = vec![Pick::sample("g1", "Buffalo Bills", 70.0)];
        let out = detector().detect(&pairs, &away, &away, None);
        assert_eq!(out.len(), 1);
        assert!((out[0].edge - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_conflicting_significant_dimensions_do_not_emit() {
        // Spread moves 2 toward home while home probability drops 4%
        let pairs = vec![pair("g1", (Some(-3.0), Some(0.60)), (Some(-5.0), Some(0.56)))];
        let home = vec![Pick::sample("g1", "Chiefs", 70.0)];
        let away = vec![Pick::sample("g1", "Bills", 70.0)];
        assert!(detector().detect(&pairs, &home, &home, None).is_empty());
        assert!(detector().detect(&pairs, &away, &away, None).is_empty());
    }

    #[test]
    fn test_spread_only_move_uses_points_as_edge() {
        let pairs = vec![pair("g1", (Some(-3.0), None), (Some(-5.0), None))];
        let picks = vec![Pick::sample("g1", "Chiefs", 70.0)];
        let out = detector().detect(&pairs, &picks, &picks, None);
        assert_eq!(out.len(), 1);
        assert!((out[0].edge - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_only_latest_pair_per_game_is_used() {
        let stale = pair("g1", (Some(-3.0), Some(0.50)), (Some(-6.0), Some(0.70)));
        let mut fresh = pair("g1", (Some(-3.0), Some(0.58)), (Some(-3.5), Some(0.59)));
        fresh.current.captured_at = Utc::now() + Duration::minutes(5);
        let picks = vec![Pick::sample("g1", "Chiefs", 70.0)];
        // The fresh pair is sub-threshold, so nothing is emitted even
        // though the stale pair would have qualified
        assert!(detector().detect(&[stale, fresh], &picks, &picks, None).is_empty());
    }

    #[test]
    fn test_ranked_by_edge_and_enriched() {
        let pairs = vec![
            pair("g1", (None, Some(0.50)), (None, Some(0.54))),
            pair("g2", (None, Some(0.50)), (None, Some(0.60))),
        ];
        let picks = vec![Pick::sample("g1", "Chiefs", 70.0), Pick::sample("g2", "Chiefs", 70.0)];
        let mut idx = EnrichmentIndex::new();
        idx.add_injury(
            "Buffalo Bills",
            InjuryNote { player: "J. Allen".into(), status: "out".into(), detail: None },
        );

        let d = detector();
        let out = d.detect(&pairs, &picks, &picks, Some(&idx));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].game_id, "g2");
        assert!(out[0].opponent_context.is_some());
        assert!(out[0].selection_context.is_none());

        let lines = d.summaries(&out);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("J. Allen"));
    }
}
