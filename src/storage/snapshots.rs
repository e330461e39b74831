//! Line snapshot store.
//!
//! One JSON file per slate date. For every game the store keeps the first
//! snapshot seen that day (early) and the most recent one (current);
//! intermediate snapshots are overwritten.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::strategy::line_movement::SnapshotPair;
use crate::types::{ConsensusLine, LineSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GameSnapshots {
    early: LineSnapshot,
    current: LineSnapshot,
}

pub struct SnapshotStore {
    path: PathBuf,
    games: BTreeMap<String, GameSnapshots>,
}

impl SnapshotStore {
    pub fn path_for(data_dir: &Path, date: &str) -> PathBuf {
        data_dir.join(format!("snapshots-{date}.json"))
    }

    /// Open the store for a date, empty when no file exists yet.
    pub fn open(data_dir: &Path, date: &str) -> Result<Self> {
        let path = Self::path_for(data_dir, date);
        let games = if path.exists() {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read snapshots from {}", path.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("Failed to parse snapshots from {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, games })
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Record a fresh consensus line.
    pub fn record(&mut self, line: ConsensusLine) {
        let snapshot = LineSnapshot::new(line);
        match self.games.get_mut(&snapshot.line.game_id) {
            Some(held) => {
                if snapshot.captured_at >= held.current.captured_at {
                    held.current = snapshot;
                }
            }
            None => {
                self.games.insert(
                    snapshot.line.game_id.clone(),
                    GameSnapshots {
                        early: snapshot.clone(),
                        current: snapshot,
                    },
                );
            }
        }
    }

    /// Games with two distinct captures.
    pub fn pairs(&self) -> Vec<SnapshotPair> {
        self.games
            .values()
            .filter(|g| g.current.captured_at > g.early.captured_at)
            .map(|g| SnapshotPair {
                early: g.early.clone(),
                current: g.current.clone(),
            })
            .collect()
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.games).context("Failed to serialise snapshots")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write snapshots to {}", self.path.display()))?;
        debug!(path = %self.path.display(), games = self.games.len(), "Snapshots saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sport;
    use chrono::{Duration, Utc};

    fn line(game_id: &str, spread: f64, minutes_ago: i64) -> ConsensusLine {
        ConsensusLine {
            game_id: game_id.into(),
            sport: Sport::Nfl,
            home_team: "Home".into(),
            away_team: "Away".into(),
            home_ml_avg: None,
            home_ml_best: None,
            away_ml_avg: None,
            away_ml_best: None,
            spread_avg: Some(spread),
            total_avg: None,
            no_vig_probability: None,
            bookmaker_count: 2,
            captured_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn test_keeps_first_and_latest() {
        let dir = std::env::temp_dir().join(format!("signal_engine_snap_{}", uuid::Uuid::new_v4()));
        let mut store = SnapshotStore::open(&dir, "2026-10-14").unwrap();
        store.record(line("g1", -3.0, 300));
        assert!(store.pairs().is_empty());

        store.record(line("g1", -4.0, 120));
        store.record(line("g1", -5.0, 10));
        // Out-of-order old capture does not replace current
        store.record(line("g1", -1.0, 200));

        let pairs = store.pairs();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].early.line.spread_avg, Some(-3.0));
        assert_eq!(pairs[0].current.line.spread_avg, Some(-5.0));

        store.save().unwrap();
        let reopened = SnapshotStore::open(&dir, "2026-10-14").unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.pairs()[0].current.line.spread_avg, Some(-5.0));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
