//! Injury and news enrichment.
//!
//! Enrichment is optional context attached to line-move opportunities.
//! A missing or failed provider only leaves those fields empty.

pub mod injuries;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{EngineError, Sport};

/// One reported player status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjuryNote {
    pub player: String,
    /// e.g. `out`, `questionable`, `doubtful`.
    pub status: String,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Everything known about one team for a slate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamContext {
    pub team: String,
    pub injuries: Vec<InjuryNote>,
    pub headlines: Vec<String>,
}

impl TeamContext {
    pub fn is_empty(&self) -> bool {
        self.injuries.is_empty() && self.headlines.is_empty()
    }

    /// Players ruled out.
    pub fn key_absences(&self) -> impl Iterator<Item = &InjuryNote> {
        self.injuries
            .iter()
            .filter(|i| i.status.eq_ignore_ascii_case("out"))
    }
}

/// Team-name keyed lookup over enrichment data.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentIndex {
    teams: HashMap<String, TeamContext>,
}

fn team_key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl EnrichmentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    pub fn add_injury(&mut self, team: &str, note: InjuryNote) {
        self.entry(team).injuries.push(note);
    }

    pub fn add_headline(&mut self, team: &str, headline: impl Into<String>) {
        self.entry(team).headlines.push(headline.into());
    }

    /// Fold another sport's index into this one.
    pub fn merge(&mut self, other: EnrichmentIndex) {
        for (key, ctx) in other.teams {
            let held = self.teams.entry(key).or_insert_with(|| TeamContext {
                team: ctx.team.clone(),
                ..TeamContext::default()
            });
            held.injuries.extend(ctx.injuries);
            held.headlines.extend(ctx.headlines);
        }
    }

    fn entry(&mut self, team: &str) -> &mut TeamContext {
        self.teams
            .entry(team_key(team))
            .or_insert_with(|| TeamContext {
                team: team.trim().to_string(),
                ..TeamContext::default()
            })
    }

    /// Look a team up by name.
    ///
    /// Exact (case-insensitive) match first, then either name containing
    /// the other, so "Chiefs" finds "Kansas City Chiefs".
    pub fn for_team(&self, team: &str) -> Option<&TeamContext> {
        let key = team_key(team);
        if key.is_empty() {
            return None;
        }
        if let Some(ctx) = self.teams.get(&key) {
            return Some(ctx);
        }
        self.teams
            .iter()
            .filter(|(k, _)| k.contains(&key) || key.contains(k.as_str()))
            .max_by_key(|(k, _)| k.len())
            .map(|(_, ctx)| ctx)
    }
}

/// Source of injury/news context for a sport.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn fetch(&self, sport: Sport) -> Result<EnrichmentIndex, EngineError>;
}
