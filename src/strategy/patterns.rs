//! Emergent pattern matcher.
//!
//! Scores a game context against an externally supplied pattern library.
//! Matching is delegated to a [`MatchPredicate`]; aggregation is fixed:
//! matched scores weighted by `confidence × accuracy`, clamped to ±0.10.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

const SCORE_LIMIT: f64 = 0.10;
const MAX_INSIGHTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Every condition must hold for the pattern to match.
    pub conditions: Vec<String>,
    /// -0.10 to +0.10.
    pub score: f64,
    /// 0 to 1.
    pub confidence: f64,
    #[serde(default, alias = "sampleSize")]
    pub sample_size: u32,
    /// 0 to 1.
    pub accuracy: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextOdds {
    pub home: Option<f64>,
    pub away: Option<f64>,
    pub spread: Option<f64>,
}

/// Everything known about a game at scoring time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameContext {
    pub home_team: String,
    pub away_team: String,
    pub sport: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub weather: Option<String>,
    #[serde(default)]
    pub odds: Option<ContextOdds>,
    #[serde(default)]
    pub stats: BTreeMap<String, serde_json::Value>,
}

impl GameContext {
    /// Stable lowercase text form of the whole context.
    pub fn serialized(&self) -> String {
        serde_json::to_string(self)
            .map(|s| s.to_lowercase())
            .unwrap_or_default()
    }
}

/// A context plus its serialized text, computed once per analysis.
pub struct ContextView<'a> {
    pub context: &'a GameContext,
    pub text: &'a str,
}

/// Decides whether a pattern applies to a context.
pub trait MatchPredicate: Send + Sync {
    fn matches(&self, pattern: &Pattern, view: &ContextView<'_>) -> bool;
}

/// Every condition token appears in the serialized context.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringPredicate;

impl MatchPredicate for SubstringPredicate {
    fn matches(&self, pattern: &Pattern, view: &ContextView<'_>) -> bool {
        !pattern.conditions.is_empty()
            && pattern
                .conditions
                .iter()
                .all(|c| view.text.contains(&c.trim().to_lowercase()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAnalysis {
    /// Clamped to ±0.10; zero when nothing matched.
    pub score: f64,
    /// Mean confidence of matched patterns.
    pub confidence: f64,
    pub matched: Vec<String>,
    pub insights: Vec<String>,
}

pub struct PatternMatcher<P: MatchPredicate = SubstringPredicate> {
    library: Vec<Pattern>,
    predicate: P,
}

impl PatternMatcher<SubstringPredicate> {
    pub fn new(library: Vec<Pattern>) -> Self {
        Self {
            library,
            predicate: SubstringPredicate,
        }
    }
}

impl<P: MatchPredicate> PatternMatcher<P> {
    pub fn with_predicate(library: Vec<Pattern>, predicate: P) -> Self {
        Self { library, predicate }
    }

    pub fn library(&self) -> &[Pattern] {
        &self.library
    }

    pub fn analyze(&self, context: &GameContext) -> PatternAnalysis {
        let text = context.serialized();
        let view = ContextView { context, text: &text };

        let mut matched: Vec<&Pattern> = self
            .library
            .iter()
            .filter(|p| self.predicate.matches(p, &view))
            .collect();

        if matched.is_empty() {
            return PatternAnalysis {
                score: 0.0,
                confidence: 0.0,
                matched: Vec::new(),
                insights: Vec::new(),
            };
        }

        let (weighted, weights) = matched.iter().fold((0.0, 0.0), |(num, den), p| {
            let w = p.confidence * p.accuracy;
            (num + p.score * w, den + w)
        });
        let score = if weights > 0.0 {
            (weighted / weights).clamp(-SCORE_LIMIT, SCORE_LIMIT)
        } else {
            0.0
        };
        let confidence = matched.iter().map(|p| p.confidence).sum::<f64>() / matched.len() as f64;

        // Stable sort keeps library order among equal magnitudes
        matched.sort_by(|a, b| {
            b.score
                .abs()
                .partial_cmp(&a.score.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let insights = matched
            .iter()
            .take(MAX_INSIGHTS)
            .map(|p| {
                format!(
                    "{} ({:+.1}%, {:.0}% historical accuracy)",
                    if p.description.is_empty() { &p.id } else { &p.description },
                    p.score * 100.0,
                    p.accuracy * 100.0,
                )
            })
            .collect();

        debug!(
            home = %context.home_team,
            away = %context.away_team,
            matched = matched.len(),
            score,
            "Pattern analysis complete"
        );

        PatternAnalysis {
            score,
            confidence,
            matched: matched.iter().map(|p| p.id.clone()).collect(),
            insights,
        }
    }
}

/// Load a pattern library from a JSON array file.
pub fn load_library(path: &Path) -> Result<Vec<Pattern>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pattern library {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse pattern library {}", path.display()))
}
