//! Pick artifacts.
//!
//! Upstream writes one JSON file per date and variant under the data
//! directory: `picks-{date}.json` and `picks-early-{date}.json`. Either a
//! bare array or `{"picks": [...]}` is accepted. Picks are parsed one by
//! one; a malformed pick is skipped without losing the rest of the file.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::types::Pick;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickVariant {
    Regular,
    Early,
}

impl PickVariant {
    pub fn file_name(&self, date: &str) -> String {
        match self {
            PickVariant::Regular => format!("picks-{date}.json"),
            PickVariant::Early => format!("picks-early-{date}.json"),
        }
    }
}

/// A loaded pick set and the file it came from.
#[derive(Debug, Clone)]
pub struct LoadedPicks {
    pub picks: Vec<Pick>,
    pub artifact: String,
    pub variant: PickVariant,
    /// Entries that did not parse as a pick.
    pub skipped: usize,
}

/// What syndication will publish, plus artifacts that could not be read.
#[derive(Debug, Clone, Default)]
pub struct SyndicationInput {
    pub loaded: Option<LoadedPicks>,
    pub failures: Vec<String>,
}

fn pick_entries(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => match obj.remove("picks") {
            Some(Value::Array(items)) => Ok(items),
            _ => bail!("expected a \"picks\" array"),
        },
        _ => bail!("expected an array of picks or an object with \"picks\""),
    }
}

pub fn artifact_path(data_dir: &Path, date: &str, variant: PickVariant) -> PathBuf {
    data_dir.join(variant.file_name(date))
}

/// Load one variant. `Ok(None)` when the file does not exist.
pub fn load_picks(data_dir: &Path, date: &str, variant: PickVariant) -> Result<Option<LoadedPicks>> {
    let path = artifact_path(data_dir, date, variant);
    if !path.exists() {
        debug!(path = %path.display(), "No pick artifact");
        return Ok(None);
    }

    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read picks from {}", path.display()))?;
    let entries = serde_json::from_str::<Value>(&json)
        .map_err(anyhow::Error::from)
        .and_then(pick_entries)
        .with_context(|| format!("Failed to parse picks from {}", path.display()))?;

    let mut picks = Vec::with_capacity(entries.len());
    let mut skipped = 0;
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<Pick>(entry) {
            Ok(pick) => picks.push(pick),
            Err(e) => {
                warn!(path = %path.display(), index, error = %e, "Skipping malformed pick");
                skipped += 1;
            }
        }
    }

    info!(path = %path.display(), count = picks.len(), skipped, "Picks loaded");
    Ok(Some(LoadedPicks {
        picks,
        artifact: variant.file_name(date),
        variant,
        skipped,
    }))
}

/// Regular artifact, falling back to the same-day early one when the
/// regular file is missing or unreadable.
pub fn load_for_syndication(data_dir: &Path, date: &str) -> SyndicationInput {
    let mut input = SyndicationInput::default();
    for variant in [PickVariant::Regular, PickVariant::Early] {
        match load_picks(data_dir, date, variant) {
            Ok(Some(loaded)) => {
                input.loaded = Some(loaded);
                break;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(date, ?variant, error = %format!("{e:#}"), "Pick artifact unreadable");
                input.failures.push(format!("{}: {e:#}", variant.file_name(date)));
            }
        }
    }
    input
}

pub fn save_picks(data_dir: &Path, date: &str, variant: PickVariant, picks: &[Pick]) -> Result<PathBuf> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;
    let path = artifact_path(data_dir, date, variant);
    let json = serde_json::to_string_pretty(picks).context("Failed to serialise picks")?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("signal_engine_picks_{}", uuid::Uuid::new_v4()));
        p
    }

    #[test]
    fn test_missing_artifact_is_none() {
        let dir = temp_dir();
        assert!(load_picks(&dir, "2026-10-14", PickVariant::Regular).unwrap().is_none());
        let input = load_for_syndication(&dir, "2026-10-14");
        assert!(input.loaded.is_none());
        assert!(input.failures.is_empty());
    }

    #[test]
    fn test_falls_back_to_early() {
        let dir = temp_dir();
        save_picks(&dir, "2026-10-14", PickVariant::Early, &[Pick::sample("g1", "Chiefs", 70.0)]).unwrap();
        let loaded = load_for_syndication(&dir, "2026-10-14").loaded.unwrap();
        assert_eq!(loaded.variant, PickVariant::Early);
        assert_eq!(loaded.artifact, "picks-early-2026-10-14.json");
        assert_eq!(loaded.picks.len(), 1);

        save_picks(&dir, "2026-10-14", PickVariant::Regular, &[]).unwrap();
        let loaded = load_for_syndication(&dir, "2026-10-14").loaded.unwrap();
        assert_eq!(loaded.variant, PickVariant::Regular);
        assert!(loaded.picks.is_empty());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_wrapped_artifact() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("picks-2026-10-14.json"),
            r#"{"date":"2026-10-14","picks":[{"gameId":"g1","sport":"NBA","pick":"Celtics","confidence":66}]}"#,
        )
        .unwrap();
        let loaded = load_picks(&dir, "2026-10-14", PickVariant::Regular).unwrap().unwrap();
        assert_eq!(loaded.picks[0].selection, "Celtics");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_corrupt_artifact_errors() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("picks-2026-10-14.json"), "{not json").unwrap();
        assert!(load_picks(&dir, "2026-10-14", PickVariant::Regular).is_err());
        std::fs::write(dir.join("picks-2026-10-14.json"), r#"{"date":"2026-10-14"}"#).unwrap();
        assert!(load_picks(&dir, "2026-10-14", PickVariant::Regular).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_malformed_pick_is_skipped() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("picks-2026-10-14.json"),
            r#"[
                {"gameId":"g1","sport":"NFL","pick":"Chiefs","confidence":81},
                {"gameId":"g2","sport":"NBA","pick":"Knicks"},
                "not a pick"
            ]"#,
        )
        .unwrap();
        let loaded = load_picks(&dir, "2026-10-14", PickVariant::Regular).unwrap().unwrap();
        assert_eq!(loaded.picks.len(), 1);
        assert_eq!(loaded.picks[0].selection, "Chiefs");
        assert_eq!(loaded.skipped, 2);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_corrupt_regular_falls_back_to_early() {
        let dir = temp_dir();
        save_picks(&dir, "2026-10-14", PickVariant::Early, &[Pick::sample("g1", "Chiefs", 70.0)]).unwrap();
        std::fs::write(dir.join("picks-2026-10-14.json"), "{truncated").unwrap();

        let input = load_for_syndication(&dir, "2026-10-14");
        let loaded = input.loaded.unwrap();
        assert_eq!(loaded.variant, PickVariant::Early);
        assert_eq!(loaded.picks.len(), 1);
        assert_eq!(input.failures.len(), 1);
        assert!(input.failures[0].starts_with("picks-2026-10-14.json"));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
