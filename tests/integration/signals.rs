//! Pure signal transforms driven from configuration files.

use signal_engine::config::AppConfig;
use signal_engine::engine::tiers::TierAllocator;
use signal_engine::strategy::patterns::{load_library, GameContext, PatternMatcher};
use signal_engine::strategy::teaser::{Recommendation, TeaserBet, TeaserCalculator, TeaserLeg};
use signal_engine::types::{Pick, Sport, Tier};

fn pick(game_id: &str, selection: &str, confidence: f64) -> Pick {
    Pick {
        game_id: game_id.into(),
        sport: "NFL".into(),
        selection: selection.into(),
        pick_type: "moneyline".into(),
        confidence,
        edge: 0.0,
        expected_value: 0.0,
        odds_at_pick: None,
        tier: None,
        composite_score: None,
    }
}

fn football_teaser(spreads: &[f64]) -> TeaserBet {
    TeaserBet {
        legs: spreads
            .iter()
            .enumerate()
            .map(|(i, &s)| TeaserLeg {
                team: format!("team-{i}"),
                original_spread: s,
                sport: Sport::Nfl,
                game_id: Some(format!("g{i}")),
            })
            .collect(),
        teaser_points: 6.0,
        original_odds: -110.0,
    }
}

#[test]
fn test_key_numbers_come_from_config() {
    let bet = football_teaser(&[1.5, -2.5]);

    let defaults = TeaserCalculator::new(AppConfig::default().teaser);
    let with_keys = defaults.evaluate(&bet).unwrap();
    assert!(with_keys.implied_win_rate > 0.725);
    assert!((with_keys.combined_probability - with_keys.implied_win_rate.powi(2)).abs() < 1e-12);
    assert_eq!(with_keys.recommendation, Recommendation::StrongPlay);

    let cfg = AppConfig::from_toml(
        r#"
        [teaser.key_numbers]
        nfl = []
        "#,
    )
    .unwrap();
    let without_keys = TeaserCalculator::new(cfg.teaser).evaluate(&bet).unwrap();
    assert!(without_keys.legs.iter().all(|l| l.key_numbers_crossed.is_empty()));
    assert!(without_keys.combined_probability < with_keys.combined_probability);
}

#[test]
fn test_tier_boundaries_come_from_config() {
    let mut chiefs = pick("g1", "Chiefs", 84.0);
    chiefs.edge = 2.0;
    let picks = vec![
        chiefs,
        pick("g2", "Bills", 70.0),
        pick("g3", "Jets", 50.0),
    ];

    let cfg = AppConfig::from_toml(
        r#"
        [tiers]
        elite_min_confidence = 90.0
        premium_min_confidence = 60.0
        "#,
    )
    .unwrap();
    let alloc = TierAllocator::new(cfg.tiers).allocate(picks);
    assert!(alloc.elite.is_empty());
    assert_eq!(alloc.premium.len(), 2);
    assert_eq!(alloc.free.len(), 1);
    assert_eq!(alloc.total(), 3);
    assert!(alloc.premium.iter().all(|p| p.tier == Some(Tier::Premium)));
}

#[test]
fn test_pattern_library_from_file() {
    let path = std::env::temp_dir().join(format!("signal_engine_patterns_{}.json", uuid::Uuid::new_v4()));
    std::fs::write(
        &path,
        r#"[
            {"id":"cold-dome-team","description":"Dome team in the cold","conditions":["snow","dolphins"],
             "score":0.06,"confidence":0.8,"sampleSize":140,"accuracy":0.61},
            {"id":"divisional-dog","description":"Divisional underdog","conditions":["divisional"],
             "score":0.05,"confidence":0.9,"accuracy":0.58}
        ]"#,
    )
    .unwrap();

    let matcher = PatternMatcher::new(load_library(&path).unwrap());
    assert_eq!(matcher.library().len(), 2);

    let context = GameContext {
        home_team: "Green Bay Packers".into(),
        away_team: "Miami Dolphins".into(),
        sport: "NFL".into(),
        weather: Some("Snow, 18F".into()),
        ..GameContext::default()
    };
    let analysis = matcher.analyze(&context);
    assert_eq!(analysis.matched, vec!["cold-dome-team".to_string()]);
    assert!((analysis.score - 0.06).abs() < 1e-12);
    assert_eq!(analysis.insights.len(), 1);
    assert!(analysis.insights[0].starts_with("Dome team in the cold (+6.0%"));

    std::fs::remove_file(&path).unwrap();
}
