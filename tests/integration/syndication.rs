//! Pick artifacts through tier allocation to the webhook.

use std::path::PathBuf;

use signal_engine::config::{AppConfig, TierConfig};
use signal_engine::engine::report::TierStatus;
use signal_engine::engine::syndicator::{batch_checksum, HttpWebhook, Syndicator, WebhookTransport};
use signal_engine::engine::tiers::TierAllocator;
use signal_engine::engine::{run_id, run_syndicate};
use signal_engine::storage::picks::{load_for_syndication, save_picks, PickVariant};
use signal_engine::types::{Pick, Tier};

use crate::mock_webhook::{spawn_webhook, Reply, WebhookRecorder};

fn pick(game_id: &str, selection: &str, confidence: f64, edge: f64) -> Pick {
    Pick {
        game_id: game_id.into(),
        sport: "NFL".into(),
        selection: selection.into(),
        pick_type: "spread".into(),
        confidence,
        edge,
        expected_value: 0.0,
        odds_at_pick: Some(-110.0),
        tier: None,
        composite_score: None,
    }
}

fn slate() -> Vec<Pick> {
    vec![
        pick("g1", "Chiefs", 84.0, 6.0),
        pick("g2", "Bills", 67.0, 3.0),
        pick("g3", "Ravens", 91.0, 2.0),
        pick("g4", "Jets", 55.0, 1.0),
        pick("g5", "Lions", 70.0, 4.0),
    ]
}

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("signal_engine_it_{}", uuid::Uuid::new_v4()))
}

fn syndicator(url: String) -> Syndicator {
    let transport: Box<dyn WebhookTransport> = Box::new(HttpWebhook::new(url, 5).unwrap());
    Syndicator::new(TierAllocator::new(TierConfig::default()), Some(transport), "it")
}

#[tokio::test]
async fn test_early_artifact_is_published_per_tier() {
    let dir = temp_dir();
    save_picks(&dir, "2026-10-14", PickVariant::Early, &slate()).unwrap();
    let loaded = load_for_syndication(&dir, "2026-10-14").loaded.unwrap();
    assert_eq!(loaded.variant, PickVariant::Early);

    let recorder = WebhookRecorder::new();
    let url = spawn_webhook(recorder.clone()).await;
    let report = syndicator(url)
        .publish("signals-2026-10-14", "2026-10-14", loaded.picks, Some(loaded.artifact), false)
        .await
        .unwrap();

    assert_eq!(report.total_picks, 5);
    assert_eq!((report.elite, report.premium, report.free), (2, 2, 1));
    assert_eq!(report.counts.succeeded, 3);
    assert_eq!(report.source_artifact.as_deref(), Some("picks-early-2026-10-14.json"));

    let received = recorder.received();
    assert_eq!(received.len(), 3);
    let elite = received.iter().find(|b| b.tier == Tier::Elite).unwrap();
    assert_eq!(elite.batch_id, "signals-2026-10-14-elite");
    assert_eq!(elite.source, "it");
    // Ordered by sort score, every pick tagged with its tier
    assert_eq!(elite.picks[0].selection, "Chiefs");
    assert_eq!(elite.picks[1].selection, "Ravens");
    assert!(elite.picks.iter().all(|p| p.tier == Some(Tier::Elite)));
    assert_eq!(elite.checksum, batch_checksum(Tier::Elite, &elite.picks));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_item_errors_and_rejections_are_reported() {
    let recorder = WebhookRecorder::new();
    recorder.reply("premium", Reply::AcceptWithErrors(vec!["g2: duplicate".into()]));
    recorder.reply("free", Reply::Reject(503, "maintenance".into()));
    let url = spawn_webhook(recorder.clone()).await;

    let report = syndicator(url)
        .publish("run-1", "2026-10-14", slate(), None, false)
        .await
        .unwrap();

    let status = |tier: Tier| report.tiers.iter().find(|t| t.tier == tier).unwrap();
    assert_eq!(status(Tier::Elite).status, TierStatus::Posted);
    assert_eq!(status(Tier::Premium).status, TierStatus::PostedWithErrors);
    assert_eq!(status(Tier::Premium).errors, vec!["g2: duplicate".to_string()]);
    assert_eq!(status(Tier::Free).status, TierStatus::Failed);
    assert!(status(Tier::Free).errors[0].contains("maintenance"));
    assert_eq!((report.counts.succeeded, report.counts.failed), (2, 1));
    assert_eq!(recorder.received().len(), 3);
}

#[tokio::test]
async fn test_dry_run_job_reads_artifact_without_webhook() {
    let dir = temp_dir();
    save_picks(&dir, "2026-10-14", PickVariant::Regular, &slate()).unwrap();

    let mut cfg = AppConfig::default();
    cfg.engine.data_dir = dir.to_string_lossy().into_owned();
    cfg.syndication.webhook_url_env = format!("UNSET_WEBHOOK_{}", uuid::Uuid::new_v4().simple());

    let report = run_syndicate(&cfg, "2026-10-14", true).await.unwrap();
    assert!(report.dry_run);
    assert_eq!(report.run_id, run_id(&cfg, "2026-10-14"));
    assert_eq!(report.total_picks, 5);
    assert!(report.tiers.iter().all(|t| t.status == TierStatus::DryRun));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_malformed_pick_does_not_halt_job() {
    let dir = temp_dir();
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("picks-2026-10-14.json"),
        r#"[
            {"gameId":"g1","sport":"NFL","pick":"Chiefs","confidence":84,"edge":6},
            {"gameId":"g2","sport":"NBA","pick":"Knicks"}
        ]"#,
    )
    .unwrap();

    let mut cfg = AppConfig::default();
    cfg.engine.data_dir = dir.to_string_lossy().into_owned();

    let report = run_syndicate(&cfg, "2026-10-14", true).await.unwrap();
    assert_eq!(report.total_picks, 1);
    assert_eq!(report.elite, 1);
    assert_eq!(report.skipped_picks, 1);
    assert!(report.load_failures.is_empty());

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_corrupt_regular_artifact_uses_early() {
    let dir = temp_dir();
    save_picks(&dir, "2026-10-14", PickVariant::Early, &slate()).unwrap();
    std::fs::write(dir.join("picks-2026-10-14.json"), "{truncated").unwrap();

    let mut cfg = AppConfig::default();
    cfg.engine.data_dir = dir.to_string_lossy().into_owned();

    let report = run_syndicate(&cfg, "2026-10-14", true).await.unwrap();
    assert_eq!(report.source_artifact.as_deref(), Some("picks-early-2026-10-14.json"));
    assert_eq!(report.total_picks, 5);
    assert_eq!(report.load_failures.len(), 1);

    std::fs::remove_dir_all(&dir).unwrap();
}
