//! Settlement sweeps against an in-memory ledger.

use std::time::{Duration, Instant};

use chrono::Utc;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use rust_decimal_macros::dec;
use secrecy::SecretString;

use signal_engine::engine::reconciler::Reconciler;
use signal_engine::platforms::kalshi::{KalshiClient, RequestSigner};
use signal_engine::storage::ledger::{BetLedger, NewBet};
use signal_engine::types::{BetResult, Side};

use crate::mock_market::{spawn_exchange, MockMarket};

async fn place(ledger: &BetLedger, ticker: Option<&str>, side: Side, contracts: i64, stake_cents: i64) -> i64 {
    ledger
        .insert_bet(&NewBet {
            ticker: ticker.map(String::from),
            side,
            contracts,
            stake_cents,
            placed_at: Utc::now(),
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_mixed_sweep_settles_each_ticker_once() {
    let ledger = BetLedger::in_memory().await.unwrap();
    let win = place(&ledger, Some("KX-WIN"), Side::Yes, 10, 500).await;
    let lose = place(&ledger, Some("KX-WIN"), Side::No, 4, 220).await;
    let refunds = [
        place(&ledger, Some("KX-VOID"), Side::Yes, 3, 200).await,
        place(&ledger, Some("KX-VOID"), Side::No, 5, 300).await,
        place(&ledger, Some("KX-VOID"), Side::Yes, 8, 500).await,
    ];
    let open = place(&ledger, Some("KX-OPEN"), Side::Yes, 2, 90).await;
    let missing = place(&ledger, Some("KX-GONE"), Side::Yes, 1, 40).await;
    let untracked = place(&ledger, None, Side::Yes, 1, 50).await;

    let market = MockMarket::new();
    market.set("KX-WIN", "settled", Some("yes"));
    market.set("KX-VOID", "cancelled", None);
    market.set("KX-OPEN", "active", None);

    let reconciler = Reconciler::new(&market, &ledger, Duration::ZERO);
    let report = reconciler.run().await.unwrap();

    assert_eq!(report.tickers_attempted, 4);
    assert_eq!(report.tickers_succeeded, 3);
    assert_eq!(report.tickers_failed, 1);
    assert_eq!(report.tickers_pending, 1);
    assert_eq!(report.rows_settled, 5);
    assert_eq!((report.wins, report.losses, report.cancelled), (1, 1, 3));
    // 10.00 win + 0 loss + 10.00 refunds
    assert_eq!(report.total_payout, dec!(20.00));
    // +5.00 - 2.20 + 0
    assert_eq!(report.total_profit, dec!(2.80));

    let mut calls = market.calls();
    calls.sort();
    assert_eq!(calls, vec!["KX-GONE", "KX-OPEN", "KX-VOID", "KX-WIN"]);

    let row = ledger.get(win).await.unwrap().unwrap();
    assert_eq!((row.result, row.payout_cents, row.profit_cents), (Some(BetResult::Win), Some(1000), Some(500)));
    let row = ledger.get(lose).await.unwrap().unwrap();
    assert_eq!((row.result, row.payout_cents, row.profit_cents), (Some(BetResult::Loss), Some(0), Some(-220)));
    for (id, stake) in refunds.into_iter().zip([200, 300, 500]) {
        let row = ledger.get(id).await.unwrap().unwrap();
        assert_eq!(row.result, Some(BetResult::Cancelled));
        assert_eq!((row.payout_cents, row.profit_cents), (Some(stake), Some(0)));
    }
    for id in [open, missing, untracked] {
        assert!(ledger.get(id).await.unwrap().unwrap().result.is_none());
    }

    // Next cycle: settled rows are never revisited, open ones are retried
    market.set("KX-OPEN", "finalized", Some("no"));
    let second = reconciler.run().await.unwrap();
    assert_eq!(second.tickers_attempted, 2);
    assert_eq!(second.rows_settled, 1);
    assert_eq!(second.losses, 1);
    let row = ledger.get(win).await.unwrap().unwrap();
    assert_eq!(row.payout_cents, Some(1000));
}

#[tokio::test]
async fn test_calls_are_spaced_by_delay() {
    let ledger = BetLedger::in_memory().await.unwrap();
    for ticker in ["A", "B", "C"] {
        place(&ledger, Some(ticker), Side::Yes, 1, 50).await;
    }
    let market = MockMarket::new();

    let started = Instant::now();
    Reconciler::new(&market, &ledger, Duration::from_millis(40))
        .run()
        .await
        .unwrap();
    // Two gaps between three tickers
    assert!(started.elapsed() >= Duration::from_millis(80));
    assert_eq!(market.calls(), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_signed_client_against_exchange() {
    let key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
    let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string();

    let market = MockMarket::new();
    market.set("KXNFL-KC", "settled", Some("yes"));
    let base_url = spawn_exchange(market.clone(), "key-1", key.to_public_key()).await;

    let ledger = BetLedger::in_memory().await.unwrap();
    let id = place(&ledger, Some("KXNFL-KC"), Side::Yes, 10, 500).await;

    let client = KalshiClient::new(&base_url, RequestSigner::new("key-1".into(), SecretString::new(pem)), 5).unwrap();
    let report = Reconciler::new(&client, &ledger, Duration::ZERO).run().await.unwrap();
    assert_eq!(report.rows_settled, 1);
    assert_eq!(ledger.get(id).await.unwrap().unwrap().result, Some(BetResult::Win));
}

#[tokio::test]
async fn test_wrong_key_id_is_rejected_and_skipped() {
    let key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
    let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string();

    let market = MockMarket::new();
    market.set("KXNBA-BOS", "settled", Some("no"));
    let base_url = spawn_exchange(market.clone(), "key-1", key.to_public_key()).await;

    let ledger = BetLedger::in_memory().await.unwrap();
    let id = place(&ledger, Some("KXNBA-BOS"), Side::Yes, 1, 60).await;

    let client = KalshiClient::new(&base_url, RequestSigner::new("other".into(), SecretString::new(pem)), 5).unwrap();
    let report = Reconciler::new(&client, &ledger, Duration::ZERO).run().await.unwrap();
    assert_eq!(report.tickers_failed, 1);
    assert_eq!(report.rows_settled, 0);
    assert!(ledger.get(id).await.unwrap().unwrap().result.is_none());
    // The exchange refused before reading the market
    assert!(market.calls().is_empty());
}

#[tokio::test]
async fn test_unparseable_key_skips_ticker() {
    let ledger = BetLedger::in_memory().await.unwrap();
    let id = place(&ledger, Some("KX-1"), Side::Yes, 1, 60).await;

    let client = KalshiClient::new(
        "http://127.0.0.1:9/trade-api/v2",
        RequestSigner::new("k".into(), SecretString::new("garbage".into())),
        1,
    )
    .unwrap();
    let report = Reconciler::new(&client, &ledger, Duration::ZERO).run().await.unwrap();
    assert_eq!(report.tickers_failed, 1);
    assert!(ledger.get(id).await.unwrap().unwrap().result.is_none());
}
