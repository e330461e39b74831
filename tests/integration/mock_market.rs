//! In-memory prediction market for integration testing.
//!
//! `MockMarket` implements `MarketSource` directly. `spawn_exchange` serves
//! the same data over HTTP in the venue's wire format and verifies each
//! request's signature, so the real client can be exercised end to end.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::pss::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use serde_json::json;
use sha2::Sha256;

use signal_engine::platforms::kalshi::{HEADER_KEY, HEADER_SIGNATURE, HEADER_TIMESTAMP};
use signal_engine::platforms::{MarketSource, MarketStatus};
use signal_engine::types::EngineError;

/// Deterministic market source. Unknown tickers are upstream errors.
#[derive(Clone, Default)]
pub struct MockMarket {
    markets: Arc<Mutex<HashMap<String, MarketStatus>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ticker: &str, status: &str, result: Option<&str>) {
        self.markets.lock().unwrap().insert(
            ticker.to_string(),
            MarketStatus {
                ticker: ticker.to_string(),
                status: status.to_string(),
                result: result.map(String::from),
            },
        );
    }

    /// Tickers requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketSource for MockMarket {
    async fn market_status(&self, ticker: &str) -> Result<MarketStatus, EngineError> {
        self.calls.lock().unwrap().push(ticker.to_string());
        self.markets
            .lock()
            .unwrap()
            .get(ticker)
            .cloned()
            .ok_or_else(|| EngineError::upstream("mock", format!("HTTP 404: market {ticker} not found")))
    }
}

// ---------------------------------------------------------------------------
// HTTP exchange stub
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct ExchangeState {
    market: MockMarket,
    key_id: String,
    public_key: RsaPublicKey,
}

fn signature_ok(state: &ExchangeState, headers: &HeaderMap, path: &str) -> bool {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let (Some(key), Some(sig), Some(ts)) = (
        header(HEADER_KEY),
        header(HEADER_SIGNATURE),
        header(HEADER_TIMESTAMP),
    ) else {
        return false;
    };
    if key != state.key_id {
        return false;
    }
    let Ok(bytes) = STANDARD.decode(sig) else {
        return false;
    };
    let Ok(signature) = Signature::try_from(bytes.as_slice()) else {
        return false;
    };
    let message = format!("{ts}GET{path}");
    VerifyingKey::<Sha256>::new(state.public_key.clone())
        .verify(message.as_bytes(), &signature)
        .is_ok()
}

async fn get_market(
    State(state): State<ExchangeState>,
    Path(ticker): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<serde_json::Value>) {
    let path = format!("/trade-api/v2/markets/{ticker}");
    if !signature_ok(&state, &headers, &path) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": { "message": "invalid signature" } })),
        );
    }
    match state.market.market_status(&ticker).await {
        Ok(m) => (
            StatusCode::OK,
            Json(json!({ "market": { "ticker": m.ticker, "status": m.status, "result": m.result } })),
        ),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "message": "market not found" } })),
        ),
    }
}

/// Serve `market` on a random local port. Returns the API base URL.
pub async fn spawn_exchange(market: MockMarket, key_id: &str, public_key: RsaPublicKey) -> String {
    let state = ExchangeState {
        market,
        key_id: key_id.to_string(),
        public_key,
    };
    let app = Router::new()
        .route("/trade-api/v2/markets/:ticker", get(get_market))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/trade-api/v2")
}
