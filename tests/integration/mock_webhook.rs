//! Recording syndication webhook.
//!
//! Serves a local HTTP endpoint that stores every batch it receives. The
//! reply for each tier is scripted: accept, accept with item errors, or
//! reject with an HTTP error.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::json;

use signal_engine::engine::syndicator::SyndicationBatch;

#[derive(Debug, Clone)]
pub enum Reply {
    Accept,
    AcceptWithErrors(Vec<String>),
    Reject(u16, String),
}

#[derive(Clone, Default)]
pub struct WebhookRecorder {
    received: Arc<Mutex<Vec<SyndicationBatch>>>,
    replies: Arc<Mutex<HashMap<String, Reply>>>,
}

impl WebhookRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the reply for one tier (`elite`, `premium`, `free`).
    pub fn reply(&self, tier: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(tier.to_string(), reply);
    }

    pub fn received(&self) -> Vec<SyndicationBatch> {
        self.received.lock().unwrap().clone()
    }
}

async fn receive(
    State(recorder): State<WebhookRecorder>,
    Json(batch): Json<SyndicationBatch>,
) -> (StatusCode, Json<serde_json::Value>) {
    let tier = batch.tier.to_string();
    recorder.received.lock().unwrap().push(batch);
    let reply = recorder
        .replies
        .lock()
        .unwrap()
        .get(&tier)
        .cloned()
        .unwrap_or(Reply::Accept);

    match reply {
        Reply::Accept => (StatusCode::OK, Json(json!({ "ok": true }))),
        Reply::AcceptWithErrors(errors) => (StatusCode::OK, Json(json!({ "ok": true, "errors": errors }))),
        Reply::Reject(status, message) => (
            StatusCode::from_u16(status).unwrap(),
            Json(json!({ "error": { "message": message } })),
        ),
    }
}

/// Serve the recorder on a random local port. Returns the webhook URL.
pub async fn spawn_webhook(recorder: WebhookRecorder) -> String {
    let app = Router::new()
        .route("/hooks/picks", post(receive))
        .with_state(recorder);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/hooks/picks")
}
