//! Trigger surface: credential-gated HTTP entry points that run one job.
//!
//! `GET /health` is open. Every `/run/*` route checks the shared credential
//! before the job runner is touched.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::engine::{
    self,
    report::{SettlementReport, SlateReport, SyndicationReport},
};
use crate::types::EngineError;

pub const SECRET_HEADER: &str = "x-engine-secret";

/// The jobs the trigger surface can start.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn syndicate(&self, date: &str, dry_run: bool) -> Result<SyndicationReport>;
    async fn settle(&self) -> Result<SettlementReport>;
    async fn odds(&self, date: &str) -> Result<SlateReport>;
}

/// Runs jobs against live configuration.
pub struct ConfigJobs {
    config: AppConfig,
}

impl ConfigJobs {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl JobRunner for ConfigJobs {
    async fn syndicate(&self, date: &str, dry_run: bool) -> Result<SyndicationReport> {
        engine::run_syndicate(&self.config, date, dry_run).await
    }

    async fn settle(&self) -> Result<SettlementReport> {
        engine::run_settle(&self.config).await
    }

    async fn odds(&self, date: &str) -> Result<SlateReport> {
        engine::run_odds(&self.config, date).await
    }
}

pub struct TriggerState {
    /// `None` when the credential variable is unset; every run is refused.
    credential: Option<SecretString>,
    jobs: Arc<dyn JobRunner>,
}

impl TriggerState {
    pub fn new(credential: Option<SecretString>, jobs: Arc<dyn JobRunner>) -> Self {
        Self { credential, jobs }
    }
}

pub type SharedState = Arc<TriggerState>;

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/run/syndicate", post(run_syndicate))
        .route("/run/settle", post(run_settle))
        .route("/run/odds", post(run_odds))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: SharedState, port: u16) -> Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind trigger port {port}"))?;
    info!(port, "Trigger surface listening");
    axum::serve(listener, build_router(state))
        .await
        .context("Trigger server error")
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

enum ApiError {
    Unauthorized,
    BadRequest(String),
    Configuration(String),
    Job(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast_ref::<EngineError>() {
            Some(EngineError::Configuration(msg)) => ApiError::Configuration(msg.clone()),
            _ => ApiError::Job(format!("{e:#}")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Configuration(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("configuration error: {m}"),
            ),
            ApiError::Job(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn presented_credential(headers: &HeaderMap) -> Option<&str> {
    if let Some(v) = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(v.trim());
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

fn authorize(state: &TriggerState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = &state.credential else {
        warn!("Trigger credential is not configured, refusing run");
        return Err(ApiError::Configuration("trigger credential is not set".into()));
    };
    match presented_credential(headers) {
        Some(given) if !given.is_empty() && given == expected.expose_secret().trim() => Ok(()),
        _ => {
            warn!("Trigger request with missing or wrong credential");
            Err(ApiError::Unauthorized)
        }
    }
}

#[derive(Debug, Deserialize)]
struct RunQuery {
    date: Option<String>,
    #[serde(default)]
    dry_run: bool,
}

impl RunQuery {
    fn date(&self) -> Result<String, ApiError> {
        match &self.date {
            None => Ok(Utc::now().format("%Y-%m-%d").to_string()),
            Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map(|_| d.clone())
                .map_err(|_| ApiError::BadRequest(format!("invalid date: {d}"))),
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn run_syndicate(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<RunQuery>,
) -> Result<Json<SyndicationReport>, ApiError> {
    authorize(&state, &headers)?;
    let date = query.date()?;
    Ok(Json(state.jobs.syndicate(&date, query.dry_run).await?))
}

async fn run_settle(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<SettlementReport>, ApiError> {
    authorize(&state, &headers)?;
    Ok(Json(state.jobs.settle().await?))
}

async fn run_odds(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<RunQuery>,
) -> Result<Json<SlateReport>, ApiError> {
    authorize(&state, &headers)?;
    let date = query.date()?;
    Ok(Json(state.jobs.odds(&date).await?))
}
