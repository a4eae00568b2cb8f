//! HTTP front door
//!
//! Thin JSON API for the browser dashboard. Every refresh answers with a
//! structured report, so one failing account never hides the others.

use crate::error::EngineError;
use crate::orchestrator::RetryOrchestrator;
use crate::storage::BalanceSnapshot;
use crate::types::{AccountRequest, AggregationReport, Credential, PortfolioSummary};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;


const DEFAULT_LABEL: &str = "Account 1";
const DEFAULT_HISTORY_LIMIT: u32 = 30;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RetryOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: RetryOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}

/// Credentials for one account as the dashboard sends them
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRequest {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub api_passphrase: String,
    #[serde(default)]
    pub account_label: Option<String>,
}

impl AggregateRequest {
    fn into_account(self) -> Result<AccountRequest, ApiError> {
        let credential = Credential::new(self.api_key, self.api_secret, self.api_passphrase);
        if !credential.missing_fields().is_empty() {
            return Err(ApiError::BadRequest("Missing credentials".into()));
        }
        credential
            .validate()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;

        Ok(AccountRequest {
            label: self
                .account_label
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LABEL.to_string()),
            credential,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub accounts: Vec<AggregateRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    pub account_label: String,
    pub bot_name: String,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub reset: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub account_label: String,
    pub limit: Option<u32>,
}

/// Errors that never reach the engine, or come from the store
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

// ============ HTTP API Handlers ============

/// Refresh a single account
async fn aggregate(
    State(state): State<AppState>,
    Json(req): Json<AggregateRequest>,
) -> Result<Json<AggregationReport>, ApiError> {
    let account = req.into_account()?;
    let report = state
        .orchestrator
        .run(&account.label, &account.credential)
        .await;
    Ok(Json(report))
}

/// Refresh every account in parallel and combine them
async fn aggregate_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<PortfolioSummary>, ApiError> {
    if req.accounts.is_empty() {
        return Err(ApiError::BadRequest("No accounts given".into()));
    }

    let accounts = req
        .accounts
        .into_iter()
        .map(AggregateRequest::into_account)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(state.orchestrator.run_many(&accounts).await))
}

/// Drop a bot's baseline so profit restarts from the next refresh
async fn reset_baseline(
    State(state): State<AppState>,
    Json(req): Json<ResetRequest>,
) -> Result<Json<ResetResponse>, ApiError> {
    if req.account_label.trim().is_empty() || req.bot_name.trim().is_empty() {
        return Err(ApiError::BadRequest("accountLabel and botName are required".into()));
    }

    let reset = state
        .orchestrator
        .reset_baseline(&req.account_label, &req.bot_name)
        .await?;
    Ok(Json(ResetResponse { reset }))
}

/// Balance history for the chart
async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<BalanceSnapshot>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let points = state
        .orchestrator
        .store()
        .history(&query.account_label, limit)
        .await?;
    Ok(Json(points))
}

/// Health check
async fn health_check() -> &'static str {
    "OK"
}

/// Create the API router, CORS-open for browser callers
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/aggregate", post(aggregate))
        .route("/api/aggregate/batch", post(aggregate_batch))
        .route("/api/baselines/reset", post(reset_baseline))
        .route("/api/history", get(history))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server
pub async fn start_server(state: AppState, host: &str, port: u16) -> std::io::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!("API server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await
}
