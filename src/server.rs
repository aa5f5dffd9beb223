//! HTTP trigger and health surface.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::database::DatabaseManager;
use crate::orchestrator::{CycleError, Orchestrator};

/// Application state shared across handlers.
pub struct AppState {
    pub database: Arc<DatabaseManager>,
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub ok: bool,
    pub database: String,
    pub sheets: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct FetchNowResponse {
    pub ok: bool,
    pub day: NaiveDate,
    pub fetched: usize,
    pub saved: usize,
    pub skipped: usize,
    pub sheets_updated: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct FetchNowParams {
    pub date: Option<NaiveDate>,
}

/// Error type for API handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    detail: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse<'a> {
    ok: bool,
    error: &'a str,
    detail: &'a str,
}

impl From<CycleError> for ApiError {
    fn from(e: CycleError) -> Self {
        match e {
            CycleError::AlreadyRunning => Self {
                status: StatusCode::CONFLICT,
                error: "fetch already running",
                detail: e.to_string(),
            },
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                error: "fetch failed",
                detail: other.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            ok: false,
            error: self.error,
            detail: &self.detail,
        });
        (self.status, body).into_response()
    }
}

/// Database ping plus spreadsheet API probe (when credentials are configured).
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let database = match state.database.ping().await {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            warn!("Health check: database unavailable: {}", e);
            "unavailable".to_string()
        }
    };

    let sheets = match state.orchestrator.exporter().sheets() {
        None => "not_configured".to_string(),
        Some(client) => match client.probe().await {
            Ok(()) => "ok".to_string(),
            Err(e) => {
                warn!("Health check: sheets API unavailable: {}", e);
                "unavailable".to_string()
            }
        },
    };

    let ok = database == "ok" && sheets != "unavailable";
    let status = if ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(HealthResponse { ok, database, sheets }))
}

/// Run one cycle immediately, optionally for `?date=YYYY-MM-DD`.
pub async fn fetch_now(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FetchNowParams>,
) -> Result<Json<FetchNowResponse>, ApiError> {
    info!("On-demand fetch requested");
    let summary = state.orchestrator.run_cycle(params.date).await?;

    Ok(Json(FetchNowResponse {
        ok: true,
        day: summary.day,
        fetched: summary.fetched,
        saved: summary.saved.saved,
        skipped: summary.saved.skipped,
        sheets_updated: summary.export.updated,
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/fetch-now", post(fetch_now))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("App listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}
