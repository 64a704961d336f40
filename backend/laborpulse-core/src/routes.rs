// src/routes.rs
use crate::labor_model::{EfficiencyRecord, NotClockedInRecord, OprSeq};
use crate::not_clocked_in::filter_by_opr_seq;
use crate::refresh_scheduler::{PassOutcome, RefreshDriver};
use crate::settings::VERSION;
use crate::stats::{
    track_stats, StatsManager, StatsTracker, GET_EMPS_NOT_CLOCKED, GET_LABOR_EFFICIENCY,
    GET_SETTINGS, GET_STATS,
};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub driver: Arc<RefreshDriver>,
    pub stats: Arc<StatsManager>,
}

// --- Error Handling ---

#[derive(Error, Debug)]
pub enum AppError {
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV buffer error: {0}")]
    CsvBuffer(String),
    #[error("Unknown export format: {0}")]
    UnknownFormat(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Error occurred: {}", self);

        let (status_code, error_message) = match self {
            AppError::Csv(_) | AppError::CsvBuffer(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error (CSV export).".to_string(),
            ),
            AppError::UnknownFormat(ref format) => (
                StatusCode::BAD_REQUEST,
                format!("Unsupported format '{}', use json or csv.", format),
            ),
        };

        (status_code, Json(json!({ "error": error_message }))).into_response()
    }
}

// --- Query parameters and bodies ---

#[derive(Debug, Deserialize)]
pub struct EfficiencyParams {
    #[serde(rename = "OprSeq", alias = "oprseq")]
    pub opr_seq: Option<OprSeq>,
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotClockedParams {
    #[serde(rename = "oprseq", alias = "OprSeq")]
    pub opr_seq: Option<OprSeq>,
}

#[derive(Debug, Serialize)]
pub struct EfficiencyResponse {
    pub active_labor: Vec<EfficiencyRecord>,
    pub empsnotclocked: Vec<NotClockedInRecord>,
    pub oprseq: Option<OprSeq>,
    pub timestamp: Option<NaiveDateTime>,
    pub executiontime: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ForcedUpdateResponse {
    pub message: &'static str,
    pub executiontime: f64,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SettingsView {
    pub refresh_interval: u64,
    pub dept_translate: BTreeMap<OprSeq, Vec<String>>,
}

// --- Router ---

pub fn build_router(state: AppState) -> Router {
    let tracked = |name: &'static str| {
        from_fn_with_state(StatsTracker::new(state.stats.clone(), name), track_stats)
    };

    let labor_routes = Router::new()
        .route(
            "/ActiveLaborEfficiency",
            get(handle_active_labor_efficiency).layer(tracked(GET_LABOR_EFFICIENCY)),
        )
        .route(
            "/EmployeesNotClockedIntoJobs",
            get(handle_emps_not_clocked).layer(tracked(GET_EMPS_NOT_CLOCKED)),
        )
        .route("/ForceActiveLaborUpdate", get(handle_force_update))
        .route("/ExecutionTimes", get(handle_execution_times));

    Router::new()
        .route("/", get(handle_root))
        .nest("/Epicor/Labor", labor_routes)
        .route("/scheduler/status", get(handle_scheduler_status))
        .route("/health", get(handle_health))
        .route(
            "/Config/Settings",
            get(handle_settings).layer(tracked(GET_SETTINGS)),
        )
        .route("/actfast/stats", get(handle_stats).layer(tracked(GET_STATS)))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Handlers ---

async fn handle_root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "LaborPulse labor efficiency service",
        "version": VERSION,
    }))
}

async fn handle_active_labor_efficiency(
    State(state): State<AppState>,
    Query(params): Query<EfficiencyParams>,
) -> Result<Response, AppError> {
    let snapshot = state.driver.store().current().await;

    let (active_labor, empsnotclocked, timestamp, executiontime) = match snapshot.as_deref() {
        Some(snapshot) => {
            let labor = snapshot.active_labor.clone().unwrap_or_default();
            let unclocked = snapshot.not_clocked_in.clone().unwrap_or_default();
            let (labor, unclocked) = match params.opr_seq {
                Some(opr) => (
                    labor.into_iter().filter(|r| r.opr_seq == opr).collect(),
                    filter_by_opr_seq(&unclocked, opr),
                ),
                None => (labor, unclocked),
            };
            (
                labor,
                unclocked,
                Some(snapshot.timestamp),
                Some(snapshot.execution_time_secs),
            )
        }
        None => {
            warn!("Labor efficiency requested before any snapshot was published");
            (Vec::new(), Vec::new(), None, None)
        }
    };

    match params.format.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("json") => Ok(Json(EfficiencyResponse {
            active_labor,
            empsnotclocked,
            oprseq: params.opr_seq,
            timestamp,
            executiontime,
        })
        .into_response()),
        Some("csv") => {
            let body = efficiency_csv(&active_labor)?;
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"active_labor.csv\"",
                    ),
                ],
                body,
            )
                .into_response())
        }
        Some(other) => Err(AppError::UnknownFormat(other.to_string())),
    }
}

/// Efficiency records as CSV with the same column names as the JSON view.
pub fn efficiency_csv(records: &[EfficiencyRecord]) -> Result<String, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::CsvBuffer(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| AppError::CsvBuffer(e.to_string()))
}

async fn handle_emps_not_clocked(
    State(state): State<AppState>,
    Query(params): Query<NotClockedParams>,
) -> Json<Vec<NotClockedInRecord>> {
    let records = state.driver.store().not_clocked_in().await;
    let records = records.as_deref().map(Vec::as_slice).unwrap_or_default();
    match params.opr_seq {
        Some(opr) => Json(filter_by_opr_seq(records, opr)),
        None => Json(records.to_vec()),
    }
}

async fn handle_force_update(State(state): State<AppState>) -> Response {
    info!("Forced labor update requested");
    let started = Instant::now();
    let outcome = state.driver.run_pass().await;
    let body = ForcedUpdateResponse {
        message: "Forced Labor Update",
        executiontime: started.elapsed().as_secs_f64(),
        status: outcome.message(),
    };
    let status = match outcome {
        PassOutcome::Processed | PassOutcome::NoData => StatusCode::OK,
        PassOutcome::Skipped => StatusCode::CONFLICT,
        PassOutcome::Failed => StatusCode::BAD_GATEWAY,
    };
    (status, Json(body)).into_response()
}

async fn handle_execution_times(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.stats.execution_times())
}

async fn handle_scheduler_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.driver.scheduler_status().await)
}

async fn handle_health(State(state): State<AppState>) -> Response {
    if state.driver.is_task_alive() {
        (StatusCode::OK, Json(json!({ "status": "OK" }))).into_response()
    } else {
        error!("Health check failed: labor refresh task is not running");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "ERROR" })),
        )
            .into_response()
    }
}

async fn handle_settings(State(state): State<AppState>) -> Json<SettingsView> {
    Json(SettingsView {
        refresh_interval: state.driver.interval().as_secs(),
        dept_translate: state.driver.depts().table().clone(),
    })
}

async fn handle_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.stats.get_stats())
}
