use anyhow::{Context, Result};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::metrics::metrics_handler;
use super::requests_logging::log_requests;
use super::state::{GuardedCatalogStore, OptionalSchedulerHandle, ServerState};
use crate::admission::{AdmissionError, CarNameAdmission};

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub catalog_entries: usize,
}

#[derive(Serialize)]
struct ErrorBody {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Deserialize, Debug)]
struct PageParams {
    pub page: Option<usize>,
    pub size: Option<usize>,
}

#[derive(Deserialize, Debug)]
struct CheckParams {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
}

async fn home(State(state): State<ServerState>) -> Response {
    match state.catalog_store.count() {
        Ok(catalog_entries) => Json(ServerStats {
            uptime: format_uptime(state.start_time.elapsed()),
            catalog_entries,
        })
        .into_response(),
        Err(err) => {
            error!("Failed to count catalog entries: {:#}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn list_car_names(
    State(catalog_store): State<GuardedCatalogStore>,
    Query(params): Query<PageParams>,
) -> Response {
    let page = params.page.unwrap_or(0);
    let size = params
        .size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    match catalog_store.list(page, size) {
        Ok(page) => Json(page).into_response(),
        Err(err) => {
            error!("Failed to list car names: {:#}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list car names")
        }
    }
}

async fn check_car_name(
    State(admission): State<CarNameAdmission>,
    Query(params): Query<CheckParams>,
) -> Response {
    let manufacturer = params.manufacturer.unwrap_or_default();
    let model = params.model.unwrap_or_default();

    match admission.admit(&manufacturer, &model) {
        Ok(entry) => Json(entry).into_response(),
        Err(err @ AdmissionError::BlankName) => {
            error_response(StatusCode::BAD_REQUEST, err.to_string())
        }
        Err(err @ AdmissionError::UnknownCarName) => {
            error_response(StatusCode::NOT_FOUND, err.to_string())
        }
        Err(err @ AdmissionError::Lookup(_)) => {
            error!("{}", err);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to look up car name",
            )
        }
    }
}

async fn list_jobs(State(scheduler_handle): State<OptionalSchedulerHandle>) -> Response {
    match scheduler_handle {
        Some(handle) => Json(handle.list_jobs().await).into_response(),
        None => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Background jobs are not running",
        ),
    }
}

pub fn make_app(state: ServerState) -> Router {
    let info_routes: Router<ServerState> = Router::new()
        .route("/car-names", get(list_car_names))
        .route("/car-names/check", get(check_car_name));

    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/jobs", get(list_jobs))
        .nest("/api/v1/info", info_routes)
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state)
}

/// Serves the app on an already bound listener until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    state: ServerState,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = make_app(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed")
}

pub async fn run_server(state: ServerState, shutdown: CancellationToken) -> Result<()> {
    let port = state.config.port;
    let listener = TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Info server listening on port {}", port);

    serve(listener, state, shutdown).await
}
