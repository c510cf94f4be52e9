// Collector call handlers. A failed write answers 503 so the agent retries the
// batch; a malformed batch answers 400.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::warn;

use super::AppState;
use crate::error::CollectorError;
use crate::models::{
    AggregateMessage, GaugeValueMessage, InitMessage, InitResponse, LogMessage, TraceMessage,
};

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

pub(super) struct ApiError(CollectorError);

impl From<CollectorError> for ApiError {
    fn from(e: CollectorError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_retryable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::BAD_REQUEST
        };
        warn!(status = status.as_u16(), error = %self.0, "collector call failed");
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// POST /v1/init: registers the agent; the body carries the stored config
/// when it differs from the declared one.
pub(super) async fn init_handler(
    State(state): State<AppState>,
    Json(msg): Json<InitMessage>,
) -> Result<Json<InitResponse>, ApiError> {
    let agent_config = state
        .collector
        .collect_init(&msg.agent_id, &msg.environment, &msg.agent_config)
        .await?;
    Ok(Json(InitResponse { agent_config }))
}

pub(super) async fn aggregates_handler(
    State(state): State<AppState>,
    Json(msg): Json<AggregateMessage>,
) -> Result<StatusCode, ApiError> {
    state
        .collector
        .collect_aggregates(
            &msg.agent_id,
            msg.capture_time,
            &msg.aggregates_by_type,
            &msg.shared_query_texts,
        )
        .await?;
    Ok(StatusCode::OK)
}

pub(super) async fn gauge_values_handler(
    State(state): State<AppState>,
    Json(msg): Json<GaugeValueMessage>,
) -> Result<StatusCode, ApiError> {
    state
        .collector
        .collect_gauge_values(&msg.agent_id, &msg.gauge_values)
        .await?;
    Ok(StatusCode::OK)
}

pub(super) async fn trace_handler(
    State(state): State<AppState>,
    Json(msg): Json<TraceMessage>,
) -> Result<StatusCode, ApiError> {
    state.collector.collect_trace(&msg.agent_id, msg.trace).await?;
    Ok(StatusCode::OK)
}

pub(super) async fn log_handler(
    State(state): State<AppState>,
    Json(msg): Json<LogMessage>,
) -> StatusCode {
    state.collector.log(&msg.agent_id, &msg.log_event);
    StatusCode::OK
}
