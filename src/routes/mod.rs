// HTTP routes: the agent-facing collector calls (JSON) plus /version.

mod http;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::collector::Collector;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) collector: Arc<Collector>,
}

pub fn app(collector: Arc<Collector>) -> Router {
    let state = AppState { collector };
    Router::new()
        .route("/version", get(http::version_handler)) // GET /version
        .route("/v1/init", post(http::init_handler)) // POST /v1/init
        .route("/v1/aggregates", post(http::aggregates_handler)) // POST /v1/aggregates
        .route("/v1/gauge-values", post(http::gauge_values_handler)) // POST /v1/gauge-values
        .route("/v1/traces", post(http::trace_handler)) // POST /v1/traces
        .route("/v1/log", post(http::log_handler)) // POST /v1/log
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
