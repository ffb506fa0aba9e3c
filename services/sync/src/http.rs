use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::trace::TraceLayer;

use strata_common::types::ServiceInfo;

use crate::service::ConnectorService;

pub const SERVICE_NAME: &str = "strata-sync";

#[derive(Clone)]
pub struct AppState {
    pub service: ConnectorService,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.service.health_status();
    let code = if status.running {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

async fn info() -> Json<ServiceInfo> {
    Json(ServiceInfo::new(SERVICE_NAME))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.service.metrics().encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response()
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
