use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{state::AppState, websocket::websocket_upgrade};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    online_users: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let online_users = state.broker().presence().online_count().await;
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            online_users,
        }),
    )
}
