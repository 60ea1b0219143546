use axum::extract::State;
use axum::response::Json;

use crate::config::AppState;

pub async fn metadata(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(state.metadata.as_ref()).expect("metadata is always serializable"))
}

pub async fn jwks(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.keys.public_jwks())
}
