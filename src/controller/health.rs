use std::sync::Arc;

use axum::{extract::State, routing::get, Json};
use cyder_tools::log::warn;
use serde_json::{json, Value};

use super::BaseError;
use crate::service::app_state::{create_state_router, AppState, StateRouter};

async fn root() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn health(State(app_state): State<Arc<AppState>>) -> Result<Json<Value>, BaseError> {
    app_state.db.ping().map_err(|err| {
        warn!("health check failed: {}", err);
        BaseError::ServiceUnavailable(BaseError::detail("database_unavailable"))
    })?;
    Ok(Json(json!({ "status": "ok" })))
}

pub fn create_health_router() -> StateRouter {
    create_state_router()
        .route("/", get(root))
        .route("/health", get(health))
}
