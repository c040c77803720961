use std::sync::Arc;

use axum::{extract::State, routing::get, Json};
use serde::Serialize;

use super::{resolve_technician, BaseError};
use crate::service::app_state::{create_state_router, AppState, StateRouter};
use crate::utils::auth::CurrentUser;

#[derive(Debug, Serialize)]
struct MeResponse {
    user_upn: String,
    display_name: String,
    technician_id_sdp: String,
}

async fn get_me(
    State(app_state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<MeResponse>, BaseError> {
    let mapping = resolve_technician(&app_state, &user)?;
    Ok(Json(MeResponse {
        user_upn: mapping.user_upn,
        // Display names are not resolved from a directory yet.
        display_name: user.0,
        technician_id_sdp: mapping.technician_id_sdp,
    }))
}

pub fn create_me_router() -> StateRouter {
    create_state_router().route("/me", get(get_me))
}
