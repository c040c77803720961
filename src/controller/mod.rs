use axum::{http, middleware, response::IntoResponse};
use cyder_tools::log::warn;
use tower_http::cors::CorsLayer;

use crate::database::technician_mapping::TechnicianMapping;
use crate::service::app_state::{create_state_router, AppState, StateRouter};
use crate::service::gateway::GatewayTicket;
use crate::utils::auth::{authorization_identity_middleware, CurrentUser};
use experience::create_experience_router;
use health::create_health_router;
use ia::create_ia_router;
use me::create_me_router;
use ticket::create_ticket_router;

mod error;
mod experience;
mod health;
mod ia;
mod me;
mod ticket;

pub use error::BaseError;

pub fn create_router() -> StateRouter {
    let api_router = create_state_router().nest(
        "/api",
        create_state_router()
            .merge(create_me_router())
            .merge(create_ticket_router())
            .merge(create_ia_router())
            .layer(middleware::from_fn(authorization_identity_middleware))
            .merge(create_experience_router()),
    );

    create_state_router()
        .merge(create_health_router())
        .merge(api_router)
        .fallback(handle_404)
        .layer(CorsLayer::permissive())
}

pub async fn handle_404() -> impl IntoResponse {
    (http::StatusCode::NOT_FOUND, "not found")
}

/// The active technician mapping of the caller, or 403 `user_not_configured`.
pub(crate) fn resolve_technician(
    app_state: &AppState,
    user: &CurrentUser,
) -> Result<TechnicianMapping, BaseError> {
    TechnicianMapping::get_active_by_upn(&app_state.db, &user.0)?.ok_or_else(|| {
        warn!("no active technician mapping for {}", user.0);
        BaseError::Forbidden(BaseError::detail("user_not_configured"))
    })
}

/// Gateway ticket detail. An empty gateway object is a 404.
pub(crate) async fn fetch_detail(
    app_state: &AppState,
    ticket_id: &str,
) -> Result<GatewayTicket, BaseError> {
    app_state
        .gateway
        .get_request_detail(ticket_id)
        .await
        .inspect_err(|e| warn!("detail for ticket {} failed: {}", ticket_id, e))?
        .ok_or(BaseError::NotFound(BaseError::detail("ticket_not_found")))
}
