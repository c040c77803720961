//! Public endpoints behind the "service experience review" link. The signed
//! token is the only credential.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json,
};
use cyder_tools::log::{info, warn};
use serde::{Deserialize, Serialize};

use super::BaseError;
use crate::database::ticket_flags::TicketFlags;
use crate::service::app_state::{create_state_router, AppState, StateRouter};
use crate::service::settings::RuntimeSettings;
use crate::utils::review_token::{self, ReviewClaims};

#[derive(Debug, Deserialize)]
struct ValidateQuery {
    token: String,
}

#[derive(Debug, Serialize)]
struct ValidateResponse {
    valid: bool,
    ticket_id: String,
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    token: String,
    reason: String,
    comment: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    ok: bool,
}

fn decode_token(app_state: &AppState, token: &str) -> Result<ReviewClaims, BaseError> {
    let settings = RuntimeSettings::load(&app_state.db)?;
    let review = settings.review(&app_state.config)?;
    let claims = review_token::decode(token, &review.secret)?;
    if claims.ticket_id.is_empty() {
        return Err(BaseError::ParamInvalid(BaseError::detail("invalid_token")));
    }
    Ok(claims)
}

fn review_note(reason: &str, comment: Option<&str>) -> String {
    let mut note = format!("Usuario solicitó revisión de experiencia. Motivo: {}", reason);
    if let Some(comment) = comment.filter(|c| !c.is_empty()) {
        note.push_str(" | Comentario: ");
        note.push_str(comment);
    }
    note
}

async fn validate_token(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<ValidateQuery>,
) -> Result<Json<ValidateResponse>, BaseError> {
    let claims = decode_token(&app_state, &query.token)?;
    Ok(Json(ValidateResponse {
        valid: true,
        ticket_id: claims.ticket_id,
    }))
}

async fn submit_review(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, BaseError> {
    let claims = decode_token(&app_state, &body.token)?;
    let note = review_note(&body.reason, body.comment.as_deref());
    // The note is posted as the gateway's own bot user.
    app_state
        .gateway
        .post_internal_note(&claims.ticket_id, &note, None)
        .await
        .inspect_err(|e| warn!("review note for ticket {} failed: {}", claims.ticket_id, e))?;
    TicketFlags::mark_review_requested(&app_state.db, &claims.ticket_id)?;
    info!("experience review requested for ticket {}", claims.ticket_id);
    Ok(Json(SubmitResponse { ok: true }))
}

pub fn create_experience_router() -> StateRouter {
    create_state_router().nest(
        "/experience",
        create_state_router()
            .route("/review/validate", get(validate_token))
            .route("/review/submit", post(submit_review)),
    )
}
