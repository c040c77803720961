use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, routing::post, Json};
use cyder_tools::log::{error, info};
use serde::{Deserialize, Serialize};

use super::{fetch_detail, resolve_technician, BaseError};
use crate::database::ia_log::{IaLog, NewIaLog};
use crate::database::org_profile::OrgProfile;
use crate::database::persona_config::PersonaConfig;
use crate::database::services_catalog::ServiceCatalog;
use crate::service::app_state::{create_state_router, AppState, StateRouter};
use crate::service::gateway::{GatewayEvent, GatewayTicket};
use crate::service::llm::{prompt_chars, ChatMessage};
use crate::service::prompt::{
    build_interpret_prompt, build_reply_prompt, build_system_prompt, MessageType,
};
use crate::service::settings::RuntimeSettings;
use crate::utils::auth::CurrentUser;

#[derive(Debug, Deserialize)]
struct GenerateReplyRequest {
    ticket_id: String,
    message_type: MessageType,
    draft: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateReplyResponse {
    suggested_message: String,
}

#[derive(Debug, Deserialize)]
struct InterpretConversationRequest {
    ticket_id: String,
}

#[derive(Debug, Serialize)]
struct InterpretConversationResponse {
    suggestion: String,
}

/// Everything a prompt needs, loaded in the order the checks must fail.
struct PromptInputs {
    detail: GatewayTicket,
    history: Vec<GatewayEvent>,
    settings: RuntimeSettings,
    system_prompt: String,
}

async fn load_inputs(app_state: &AppState, ticket_id: &str) -> Result<PromptInputs, BaseError> {
    let detail = fetch_detail(app_state, ticket_id).await?;
    let history = app_state.gateway.get_request_history(ticket_id).await?;
    let settings = RuntimeSettings::load(&app_state.db)?;
    let persona = PersonaConfig::get_active(&app_state.db)?
        .ok_or(BaseError::Configuration(BaseError::detail("persona_not_configured")))?;
    let org = OrgProfile::get_current(&app_state.db)?
        .ok_or(BaseError::Configuration(BaseError::detail("org_profile_not_configured")))?;
    Ok(PromptInputs {
        detail,
        history,
        settings,
        system_prompt: build_system_prompt(&persona, &org),
    })
}

/// Runs one completion and records it in `ia_logs` whatever the outcome.
async fn complete_and_log(
    app_state: &AppState,
    user: &CurrentUser,
    ticket_id: &str,
    operation: &str,
    message_type: &str,
    messages: Vec<ChatMessage>,
    settings: &RuntimeSettings,
) -> Result<String, BaseError> {
    let llm = app_state.llm()?;
    let mut entry = NewIaLog {
        user_upn: user.0.clone(),
        ticket_id: ticket_id.to_string(),
        operation: operation.to_string(),
        message_type: Some(message_type.to_string()),
        model: Some(llm.model().to_string()),
        prompt_chars: i32::try_from(prompt_chars(&messages)).unwrap_or(i32::MAX),
        ..Default::default()
    };

    let started = Instant::now();
    let result = llm
        .complete(&messages, settings.temperature(), settings.max_tokens())
        .await;
    entry.latency_ms = i32::try_from(started.elapsed().as_millis()).unwrap_or(i32::MAX);

    match result {
        Ok(reply) => {
            entry.success = true;
            entry.response_chars = Some(i32::try_from(reply.chars().count()).unwrap_or(i32::MAX));
            IaLog::insert(&app_state.db, &entry)?;
            info!(
                "{} for ticket {} took {}ms",
                operation, ticket_id, entry.latency_ms
            );
            Ok(reply)
        }
        Err(err) => {
            error!(
                "{} for ticket {} failed after {}ms: {}",
                operation, ticket_id, entry.latency_ms, err
            );
            entry.error_message = Some(err.to_string());
            // The provider error is what the caller needs to see.
            if let Err(log_err) = IaLog::insert(&app_state.db, &entry) {
                error!("ia log for ticket {} not written: {}", ticket_id, log_err);
            }
            Err(BaseError::BadGateway(BaseError::detail("ia_provider_error")))
        }
    }
}

async fn generate_reply(
    State(app_state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<GenerateReplyRequest>,
) -> Result<Json<GenerateReplyResponse>, BaseError> {
    resolve_technician(&app_state, &user)?;
    app_state.llm()?;
    let inputs = load_inputs(&app_state, &req.ticket_id).await?;
    let service = match inputs.detail.service_code.as_deref().filter(|c| !c.is_empty()) {
        Some(code) => ServiceCatalog::get_by_code(&app_state.db, code)?,
        None => None,
    };
    let user_prompt = build_reply_prompt(
        &inputs.detail,
        &inputs.history,
        service.as_ref(),
        &inputs.settings,
        req.message_type,
        req.draft.as_deref(),
    );
    let messages = vec![
        ChatMessage::system(inputs.system_prompt),
        ChatMessage::user(user_prompt),
    ];
    let suggested_message = complete_and_log(
        &app_state,
        &user,
        &req.ticket_id,
        "generate_reply",
        req.message_type.as_ref(),
        messages,
        &inputs.settings,
    )
    .await?;
    Ok(Json(GenerateReplyResponse { suggested_message }))
}

async fn interpret_conversation(
    State(app_state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<InterpretConversationRequest>,
) -> Result<Json<InterpretConversationResponse>, BaseError> {
    resolve_technician(&app_state, &user)?;
    app_state.llm()?;
    let inputs = load_inputs(&app_state, &req.ticket_id).await?;
    let user_prompt = build_interpret_prompt(&inputs.detail, &inputs.history, &inputs.settings);
    let messages = vec![
        ChatMessage::system(inputs.system_prompt),
        ChatMessage::user(user_prompt),
    ];
    let suggestion = complete_and_log(
        &app_state,
        &user,
        &req.ticket_id,
        "interpret_conversation",
        "interpretacion",
        messages,
        &inputs.settings,
    )
    .await?;
    Ok(Json(InterpretConversationResponse { suggestion }))
}

pub fn create_ia_router() -> StateRouter {
    create_state_router().nest(
        "/ia",
        create_state_router()
            .route("/generate_reply", post(generate_reply))
            .route("/interpret_conversation", post(interpret_conversation)),
    )
}
