use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json,
};
use chrono::Utc;
use cyder_tools::log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{fetch_detail, resolve_technician, BaseError};
use crate::database::services_catalog::ServiceCatalog;
use crate::database::ticket_flags::{TicketFlags, TicketObservation};
use crate::service::app_state::{create_state_router, AppState, StateRouter};
use crate::service::settings::{review_expiry, RuntimeSettings};
use crate::utils::auth::CurrentUser;
use crate::utils::review_token;
use crate::utils::sla::{
    compute_silence, extract_name, format_datetime, normalize_datetime, parse_datetime,
    select_comm_sla,
};

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    /// Comma separated status filter forwarded to the gateway.
    status: Option<String>,
    priority: Option<String>,
}

fn split_filter(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Serialize)]
struct TicketItem {
    id: String,
    display_id: String,
    subject: Option<String>,
    status: Option<String>,
    priority: Option<String>,
    service_code: Option<String>,
    last_user_contact_at: Option<String>,
    hours_since_last_user_contact: Option<f64>,
    communication_sla_hours: f64,
    is_silent: bool,
    experience_review_requested: bool,
}

#[derive(Debug, Serialize)]
struct TicketsResponse {
    tickets: Vec<TicketItem>,
}

async fn list_tickets(
    State(app_state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<TicketsResponse>, BaseError> {
    let mapping = resolve_technician(&app_state, &user)?;
    let tickets = app_state
        .gateway
        .get_assigned_requests(
            &mapping.technician_id_sdp,
            &split_filter(query.status.as_deref()),
            &split_filter(query.priority.as_deref()),
        )
        .await
        .inspect_err(|e| warn!("assigned tickets for {} failed: {}", user.0, e))?;

    // The list uses the global SLA only. Per-service SLAs are a detail concern.
    let settings = RuntimeSettings::load(&app_state.db)?;
    let sla_hours = settings.comm_sla_default_hours(&app_state.config);
    let now = Utc::now();

    let mut items = Vec::with_capacity(tickets.len());
    let mut observations = Vec::with_capacity(tickets.len());
    for ticket in tickets {
        let Some(id) = ticket.id.clone().filter(|id| !id.is_empty()) else {
            warn!("skipping assigned ticket without id");
            continue;
        };
        let last_contact = parse_datetime(ticket.last_contact());
        let silence = compute_silence(last_contact, sla_hours, now);
        let status = extract_name(ticket.status.as_ref());
        let priority = extract_name(ticket.priority.as_ref());
        observations.push(TicketObservation {
            ticket_id: id.clone(),
            display_id: ticket.display_id.clone(),
            service_code: ticket.service_code.clone(),
            priority: priority.clone(),
            status: status.clone(),
            last_user_contact_at: last_contact.map(|dt| dt.timestamp_millis()),
            hours_since_last_user_contact: silence.hours_since_last_user_contact,
            communication_sla_hours: Some(silence.communication_sla_hours),
            is_silent: silence.is_silent,
        });
        items.push(TicketItem {
            display_id: ticket.display_id.filter(|d| !d.is_empty()).unwrap_or_else(|| id.clone()),
            id,
            subject: ticket.subject,
            status,
            priority,
            service_code: ticket.service_code,
            last_user_contact_at: last_contact.map(format_datetime),
            hours_since_last_user_contact: silence.hours_since_last_user_contact,
            communication_sla_hours: silence.communication_sla_hours,
            is_silent: silence.is_silent,
            experience_review_requested: false,
        });
    }

    let rows = TicketFlags::upsert_many(&app_state.db, &observations)?;
    for (item, row) in items.iter_mut().zip(rows) {
        item.experience_review_requested = row.experience_review_requested;
    }
    Ok(Json(TicketsResponse { tickets: items }))
}

#[derive(Debug, Serialize)]
struct ServiceItem {
    service_code: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    short_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comm_sla_p1_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comm_sla_p2_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comm_sla_p3_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comm_sla_p4_hours: Option<f64>,
}

impl From<ServiceCatalog> for ServiceItem {
    fn from(s: ServiceCatalog) -> Self {
        Self {
            service_code: s.service_code,
            name: s.name,
            short_description: s.short_description,
            comm_sla_p1_hours: s.comm_sla_p1_hours,
            comm_sla_p2_hours: s.comm_sla_p2_hours,
            comm_sla_p3_hours: s.comm_sla_p3_hours,
            comm_sla_p4_hours: s.comm_sla_p4_hours,
        }
    }
}

#[derive(Debug, Serialize)]
struct TicketDetail {
    id: String,
    display_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    requester: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    site: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    technician_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sla: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<ServiceItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_user_contact_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hours_since_last_user_contact: Option<f64>,
    communication_sla_hours: f64,
    is_silent: bool,
    experience_review_requested: bool,
}

async fn ticket_detail(
    State(app_state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(ticket_id): Path<String>,
) -> Result<Json<TicketDetail>, BaseError> {
    resolve_technician(&app_state, &user)?;
    let detail = fetch_detail(&app_state, &ticket_id).await?;

    let id = detail.id.clone().filter(|id| !id.is_empty()).unwrap_or(ticket_id);
    let display_id = detail
        .display_id
        .clone()
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| id.clone());
    let service_code = detail.service_code.clone().filter(|c| !c.trim().is_empty());
    let service = match &service_code {
        Some(code) => ServiceCatalog::get_by_code_ignore_case(&app_state.db, code.trim())?,
        None => None,
    };
    let status = extract_name(detail.status.as_ref());
    let priority = extract_name(detail.priority.as_ref());

    let settings = RuntimeSettings::load(&app_state.db)?;
    let sla_hours = select_comm_sla(
        service.as_ref(),
        priority.as_deref(),
        settings.comm_sla_default_hours(&app_state.config),
    );
    let last_contact = parse_datetime(detail.last_contact());
    let silence = compute_silence(last_contact, sla_hours, Utc::now());

    let flags = TicketFlags::upsert_observation(
        &app_state.db,
        &TicketObservation {
            ticket_id: id.clone(),
            display_id: Some(display_id.clone()),
            service_code: service_code.clone(),
            priority: priority.clone(),
            status: status.clone(),
            last_user_contact_at: last_contact.map(|dt| dt.timestamp_millis()),
            hours_since_last_user_contact: silence.hours_since_last_user_contact,
            communication_sla_hours: Some(silence.communication_sla_hours),
            is_silent: silence.is_silent,
        },
    )?;

    Ok(Json(TicketDetail {
        id,
        display_id,
        subject: detail.subject,
        description: detail.description,
        requester: detail.requester,
        status,
        priority,
        site: extract_name(detail.site.as_ref()),
        group: extract_name(detail.group.as_ref()),
        technician_id: detail.technician_id,
        created_time: normalize_datetime(detail.created_time.as_deref()),
        sla: detail.sla,
        service_code,
        service: service.map(ServiceItem::from),
        last_user_contact_at: last_contact.map(format_datetime),
        hours_since_last_user_contact: silence.hours_since_last_user_contact,
        communication_sla_hours: silence.communication_sla_hours,
        is_silent: silence.is_silent,
        experience_review_requested: flags.experience_review_requested,
    }))
}

#[derive(Debug, Serialize)]
struct HistoryEvent {
    event_id: Option<i64>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    author_name: Option<String>,
    author_type: Option<String>,
    visibility: Option<String>,
    timestamp: Option<String>,
    text: Option<String>,
    old_value: Option<String>,
    new_value: Option<String>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    events: Vec<HistoryEvent>,
}

/// Needs an identity but no technician mapping.
async fn ticket_history(
    State(app_state): State<Arc<AppState>>,
    _user: CurrentUser,
    Path(ticket_id): Path<String>,
) -> Result<Json<HistoryResponse>, BaseError> {
    let mut events = app_state
        .gateway
        .get_request_history(&ticket_id)
        .await
        .inspect_err(|e| warn!("history for ticket {} failed: {}", ticket_id, e))?;
    // Stable sort; unparseable timestamps go first.
    events.sort_by_key(|e| parse_datetime(e.timestamp.as_deref()).map_or(0, |dt| dt.timestamp_millis()));
    let events = events
        .into_iter()
        .map(|e| HistoryEvent {
            event_id: e.event_id,
            event_type: e.event_type,
            author_name: e.author_name,
            author_type: e.author_type,
            visibility: e.visibility,
            timestamp: normalize_datetime(e.timestamp.as_deref()),
            text: e.text,
            old_value: e.old_value,
            new_value: e.new_value,
        })
        .collect();
    Ok(Json(HistoryResponse { events }))
}

#[derive(Debug, Serialize)]
struct ReviewLinkResponse {
    ticket_id: String,
    token: String,
    url: String,
    expires_at: String,
    emailed: bool,
}

fn review_url(base: &str, token: &str) -> Result<String, BaseError> {
    let query = serde_urlencoded::to_string([("token", token)])
        .map_err(|e| BaseError::ParamInvalid(Some(e.to_string())))?;
    let separator = if base.contains('?') { '&' } else { '?' };
    Ok(format!("{}{}{}", base, separator, query))
}

fn review_email(requester: Option<&str>, display_id: &str, url: &str, ttl_hours: i64) -> (String, String, String) {
    let greeting = match requester {
        Some(name) => format!("Hola {},", name),
        None => "Hola,".to_string(),
    };
    let subject = format!("Revisión de su experiencia con el ticket {}", display_id);
    let plain = format!(
        "{}\n\nSi desea solicitar una revisión de la atención recibida en el ticket {}, ingrese al siguiente enlace:\n{}\n\nEl enlace vence en {} horas.",
        greeting, display_id, url, ttl_hours
    );
    let html = format!(
        "<p>{}</p><p>Si desea solicitar una revisión de la atención recibida en el ticket {}, ingrese al siguiente enlace:</p><p><a href=\"{}\">{}</a></p><p>El enlace vence en {} horas.</p>",
        greeting, display_id, url, url, ttl_hours
    );
    (subject, plain, html)
}

async fn issue_review_link(
    State(app_state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(ticket_id): Path<String>,
) -> Result<Json<ReviewLinkResponse>, BaseError> {
    resolve_technician(&app_state, &user)?;
    let settings = RuntimeSettings::load(&app_state.db)?;
    let review = settings.review(&app_state.config)?;
    let detail = fetch_detail(&app_state, &ticket_id).await?;

    let now = Utc::now();
    let token = review_token::generate_at(&ticket_id, &review.secret, review.ttl_hours, now.timestamp())?;
    let url = review_url(&review.link_base_url, &token)?;
    let expires_at = review_expiry(now, review.ttl_hours)
        .map(format_datetime)
        .ok_or(BaseError::Configuration(BaseError::detail("review_ttl_invalid")))?;

    let mut emailed = false;
    match (detail.requester_email(), app_state.mail_sender(&settings).await?) {
        (Some(email), Some(sender)) => {
            let display_id = detail.display_id.as_deref().unwrap_or(&ticket_id);
            let requester = detail.requester_display_name();
            let (subject, plain, html) =
                review_email(requester.as_deref(), display_id, &url, review.ttl_hours);
            sender.send(&[email], &subject, &plain, Some(&html)).await?;
            info!("review link for ticket {} sent via {}", ticket_id, sender.transport());
            emailed = true;
        }
        (None, _) => info!("ticket {} has no requester email, link not sent", ticket_id),
        (_, None) => info!("mail is not configured, review link for ticket {} not sent", ticket_id),
    }

    Ok(Json(ReviewLinkResponse {
        ticket_id,
        token,
        url,
        expires_at,
        emailed,
    }))
}

pub fn create_ticket_router() -> StateRouter {
    create_state_router()
        .route("/tickets", get(list_tickets))
        .route("/tickets/{id}", get(ticket_detail))
        .route("/tickets/{id}/history", get(ticket_history))
        .route("/tickets/{id}/review_link", post(issue_review_link))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_filter() {
        assert_eq!(split_filter(Some("Abierto, En espera,,")), vec!["Abierto", "En espera"]);
        assert!(split_filter(None).is_empty());
    }

    #[test]
    fn test_review_url_separator() {
        assert_eq!(
            review_url("https://portal/review", "abc.def").unwrap(),
            "https://portal/review?token=abc.def"
        );
        assert_eq!(
            review_url("https://portal/review?lang=es", "abc").unwrap(),
            "https://portal/review?lang=es&token=abc"
        );
    }
}
