use async_trait::async_trait;
use cyder_tools::log::{debug, warn};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::config::GatewayConfig;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway_unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("gateway_request_failed (status={0})")]
    Status(u16),
    #[error("gateway_invalid_json")]
    InvalidJson,
    #[error("{0}")]
    Rejected(String),
    #[error("gateway_invalid_url: {0}")]
    InvalidUrl(String),
}

/// Gateway ids and codes come back as strings or numbers.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_string))
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// A ticket as returned by the list and detail endpoints. Status, priority,
/// site and group are either names or objects carrying a name.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GatewayTicket {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub display_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub priority: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub service_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_user_contact_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_public_reply_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_time: Option<String>,
    #[serde(default)]
    pub requester: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub requester_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub requester_email: Option<String>,
    #[serde(default)]
    pub site: Option<Value>,
    #[serde(default)]
    pub group: Option<Value>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub technician_id: Option<i64>,
    #[serde(default)]
    pub sla: Option<Value>,
}

impl GatewayTicket {
    /// `last_user_contact_at`, else `last_public_reply_time`.
    pub fn last_contact(&self) -> Option<&str> {
        self.last_user_contact_at
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.last_public_reply_time.as_deref())
    }

    pub fn requester_field(&self, keys: &[&str]) -> Option<String> {
        let requester = self.requester.as_ref()?.as_object()?;
        keys.iter()
            .filter_map(|k| requester.get(*k))
            .find_map(|v| value_to_string(v).filter(|s| !s.is_empty()))
    }

    pub fn requester_display_name(&self) -> Option<String> {
        self.requester_field(&["name"])
            .or_else(|| self.requester_name.clone())
    }

    pub fn requester_email(&self) -> Option<String> {
        self.requester_field(&["email", "email_id"])
            .or_else(|| self.requester_email.clone())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GatewayEvent {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub event_id: Option<i64>,
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub event_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub author_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub author_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub visibility: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub old_value: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub new_value: Option<String>,
}

#[async_trait]
pub trait TicketGateway: Send + Sync {
    async fn get_assigned_requests(
        &self,
        technician_id: &str,
        statuses: &[String],
        priorities: &[String],
    ) -> Result<Vec<GatewayTicket>, GatewayError>;

    /// `None` when the gateway answers with an empty object.
    async fn get_request_detail(&self, ticket_id: &str) -> Result<Option<GatewayTicket>, GatewayError>;

    async fn get_request_history(&self, ticket_id: &str) -> Result<Vec<GatewayEvent>, GatewayError>;

    async fn post_internal_note(
        &self,
        ticket_id: &str,
        text: &str,
        technician_id: Option<&str>,
    ) -> Result<(), GatewayError>;
}

/// reqwest client for the ticketing gateway.
pub struct SdpGateway {
    client: reqwest::Client,
    base_url: String,
    client_name: String,
    api_key: String,
}

impl SdpGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(config.timeout()).build()?;
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| GatewayError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            client_name: config.client_name.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| GatewayError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("X-Cliente", &self.client_name)
            .header("X-Api-Key", &self.api_key)
    }

    /// Status is checked before the body is parsed.
    async fn read_json(resp: reqwest::Response) -> Result<Value, GatewayError> {
        let status = resp.status();
        if status != StatusCode::OK {
            warn!("gateway {} returned {}", resp.url().path(), status);
            return Err(GatewayError::Status(status.as_u16()));
        }
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|_| GatewayError::InvalidJson)
    }
}

fn error_field(data: &Map<String, Value>) -> Option<String> {
    data.get("error")
        .and_then(value_to_string)
        .filter(|s| !s.is_empty())
}

fn is_ok(data: &Map<String, Value>) -> bool {
    data.get("ok").and_then(Value::as_bool).unwrap_or(false)
}

fn parse_items<T: for<'de> Deserialize<'de>>(items: Vec<Value>) -> Vec<T> {
    items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect()
}

#[async_trait]
impl TicketGateway for SdpGateway {
    async fn get_assigned_requests(
        &self,
        technician_id: &str,
        statuses: &[String],
        priorities: &[String],
    ) -> Result<Vec<GatewayTicket>, GatewayError> {
        let mut params = vec![("technician_id", technician_id.to_string())];
        if !statuses.is_empty() {
            params.push(("status", statuses.join(",")));
        }
        if !priorities.is_empty() {
            params.push(("priority", priorities.join(",")));
        }
        let url = self.endpoint(&["request", "assigned"])?;
        let resp = self.get(url).query(&params).send().await?;
        let Value::Object(mut data) = Self::read_json(resp).await? else {
            return Err(GatewayError::Status(StatusCode::OK.as_u16()));
        };
        if !is_ok(&data) {
            return Err(GatewayError::Rejected(
                error_field(&data).unwrap_or_else(|| "gateway_error".to_string()),
            ));
        }
        let tickets = match data.remove("tickets") {
            Some(Value::Array(items)) => parse_items(items),
            _ => Vec::new(),
        };
        debug!("gateway returned {} assigned tickets", tickets.len());
        Ok(tickets)
    }

    async fn get_request_detail(&self, ticket_id: &str) -> Result<Option<GatewayTicket>, GatewayError> {
        let url = self.endpoint(&["request", ticket_id])?;
        let resp = self.get(url).send().await?;
        let Value::Object(mut data) = Self::read_json(resp).await? else {
            return Err(GatewayError::Status(StatusCode::OK.as_u16()));
        };
        let ticket = match data.remove("ticket") {
            Some(Value::Object(ticket)) => ticket,
            Some(other) => {
                data.insert("ticket".to_string(), other);
                data
            }
            None => data,
        };
        if ticket.is_empty() {
            return Ok(None);
        }
        serde_json::from_value(Value::Object(ticket))
            .map(Some)
            .map_err(|_| GatewayError::InvalidJson)
    }

    async fn get_request_history(&self, ticket_id: &str) -> Result<Vec<GatewayEvent>, GatewayError> {
        let url = self.endpoint(&["request", ticket_id, "history"])?;
        let resp = self.get(url).send().await?;
        let events = match Self::read_json(resp).await? {
            Value::Object(mut data) => match data.remove("events") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            Value::Array(items) => items,
            _ => Vec::new(),
        };
        Ok(parse_items(events))
    }

    async fn post_internal_note(
        &self,
        ticket_id: &str,
        text: &str,
        technician_id: Option<&str>,
    ) -> Result<(), GatewayError> {
        let mut payload = json!({ "text": text });
        if let Some(technician_id) = technician_id.filter(|t| !t.is_empty()) {
            payload["technician_id"] = json!(technician_id);
        }
        let url = self.endpoint(&["request", ticket_id, "note_internal"])?;
        let resp = self
            .client
            .post(url)
            .header("X-Cliente", &self.client_name)
            .header("X-Api-Key", &self.api_key)
            .json(&payload)
            .send()
            .await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        let data = serde_json::from_slice::<Value>(&bytes).ok();
        let rejected = |data: Option<&Value>| {
            data.and_then(Value::as_object)
                .and_then(error_field)
                .map(GatewayError::Rejected)
                .unwrap_or(GatewayError::Status(status.as_u16()))
        };
        if status != StatusCode::OK {
            warn!("gateway note for ticket {} returned {}", ticket_id, status);
            return Err(rejected(data.as_ref()));
        }
        match &data {
            None => Err(GatewayError::InvalidJson),
            Some(Value::Object(map)) if is_ok(map) => Ok(()),
            Some(other) => Err(rejected(Some(other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, Query},
        http::HeaderMap,
        response::IntoResponse,
        routing::{get, post},
        Json, Router,
    };
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get("X-Cliente").and_then(|v| v.to_str().ok()) == Some("copilot")
            && headers.get("X-Api-Key").and_then(|v| v.to_str().ok()) == Some("secret")
    }

    async fn spawn_gateway(notes: Arc<Mutex<Vec<Value>>>) -> String {
        let app = Router::new()
            .route(
                "/gw/request/assigned",
                get(|headers: HeaderMap, Query(q): Query<HashMap<String, String>>| async move {
                    if !authorized(&headers) {
                        return (StatusCode::UNAUTHORIZED, Json(json!({"ok": false}))).into_response();
                    }
                    match q.get("technician_id").map(String::as_str) {
                        Some("500") => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
                        Some("bad") => (StatusCode::OK, "not json").into_response(),
                        Some("refused") => Json(json!({"ok": false, "error": "technician_unknown"})).into_response(),
                        Some("silent") => Json(json!({"ok": false})).into_response(),
                        _ => Json(json!({
                            "ok": true,
                            "tickets": [
                                {"id": 101, "display_id": "REQ-101", "status": "Abierto", "service_code": 7},
                                {"id": "102", "priority": {"name": "P2"}},
                                "garbage"
                            ]
                        }))
                        .into_response(),
                    }
                }),
            )
            .route(
                "/gw/request/{id}",
                get(|Path(id): Path<String>| async move {
                    match id.as_str() {
                        "empty" => Json(json!({})).into_response(),
                        "wrapped" => Json(json!({"ok": true, "ticket": {"id": 5, "subject": "VPN"}})).into_response(),
                        "list" => Json(json!([1, 2])).into_response(),
                        _ => Json(json!({"id": id, "subject": "Impresora"})).into_response(),
                    }
                }),
            )
            .route(
                "/gw/request/{id}/history",
                get(|Path(id): Path<String>| async move {
                    match id.as_str() {
                        "bare" => Json(json!([{"event_id": "3", "text": "hola"}])).into_response(),
                        "odd" => Json(json!("nope")).into_response(),
                        _ => Json(json!({"ok": true, "events": [{"event_id": 1, "type": "reply"}]})).into_response(),
                    }
                }),
            )
            .route(
                "/gw/request/{id}/note_internal",
                post(move |Path(id): Path<String>, Json(body): Json<Value>| {
                    let notes = notes.clone();
                    async move {
                        match id.as_str() {
                            "rejected" => Json(json!({"ok": false, "error": "locked"})).into_response(),
                            "down" => (StatusCode::SERVICE_UNAVAILABLE, "maintenance").into_response(),
                            _ => {
                                notes.lock().unwrap().push(body);
                                Json(json!({"ok": true})).into_response()
                            }
                        }
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/gw/", addr)
    }

    fn gateway(base_url: String, api_key: &str) -> SdpGateway {
        SdpGateway::new(&GatewayConfig {
            base_url,
            client_name: "copilot".to_string(),
            api_key: api_key.to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_assigned_requests_and_errors() {
        let base = spawn_gateway(Arc::default()).await;
        let gw = gateway(base.clone(), "secret");

        let tickets = gw
            .get_assigned_requests("501", &["open".to_string(), "hold".to_string()], &[])
            .await
            .unwrap();
        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0].id.as_deref(), Some("101"));
        assert_eq!(tickets[0].service_code.as_deref(), Some("7"));
        assert_eq!(tickets[1].priority, Some(json!({"name": "P2"})));

        let err = gw.get_assigned_requests("500", &[], &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "gateway_request_failed (status=500)");
        let err = gw.get_assigned_requests("bad", &[], &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "gateway_invalid_json");
        let err = gw.get_assigned_requests("refused", &[], &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "technician_unknown");
        let err = gw.get_assigned_requests("silent", &[], &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "gateway_error");

        let err = gateway(base, "wrong").get_assigned_requests("501", &[], &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "gateway_request_failed (status=401)");
    }

    #[tokio::test]
    async fn test_detail_unwraps_ticket() {
        let gw = gateway(spawn_gateway(Arc::default()).await, "secret");

        let wrapped = gw.get_request_detail("wrapped").await.unwrap().unwrap();
        assert_eq!(wrapped.id.as_deref(), Some("5"));
        assert_eq!(wrapped.subject.as_deref(), Some("VPN"));
        let direct = gw.get_request_detail("77").await.unwrap().unwrap();
        assert_eq!(direct.id.as_deref(), Some("77"));
        assert!(gw.get_request_detail("empty").await.unwrap().is_none());
        assert!(gw.get_request_detail("list").await.is_err());
    }

    #[tokio::test]
    async fn test_history_shapes() {
        let gw = gateway(spawn_gateway(Arc::default()).await, "secret");

        let events = gw.get_request_history("10").await.unwrap();
        assert_eq!(events[0].event_id, Some(1));
        assert_eq!(events[0].event_type.as_deref(), Some("reply"));
        let events = gw.get_request_history("bare").await.unwrap();
        assert_eq!(events[0].event_id, Some(3));
        assert!(gw.get_request_history("odd").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_post_internal_note() {
        let notes = Arc::new(Mutex::new(Vec::new()));
        let gw = gateway(spawn_gateway(notes.clone()).await, "secret");

        gw.post_internal_note("10", "hola", Some("501")).await.unwrap();
        gw.post_internal_note("10", "sin técnico", None).await.unwrap();
        assert_eq!(
            *notes.lock().unwrap(),
            vec![
                json!({"text": "hola", "technician_id": "501"}),
                json!({"text": "sin técnico"})
            ]
        );

        let err = gw.post_internal_note("rejected", "x", None).await.unwrap_err();
        assert_eq!(err.to_string(), "locked");
        let err = gw.post_internal_note("down", "x", None).await.unwrap_err();
        assert_eq!(err.to_string(), "gateway_request_failed (status=503)");
    }
}
