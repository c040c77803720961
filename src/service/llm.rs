use async_trait::async_trait;
use cyder_tools::log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LlmConfig;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider returned an unreadable body: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A single chat-completion call. No retries and no streaming.
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    /// Deployment or model name recorded in the IA log.
    fn model(&self) -> &str;

    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

pub struct AzureChatClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    deployment: String,
}

impl AzureChatClient {
    /// `Ok(None)` when the endpoint or key is missing.
    pub fn from_config(config: &LlmConfig) -> Result<Option<Self>, LlmError> {
        let (Some(endpoint), Some(api_key)) = (&config.endpoint, &config.api_key) else {
            return Ok(None);
        };
        if !config.is_configured() {
            return Ok(None);
        }
        let client = reqwest::Client::builder().timeout(config.timeout()).build()?;
        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            endpoint.trim_end_matches('/'),
            config.deployment,
            config.api_version
        );
        Ok(Some(Self {
            client,
            url,
            api_key: api_key.clone(),
            deployment: config.deployment.clone(),
        }))
    }
}

#[async_trait]
impl ChatCompleter for AzureChatClient {
    fn model(&self) -> &str {
        &self.deployment
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let body = ChatRequest {
            messages,
            temperature,
            max_tokens,
        };
        debug!("chat completion on {} with {} messages", self.deployment, messages.len());
        let resp = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default())
    }
}

/// Character count of a prompt, as logged.
pub fn prompt_chars(messages: &[ChatMessage]) -> usize {
    messages.iter().map(|m| m.content.chars().count()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, http::HeaderMap, routing::post, Json, Router};
    use reqwest::StatusCode;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn spawn_provider() -> String {
        let app = Router::new().route(
            "/openai/deployments/{deployment}/chat/completions",
            post(
                |headers: HeaderMap, Query(q): Query<HashMap<String, String>>, Json(body): Json<Value>| async move {
                    if headers.get("api-key").and_then(|v| v.to_str().ok()) != Some("k") {
                        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
                    }
                    if body["max_tokens"] == json!(1) {
                        return (StatusCode::OK, Json(json!({"choices": []})));
                    }
                    let reply = format!(
                        "{}|{}|{}",
                        q.get("api-version").cloned().unwrap_or_default(),
                        body["messages"].as_array().map(|m| m.len()).unwrap_or(0),
                        body["temperature"]
                    );
                    (StatusCode::OK, Json(json!({"choices": [{"message": {"content": reply}}]})))
                },
            ),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    fn config(endpoint: Option<String>, api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            endpoint,
            api_key: api_key.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_unconfigured_client_is_none() {
        assert!(AzureChatClient::from_config(&config(None, Some("k"))).unwrap().is_none());
        assert!(AzureChatClient::from_config(&config(Some("http://x".into()), None)).unwrap().is_none());
        assert!(AzureChatClient::from_config(&config(Some("http://x".into()), Some(""))).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_completion_round_trip() {
        let endpoint = spawn_provider().await;
        let client = AzureChatClient::from_config(&config(Some(endpoint.clone()), Some("k")))
            .unwrap()
            .unwrap();
        assert_eq!(client.model(), "gpt-4o-mini");

        let messages = [ChatMessage::system("sys"), ChatMessage::user("hola")];
        let reply = client.complete(&messages, 0.3, 400).await.unwrap();
        assert_eq!(reply, "2024-02-15-preview|2|0.3");

        let empty = client.complete(&messages, 0.3, 1).await.unwrap();
        assert_eq!(empty, "");

        let bad = AzureChatClient::from_config(&config(Some(endpoint), Some("nope")))
            .unwrap()
            .unwrap();
        let err = bad.complete(&messages, 0.3, 400).await.unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 401, .. }));
    }

    #[test]
    fn test_prompt_chars_counts_characters() {
        let messages = [ChatMessage::system("ñandú"), ChatMessage::user("abc")];
        assert_eq!(prompt_chars(&messages), 8);
    }
}
