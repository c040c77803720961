//! Outbound mail through SMTP (basic auth or XOAUTH2) or Microsoft Graph.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cyder_tools::log::{debug, info};
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{Message, SmtpTransport, Transport};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::MailConfig;

const SEND_TIMEOUT: Duration = Duration::from_secs(15);
const TOKEN_TIMEOUT: Duration = Duration::from_secs(10);
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

const AUTHORITY: &str = "https://login.microsoftonline.com";
const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
const SMTP_SCOPE: &str = "https://outlook.office365.com/.default";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

#[derive(Debug, Error)]
pub enum EmailSendError {
    #[error("no_recipients")]
    NoRecipients,
    #[error("invalid_message: {0}")]
    Message(String),
    #[error("oauth_token_error: {0}")]
    Token(String),
    #[error("mail transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("graph_send_error {status}: {body}")]
    Graph { status: u16, body: String },
    #[error("smtp_send_error: {0}")]
    Smtp(String),
}

#[async_trait]
pub trait MailSender: Send + Sync {
    /// Short backend name for logs.
    fn transport(&self) -> &'static str;

    async fn send(
        &self,
        to: &[String],
        subject: &str,
        plain_body: &str,
        html_body: Option<&str>,
    ) -> Result<(), EmailSendError>;
}

fn clean_recipients(to: &[String]) -> Result<Vec<&str>, EmailSendError> {
    let recipients: Vec<&str> = to.iter().map(|r| r.trim()).filter(|r| !r.is_empty()).collect();
    if recipients.is_empty() {
        return Err(EmailSendError::NoRecipients);
    }
    Ok(recipients)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<Value>,
}

fn lifetime_secs(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)
}

struct CachedToken {
    token: String,
    valid_until: Instant,
}

/// Client-credentials token source. Each instance keeps its own token
/// until shortly before it expires.
struct OAuthTokenSource {
    http: reqwest::Client,
    authority: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    scope: &'static str,
    cache: Mutex<Option<CachedToken>>,
}

impl OAuthTokenSource {
    fn new(
        http: reqwest::Client,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
        scope: &'static str,
    ) -> Self {
        Self {
            http,
            authority: AUTHORITY.to_string(),
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            scope,
            cache: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, EmailSendError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if Instant::now() < cached.valid_until {
                return Ok(cached.token.clone());
            }
        }

        let url = format!("{}/{}/oauth2/v2.0/token", self.authority, self.tenant_id);
        let form = serde_urlencoded::to_string([
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope),
            ("grant_type", "client_credentials"),
        ])
        .map_err(|e| EmailSendError::Token(e.to_string()))?;
        debug!("requesting oauth token for scope {}", self.scope);
        let resp = self
            .http
            .post(url)
            .timeout(TOKEN_TIMEOUT)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(EmailSendError::Token(format!("status {}: {}", status.as_u16(), text)));
        }
        let parsed: TokenResponse =
            serde_json::from_str(&text).map_err(|e| EmailSendError::Token(e.to_string()))?;
        let token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| EmailSendError::Token("access_token missing".to_string()))?;
        let lifetime = Duration::from_secs(lifetime_secs(parsed.expires_in.as_ref()));
        *cache = Some(CachedToken {
            token: token.clone(),
            valid_until: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        });
        Ok(token)
    }
}

pub struct GraphMailSender {
    http: reqwest::Client,
    base_url: String,
    sender: String,
    tokens: OAuthTokenSource,
}

impl GraphMailSender {
    pub fn new(
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
        sender: &str,
    ) -> Result<Self, EmailSendError> {
        let http = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            tokens: OAuthTokenSource::new(http.clone(), tenant_id, client_id, client_secret, GRAPH_SCOPE),
            http,
            base_url: GRAPH_BASE.to_string(),
            sender: sender.to_string(),
        })
    }

    #[cfg(test)]
    fn with_endpoints(mut self, authority: &str, graph_base: &str) -> Self {
        self.tokens.authority = authority.to_string();
        self.base_url = graph_base.to_string();
        self
    }
}

fn graph_payload(to: &[&str], subject: &str, plain_body: &str, html_body: Option<&str>) -> Value {
    let (content_type, content) = match html_body {
        Some(html) => ("HTML", html),
        None => ("Text", plain_body),
    };
    let recipients: Vec<Value> = to
        .iter()
        .map(|address| json!({"emailAddress": {"address": address}}))
        .collect();
    json!({
        "message": {
            "subject": subject,
            "body": {"contentType": content_type, "content": content},
            "toRecipients": recipients,
        },
        "saveToSentItems": "true",
    })
}

#[async_trait]
impl MailSender for GraphMailSender {
    fn transport(&self) -> &'static str {
        "graph"
    }

    async fn send(
        &self,
        to: &[String],
        subject: &str,
        plain_body: &str,
        html_body: Option<&str>,
    ) -> Result<(), EmailSendError> {
        let recipients = clean_recipients(to)?;
        let token = self.tokens.access_token().await?;
        let url = format!("{}/users/{}/sendMail", self.base_url, self.sender);
        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&graph_payload(&recipients, subject, plain_body, html_body))
            .send()
            .await?;
        let status = resp.status();
        if status.as_u16() >= 400 {
            let body = resp.text().await.unwrap_or_default();
            return Err(EmailSendError::Graph {
                status: status.as_u16(),
                body,
            });
        }
        info!("graph mail sent to {} recipient(s)", recipients.len());
        Ok(())
    }
}

enum SmtpAuth {
    Password(String),
    OAuth(OAuthTokenSource),
}

pub struct SmtpMailSender {
    server: String,
    port: u16,
    username: String,
    sender: String,
    bcc: Option<String>,
    auth: SmtpAuth,
}

impl SmtpMailSender {
    /// `None` when no username is configured.
    pub fn from_config(config: &MailConfig) -> Result<Option<Self>, EmailSendError> {
        let Some(username) = non_empty(&config.smtp_username) else {
            return Ok(None);
        };
        let auth = match (
            non_empty(&config.smtp_oauth_tenant_id),
            non_empty(&config.smtp_oauth_client_id),
            non_empty(&config.smtp_oauth_client_secret),
        ) {
            (Some(tenant), Some(client_id), Some(secret)) => {
                let http = reqwest::Client::builder().timeout(TOKEN_TIMEOUT).build()?;
                SmtpAuth::OAuth(OAuthTokenSource::new(http, tenant, client_id, secret, SMTP_SCOPE))
            }
            _ => SmtpAuth::Password(config.smtp_password.clone().unwrap_or_default()),
        };
        Ok(Some(Self {
            server: config.smtp_server.clone(),
            port: config.smtp_port,
            username: username.to_string(),
            sender: non_empty(&config.smtp_sender).unwrap_or(username).to_string(),
            bcc: non_empty(&config.smtp_bcc).map(str::to_string),
            auth,
        }))
    }

    fn build_message(
        &self,
        to: &[&str],
        subject: &str,
        plain_body: &str,
        html_body: Option<&str>,
    ) -> Result<Message, EmailSendError> {
        let parse = |address: &str| {
            address
                .parse::<Mailbox>()
                .map_err(|e| EmailSendError::Message(format!("{}: {}", address, e)))
        };
        let mut builder = Message::builder().from(parse(&self.sender)?).subject(subject);
        for address in to {
            builder = builder.to(parse(address)?);
        }
        if let Some(bcc) = &self.bcc {
            builder = builder.bcc(parse(bcc)?);
        }
        let built = match html_body {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(
                plain_body.to_string(),
                html.to_string(),
            )),
            None => builder.singlepart(SinglePart::plain(plain_body.to_string())),
        };
        built.map_err(|e| EmailSendError::Message(e.to_string()))
    }
}

#[async_trait]
impl MailSender for SmtpMailSender {
    fn transport(&self) -> &'static str {
        "smtp"
    }

    async fn send(
        &self,
        to: &[String],
        subject: &str,
        plain_body: &str,
        html_body: Option<&str>,
    ) -> Result<(), EmailSendError> {
        let recipients = clean_recipients(to)?;
        let message = self.build_message(&recipients, subject, plain_body, html_body)?;
        let mut builder = SmtpTransport::starttls_relay(&self.server)
            .map_err(|e| EmailSendError::Smtp(e.to_string()))?
            .port(self.port)
            .timeout(Some(SEND_TIMEOUT));
        builder = match &self.auth {
            SmtpAuth::Password(password) => {
                builder.credentials(Credentials::new(self.username.clone(), password.clone()))
            }
            SmtpAuth::OAuth(tokens) => builder
                .credentials(Credentials::new(self.username.clone(), tokens.access_token().await?))
                .authentication(vec![Mechanism::Xoauth2]),
        };
        let transport = builder.build();
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| EmailSendError::Smtp(e.to_string()))?
            .map_err(|e| EmailSendError::Smtp(e.to_string()))?;
        info!("smtp mail sent to {} recipient(s) via {}", recipients.len(), self.server);
        Ok(())
    }
}

/// Graph when tenant, client id, secret and sender are all set, else SMTP
/// when a username is set. `None` means mail is not configured.
pub fn select_mail_sender(config: &MailConfig) -> Result<Option<Arc<dyn MailSender>>, EmailSendError> {
    if let (Some(tenant), Some(client_id), Some(secret), Some(sender)) = (
        non_empty(&config.graph_tenant_id),
        non_empty(&config.graph_client_id),
        non_empty(&config.graph_client_secret),
        non_empty(&config.graph_sender),
    ) {
        return Ok(Some(Arc::new(GraphMailSender::new(tenant, client_id, secret, sender)?)));
    }
    Ok(SmtpMailSender::from_config(config)?.map(|s| Arc::new(s) as Arc<dyn MailSender>))
}
