use std::sync::Arc;

use axum::Router;
use cyder_tools::log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::config::{FinalConfig, MailConfig};
use crate::controller::BaseError;
use crate::database::DbPool;
use crate::service::gateway::{GatewayError, SdpGateway, TicketGateway};
use crate::service::llm::{AzureChatClient, ChatCompleter, LlmError};
use crate::service::mail::{select_mail_sender, MailSender};
use crate::service::settings::RuntimeSettings;

pub struct AppState {
    pub config: FinalConfig,
    pub db: DbPool,
    pub gateway: Arc<dyn TicketGateway>,
    llm: Option<Arc<dyn ChatCompleter>>,
    mail_override: Option<Arc<dyn MailSender>>,
    // Reused while the resolved credentials stay the same, so the sender's
    // OAuth token cache survives across requests.
    mail_cache: Mutex<Option<(MailConfig, Arc<dyn MailSender>)>>,
}

#[derive(Debug, thiserror::Error)]
pub enum AppStateError {
    #[error("gateway client: {0}")]
    Gateway(#[from] GatewayError),
    #[error("llm client: {0}")]
    Llm(#[from] LlmError),
}

impl AppState {
    pub fn new(
        config: FinalConfig,
        db: DbPool,
        gateway: Arc<dyn TicketGateway>,
        llm: Option<Arc<dyn ChatCompleter>>,
    ) -> Self {
        Self {
            config,
            db,
            gateway,
            llm,
            mail_override: None,
            mail_cache: Mutex::new(None),
        }
    }

    /// Pins the mail sender instead of resolving it from settings on each use.
    #[cfg(test)]
    pub fn with_mail_sender(mut self, sender: Arc<dyn MailSender>) -> Self {
        self.mail_override = Some(sender);
        self
    }

    pub fn llm(&self) -> Result<&Arc<dyn ChatCompleter>, BaseError> {
        self.llm
            .as_ref()
            .ok_or(BaseError::Configuration(BaseError::detail("azure_openai_not_configured")))
    }

    /// `None` when neither Graph nor SMTP credentials resolve.
    pub async fn mail_sender(
        &self,
        settings: &RuntimeSettings,
    ) -> Result<Option<Arc<dyn MailSender>>, BaseError> {
        if let Some(sender) = &self.mail_override {
            return Ok(Some(sender.clone()));
        }
        let mail = settings.mail(&self.config.mail);
        let mut cache = self.mail_cache.lock().await;
        if let Some((cached_config, sender)) = cache.as_ref() {
            if *cached_config == mail {
                return Ok(Some(sender.clone()));
            }
        }
        let sender = select_mail_sender(&mail)?;
        match &sender {
            Some(sender) => {
                debug!("mail sender resolved to {}", sender.transport());
                *cache = Some((mail, sender.clone()));
            }
            None => *cache = None,
        }
        Ok(sender)
    }
}

pub fn create_app_state(config: FinalConfig, db: DbPool) -> Result<Arc<AppState>, AppStateError> {
    let gateway = SdpGateway::new(&config.gateway)?;
    let llm = AzureChatClient::from_config(&config.llm)?
        .map(|client| Arc::new(client) as Arc<dyn ChatCompleter>);
    if llm.is_some() {
        info!("azure openai deployment {} enabled", config.llm.deployment);
    } else {
        warn!("azure openai is not configured, ia endpoints will fail");
    }
    Ok(Arc::new(AppState::new(config, db, Arc::new(gateway), llm)))
}

pub type StateRouter = Router<Arc<AppState>>;

pub fn create_state_router() -> StateRouter {
    Router::<Arc<AppState>>::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::config::GatewayConfig;
    use crate::database::test_support::sqlite_pool;

    fn graph_settings(sender: &str) -> RuntimeSettings {
        RuntimeSettings::new(
            [
                ("graph_tenant_id", json!("contoso")),
                ("graph_client_id", json!("client")),
                ("graph_client_secret", json!("secret")),
                ("graph_sender", json!(sender)),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        )
    }

    #[tokio::test]
    async fn test_mail_sender_reused_until_credentials_change() {
        let (_dir, db) = sqlite_pool();
        let gateway = SdpGateway::new(&GatewayConfig::default()).unwrap();
        let state = AppState::new(FinalConfig::default(), db, Arc::new(gateway), None);

        assert!(state.mail_sender(&RuntimeSettings::default()).await.unwrap().is_none());

        let first = state.mail_sender(&graph_settings("a@contoso.com")).await.unwrap().unwrap();
        let again = state.mail_sender(&graph_settings("a@contoso.com")).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(first.transport(), "graph");

        let changed = state.mail_sender(&graph_settings("b@contoso.com")).await.unwrap().unwrap();
        assert!(!Arc::ptr_eq(&first, &changed));
    }
}
