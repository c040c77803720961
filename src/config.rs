use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{0} must be set")]
    Missing(&'static str),
}

// --- START GATEWAY CONFIG ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    pub client_name: String,
    pub api_key: String,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            client_name: String::new(),
            api_key: String::new(),
            timeout_secs: default_gateway_timeout(),
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialGatewayConfig {
    pub base_url: Option<String>,
    pub client_name: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl PartialGatewayConfig {
    fn merge_into(self, final_config: &mut GatewayConfig) {
        if let Some(base_url) = self.base_url { final_config.base_url = base_url; }
        if let Some(client_name) = self.client_name { final_config.client_name = client_name; }
        if let Some(api_key) = self.api_key { final_config.api_key = api_key; }
        if let Some(timeout_secs) = self.timeout_secs { final_config.timeout_secs = timeout_secs; }
    }
}

// --- START LLM CONFIG ---

/// Azure OpenAI deployment used for reply drafting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub api_version: String,
    pub deployment: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_version: "2024-02-15-preview".to_string(),
            deployment: "gpt-4o-mini".to_string(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn is_configured(&self) -> bool {
        matches!(&self.endpoint, Some(e) if !e.is_empty())
            && matches!(&self.api_key, Some(k) if !k.is_empty())
    }
}

#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialLlmConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    pub deployment: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl PartialLlmConfig {
    fn merge_into(self, final_config: &mut LlmConfig) {
        if let Some(endpoint) = self.endpoint { final_config.endpoint = Some(endpoint); }
        if let Some(api_key) = self.api_key { final_config.api_key = Some(api_key); }
        if let Some(api_version) = self.api_version { final_config.api_version = api_version; }
        if let Some(deployment) = self.deployment { final_config.deployment = deployment; }
        if let Some(timeout_secs) = self.timeout_secs { final_config.timeout_secs = timeout_secs; }
    }
}

// --- START REVIEW CONFIG ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    pub token_secret: Option<String>,
    pub token_ttl_hours: i64,
    pub link_base_url: String,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            token_secret: None,
            token_ttl_hours: 72,
            link_base_url: "http://localhost:5173/experience/review".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialReviewConfig {
    pub token_secret: Option<String>,
    pub token_ttl_hours: Option<i64>,
    pub link_base_url: Option<String>,
}

impl PartialReviewConfig {
    fn merge_into(self, final_config: &mut ReviewConfig) {
        if let Some(token_secret) = self.token_secret { final_config.token_secret = Some(token_secret); }
        if let Some(token_ttl_hours) = self.token_ttl_hours { final_config.token_ttl_hours = token_ttl_hours; }
        if let Some(link_base_url) = self.link_base_url { final_config.link_base_url = link_base_url; }
    }
}

// --- START MAIL CONFIG ---

/// Outbound mail credentials. Every value may be overridden by a row of the
/// same name in the settings table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_sender: Option<String>,
    pub smtp_bcc: Option<String>,
    pub smtp_oauth_tenant_id: Option<String>,
    pub smtp_oauth_client_id: Option<String>,
    pub smtp_oauth_client_secret: Option<String>,
    pub graph_tenant_id: Option<String>,
    pub graph_client_id: Option<String>,
    pub graph_client_secret: Option<String>,
    pub graph_sender: Option<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_server: "smtp.office365.com".to_string(),
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            smtp_sender: None,
            smtp_bcc: None,
            smtp_oauth_tenant_id: None,
            smtp_oauth_client_id: None,
            smtp_oauth_client_secret: None,
            graph_tenant_id: None,
            graph_client_id: None,
            graph_client_secret: None,
            graph_sender: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialMailConfig {
    pub smtp_server: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_sender: Option<String>,
    pub smtp_bcc: Option<String>,
    pub smtp_oauth_tenant_id: Option<String>,
    pub smtp_oauth_client_id: Option<String>,
    pub smtp_oauth_client_secret: Option<String>,
    pub graph_tenant_id: Option<String>,
    pub graph_client_id: Option<String>,
    pub graph_client_secret: Option<String>,
    pub graph_sender: Option<String>,
}

impl PartialMailConfig {
    fn merge_into(self, c: &mut MailConfig) {
        if let Some(v) = self.smtp_server { c.smtp_server = v; }
        if let Some(v) = self.smtp_port { c.smtp_port = v; }
        if let Some(v) = self.smtp_username { c.smtp_username = Some(v); }
        if let Some(v) = self.smtp_password { c.smtp_password = Some(v); }
        if let Some(v) = self.smtp_sender { c.smtp_sender = Some(v); }
        if let Some(v) = self.smtp_bcc { c.smtp_bcc = Some(v); }
        if let Some(v) = self.smtp_oauth_tenant_id { c.smtp_oauth_tenant_id = Some(v); }
        if let Some(v) = self.smtp_oauth_client_id { c.smtp_oauth_client_id = Some(v); }
        if let Some(v) = self.smtp_oauth_client_secret { c.smtp_oauth_client_secret = Some(v); }
        if let Some(v) = self.graph_tenant_id { c.graph_tenant_id = Some(v); }
        if let Some(v) = self.graph_client_id { c.graph_client_id = Some(v); }
        if let Some(v) = self.graph_client_secret { c.graph_client_secret = Some(v); }
        if let Some(v) = self.graph_sender { c.graph_sender = Some(v); }
    }
}

fn default_gateway_timeout() -> u64 {
    30
}

fn default_llm_timeout() -> u64 {
    30
}

// Used for deserializing user-provided config files where all fields are optional.
#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub app_name: Option<String>,
    pub environment: Option<String>,
    pub log_level: Option<String>,
    pub db_url: Option<String>,
    pub db_schema: Option<String>,
    pub comm_sla_default_hours: Option<f64>,
    pub seed_file: Option<String>,
    pub gateway: Option<PartialGatewayConfig>,
    pub llm: Option<PartialLlmConfig>,
    pub review: Option<PartialReviewConfig>,
    pub mail: Option<PartialMailConfig>,
}

impl PartialConfig {
    /// Merges the fields of this partial config into a final config, overwriting existing values.
    fn merge_into(self, final_config: &mut FinalConfig) {
        if let Some(host) = self.host { final_config.host = host; }
        if let Some(port) = self.port { final_config.port = port; }
        if let Some(app_name) = self.app_name { final_config.app_name = app_name; }
        if let Some(environment) = self.environment { final_config.environment = environment; }
        if let Some(log_level) = self.log_level { final_config.log_level = log_level; }
        if let Some(db_url) = self.db_url { final_config.db_url = db_url; }
        if let Some(db_schema) = self.db_schema { final_config.db_schema = db_schema; }
        if let Some(hours) = self.comm_sla_default_hours { final_config.comm_sla_default_hours = hours; }
        if let Some(seed_file) = self.seed_file { final_config.seed_file = Some(seed_file); }
        if let Some(gateway) = self.gateway {
            gateway.merge_into(&mut final_config.gateway)
        }
        if let Some(llm) = self.llm {
            llm.merge_into(&mut final_config.llm)
        }
        if let Some(review) = self.review {
            review.merge_into(&mut final_config.review)
        }
        if let Some(mail) = self.mail {
            mail.merge_into(&mut final_config.mail)
        }
    }
}

// The fully resolved configuration used by the application.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FinalConfig {
    pub host: String,
    pub port: u16,
    pub app_name: String,
    pub environment: String,
    pub log_level: String,
    pub db_url: String,
    pub db_schema: String,
    pub comm_sla_default_hours: f64,
    pub seed_file: Option<String>,
    pub gateway: GatewayConfig,
    pub llm: LlmConfig,
    pub review: ReviewConfig,
    pub mail: MailConfig,
}

impl Default for FinalConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            app_name: "copilot-api".to_string(),
            environment: "local".to_string(),
            log_level: "info".to_string(),
            db_url: String::new(),
            db_schema: "copilot".to_string(),
            comm_sla_default_hours: 48.0,
            seed_file: None,
            gateway: GatewayConfig::default(),
            llm: LlmConfig::default(),
            review: ReviewConfig::default(),
            mail: MailConfig::default(),
        }
    }
}

fn get_env_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn get_config_from_env() -> PartialConfig {
    PartialConfig {
        host: get_env_var("HOST"),
        port: get_env_var("PORT"),
        app_name: get_env_var("APP_NAME"),
        environment: get_env_var("ENVIRONMENT"),
        log_level: get_env_var("LOG_LEVEL"),
        db_url: get_env_var("DATABASE_URL"),
        db_schema: get_env_var("DB_SCHEMA"),
        comm_sla_default_hours: get_env_var("COMM_SLA_DEFAULT_HOURS"),
        seed_file: get_env_var("SEED_FILE"),
        gateway: Some(PartialGatewayConfig {
            base_url: get_env_var("GATEWAY_BASE_URL"),
            client_name: get_env_var("GATEWAY_CLIENT"),
            api_key: get_env_var("GATEWAY_API_KEY"),
            timeout_secs: get_env_var("GATEWAY_TIMEOUT_SECS"),
        }),
        llm: Some(PartialLlmConfig {
            endpoint: get_env_var("AZURE_OPENAI_ENDPOINT"),
            api_key: get_env_var("AZURE_OPENAI_API_KEY"),
            api_version: get_env_var("AZURE_OPENAI_API_VERSION"),
            deployment: get_env_var("AZURE_OPENAI_DEPLOYMENT_GPT"),
            timeout_secs: get_env_var("AZURE_OPENAI_TIMEOUT_SECS"),
        }),
        review: Some(PartialReviewConfig {
            token_secret: get_env_var("REVIEW_TOKEN_SECRET"),
            token_ttl_hours: get_env_var("EXPERIENCE_REVIEW_TOKEN_TTL_HOURS"),
            link_base_url: get_env_var("REVIEW_LINK_BASE_URL"),
        }),
        mail: Some(PartialMailConfig {
            smtp_server: get_env_var("SMTP_SERVER"),
            smtp_port: get_env_var("SMTP_PORT"),
            smtp_username: get_env_var("SMTP_USERNAME"),
            smtp_password: get_env_var("SMTP_PASSWORD"),
            smtp_sender: get_env_var("SMTP_SENDER"),
            smtp_bcc: get_env_var("SMTP_BCC"),
            smtp_oauth_tenant_id: get_env_var("SMTP_OAUTH_TENANT_ID"),
            smtp_oauth_client_id: get_env_var("SMTP_OAUTH_CLIENT_ID"),
            smtp_oauth_client_secret: get_env_var("SMTP_OAUTH_CLIENT_SECRET"),
            graph_tenant_id: get_env_var("GRAPH_TENANT_ID"),
            graph_client_id: get_env_var("GRAPH_CLIENT_ID"),
            graph_client_secret: get_env_var("GRAPH_CLIENT_SECRET"),
            graph_sender: get_env_var("GRAPH_SENDER"),
        }),
    }
}

fn load_partial_file(path: &Path) -> Result<Option<PartialConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let Ok(config_str) = fs::read_to_string(path) else {
        return Ok(None);
    };
    serde_yaml::from_str(&config_str)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
}

impl FinalConfig {
    /// Resolves the configuration: defaults, then `config.yaml`, then
    /// `config.local.yaml`, then `.env` and the process environment.
    pub fn load() -> Result<FinalConfig, ConfigError> {
        let mut final_config = FinalConfig::default();

        for path in ["config.yaml", "config.local.yaml"] {
            if let Some(partial) = load_partial_file(Path::new(path))? {
                partial.merge_into(&mut final_config);
            }
        }

        // A missing .env file is not an error.
        let _ = dotenvy::dotenv();
        get_config_from_env().merge_into(&mut final_config);

        if final_config.db_url.trim().is_empty() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }
        Ok(final_config)
    }
}
