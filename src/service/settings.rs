//! Typed view over the key/value `settings` table.
//!
//! Rows may hold a plain JSON value, a numeric string, or a `{"v": x}`
//! wrapper. Every key has an explicit fallback.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use cyder_tools::log::warn;
use serde_json::Value;

use crate::config::{FinalConfig, MailConfig};
use crate::controller::BaseError;
use crate::database::setting::Setting;
use crate::database::{DbPool, DbResult};
use crate::utils::review_token;

pub const DEFAULT_TEMPERATURE: f64 = 0.3;
pub const DEFAULT_MAX_TOKENS: u32 = 400;
pub const DEFAULT_MAX_HISTORY_MESSAGES: i64 = 10;
pub const DEFAULT_MAX_INTERNAL_NOTES: i64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewSettings {
    pub secret: String,
    pub ttl_hours: i64,
    pub link_base_url: String,
}

/// When a review token issued at `now` expires. `None` when the TTL is not
/// positive or the expiry is not a representable date.
pub fn review_expiry(now: DateTime<Utc>, ttl_hours: i64) -> Option<DateTime<Utc>> {
    review_token::expiry(now.timestamp(), ttl_hours).and_then(|exp| DateTime::from_timestamp(exp, 0))
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeSettings {
    values: HashMap<String, Value>,
}

fn unwrap_value(value: &Value) -> &Value {
    match value {
        Value::Object(map) if map.contains_key("v") => &map["v"],
        other => other,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl RuntimeSettings {
    pub fn new(values: HashMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn load(pool: &DbPool) -> DbResult<Self> {
        Ok(Self::new(Setting::load_map(pool)?))
    }

    fn raw(&self, key: &str) -> Option<&Value> {
        self.values
            .get(key)
            .map(unwrap_value)
            .filter(|v| !v.is_null())
    }

    fn number_or(&self, key: &str, default: f64) -> f64 {
        match self.raw(key) {
            None => default,
            Some(value) => as_f64(value).unwrap_or_else(|| {
                warn!("setting {} has an invalid value {}, using {}", key, value, default);
                default
            }),
        }
    }

    fn integer_or(&self, key: &str, default: i64) -> i64 {
        match self.raw(key) {
            None => default,
            Some(value) => as_i64(value).unwrap_or_else(|| {
                warn!("setting {} has an invalid value {}, using {}", key, value, default);
                default
            }),
        }
    }

    pub fn string(&self, key: &str) -> Option<String> {
        self.raw(key).and_then(as_string)
    }

    pub fn temperature(&self) -> f64 {
        self.number_or("temperature", DEFAULT_TEMPERATURE)
    }

    pub fn max_tokens(&self) -> u32 {
        let value = self.integer_or("max_tokens", DEFAULT_MAX_TOKENS as i64);
        u32::try_from(value).unwrap_or(DEFAULT_MAX_TOKENS)
    }

    pub fn max_history_messages(&self) -> i64 {
        self.integer_or("max_history_messages_in_prompt", DEFAULT_MAX_HISTORY_MESSAGES)
    }

    pub fn max_internal_notes(&self) -> i64 {
        self.integer_or("max_internal_notes_in_prompt", DEFAULT_MAX_INTERNAL_NOTES)
    }

    pub fn comm_sla_default_hours(&self, config: &FinalConfig) -> f64 {
        self.number_or("comm_sla_default_hours", config.comm_sla_default_hours)
    }

    /// Secret and TTL for review tokens. The table wins over the config.
    pub fn review(&self, config: &FinalConfig) -> Result<ReviewSettings, BaseError> {
        let secret = self
            .string("review_token_secret")
            .or_else(|| config.review.token_secret.clone())
            .filter(|s| !s.is_empty())
            .ok_or(BaseError::Configuration(BaseError::detail("review_secret_missing")))?;
        let ttl_hours = match self.raw("review_token_ttl_hours") {
            None => Some(config.review.token_ttl_hours),
            Some(value) => as_i64(value),
        }
        .filter(|ttl| review_expiry(Utc::now(), *ttl).is_some())
        .ok_or(BaseError::Configuration(BaseError::detail("review_ttl_invalid")))?;
        let link_base_url = self
            .string("review_link_base_url")
            .unwrap_or_else(|| config.review.link_base_url.clone());
        Ok(ReviewSettings {
            secret,
            ttl_hours,
            link_base_url,
        })
    }

    /// Mail credentials with table overrides applied on top of `base`.
    pub fn mail(&self, base: &MailConfig) -> MailConfig {
        let pick = |key: &str, fallback: &Option<String>| {
            self.string(key)
                .or_else(|| fallback.clone())
                .filter(|s| !s.is_empty())
        };
        MailConfig {
            smtp_server: self
                .string("smtp_server")
                .unwrap_or_else(|| base.smtp_server.clone()),
            smtp_port: self
                .raw("smtp_port")
                .and_then(as_i64)
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(base.smtp_port),
            smtp_username: pick("smtp_username", &base.smtp_username),
            smtp_password: pick("smtp_password", &base.smtp_password),
            smtp_sender: pick("smtp_sender", &base.smtp_sender),
            smtp_bcc: pick("smtp_bcc", &base.smtp_bcc),
            smtp_oauth_tenant_id: pick("smtp_oauth_tenant_id", &base.smtp_oauth_tenant_id),
            smtp_oauth_client_id: pick("smtp_oauth_client_id", &base.smtp_oauth_client_id),
            smtp_oauth_client_secret: pick("smtp_oauth_client_secret", &base.smtp_oauth_client_secret),
            graph_tenant_id: pick("graph_tenant_id", &base.graph_tenant_id),
            graph_client_id: pick("graph_client_id", &base.graph_client_id),
            graph_client_secret: pick("graph_client_secret", &base.graph_client_secret),
            graph_sender: pick("graph_sender", &base.graph_sender),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(pairs: &[(&str, Value)]) -> RuntimeSettings {
        RuntimeSettings::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults_when_table_is_empty() {
        let s = RuntimeSettings::default();
        assert_eq!(s.temperature(), 0.3);
        assert_eq!(s.max_tokens(), 400);
        assert_eq!(s.max_history_messages(), 10);
        assert_eq!(s.max_internal_notes(), 5);
        assert_eq!(s.comm_sla_default_hours(&FinalConfig::default()), 48.0);
    }

    #[test]
    fn test_accepts_plain_string_and_wrapped_values() {
        let s = settings(&[
            ("temperature", json!(0.7)),
            ("max_tokens", json!("250")),
            ("max_history_messages_in_prompt", json!({"v": 4})),
            ("max_internal_notes_in_prompt", json!({"v": "2"})),
            ("comm_sla_default_hours", json!("24.5")),
        ]);
        assert_eq!(s.temperature(), 0.7);
        assert_eq!(s.max_tokens(), 250);
        assert_eq!(s.max_history_messages(), 4);
        assert_eq!(s.max_internal_notes(), 2);
        assert_eq!(s.comm_sla_default_hours(&FinalConfig::default()), 24.5);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let s = settings(&[
            ("temperature", json!("warm")),
            ("max_tokens", json!(-5)),
            ("max_history_messages_in_prompt", json!([1, 2])),
            ("max_internal_notes_in_prompt", json!(null)),
        ]);
        assert_eq!(s.temperature(), 0.3);
        assert_eq!(s.max_tokens(), 400);
        assert_eq!(s.max_history_messages(), 10);
        assert_eq!(s.max_internal_notes(), 5);
    }

    #[test]
    fn test_review_settings_resolution() {
        let mut config = FinalConfig::default();
        assert!(matches!(
            RuntimeSettings::default().review(&config),
            Err(BaseError::Configuration(Some(ref d))) if d == "review_secret_missing"
        ));

        config.review.token_secret = Some("from-env".to_string());
        let review = RuntimeSettings::default().review(&config).unwrap();
        assert_eq!(review.secret, "from-env");
        assert_eq!(review.ttl_hours, 72);

        let s = settings(&[
            ("review_token_secret", json!({"v": "from-table"})),
            ("review_token_ttl_hours", json!("12")),
        ]);
        let review = s.review(&config).unwrap();
        assert_eq!(review.secret, "from-table");
        assert_eq!(review.ttl_hours, 12);

        for ttl in [json!("soon"), json!(0), json!(-4), json!(1e300), json!("1e300"), json!(i64::MAX / 3600)] {
            let s = settings(&[("review_token_ttl_hours", ttl)]);
            assert!(matches!(
                s.review(&config),
                Err(BaseError::Configuration(Some(ref d))) if d == "review_ttl_invalid"
            ));
        }

        config.review.token_ttl_hours = 0;
        assert!(RuntimeSettings::default().review(&config).is_err());
    }

    #[test]
    fn test_mail_overrides() {
        let base = MailConfig {
            smtp_username: Some("bot@contoso.com".to_string()),
            ..Default::default()
        };
        let s = settings(&[
            ("smtp_port", json!("2525")),
            ("graph_sender", json!("copilot@contoso.com")),
            ("smtp_bcc", json!("")),
        ]);
        let mail = s.mail(&base);
        assert_eq!(mail.smtp_port, 2525);
        assert_eq!(mail.smtp_server, "smtp.office365.com");
        assert_eq!(mail.smtp_username.as_deref(), Some("bot@contoso.com"));
        assert_eq!(mail.graph_sender.as_deref(), Some("copilot@contoso.com"));
        assert_eq!(mail.smtp_bcc, None);
    }
}
