use axum::{
    response::{IntoResponse, Response},
    Json,
};
use reqwest::StatusCode;
use serde_json::json;
use thiserror::Error;

use crate::service::gateway::GatewayError;
use crate::service::mail::EmailSendError;
use crate::utils::review_token::ReviewTokenError;

#[derive(Debug, Error)]
pub enum BaseError {
    #[error("param invalid: {0:?}")]
    ParamInvalid(Option<String>),
    #[error("database error: {0:?}")]
    DatabaseFatal(Option<String>),
    #[error("not found: {0:?}")]
    NotFound(Option<String>),
    #[error("unauthorized: {0:?}")]
    Unauthorized(Option<String>),
    #[error("forbidden: {0:?}")]
    Forbidden(Option<String>),
    #[error("bad gateway: {0:?}")]
    BadGateway(Option<String>),
    #[error("configuration error: {0:?}")]
    Configuration(Option<String>),
    #[error("service unavailable: {0:?}")]
    ServiceUnavailable(Option<String>),
}

impl BaseError {
    pub fn detail(msg: &str) -> Option<String> {
        Some(msg.to_string())
    }
}

impl From<diesel::result::Error> for BaseError {
    fn from(err: diesel::result::Error) -> Self {
        BaseError::DatabaseFatal(Some(err.to_string()))
    }
}

impl From<diesel::r2d2::PoolError> for BaseError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        BaseError::DatabaseFatal(Some(format!("database pool: {}", err)))
    }
}

impl From<GatewayError> for BaseError {
    fn from(err: GatewayError) -> Self {
        BaseError::BadGateway(Some(err.to_string()))
    }
}

impl From<ReviewTokenError> for BaseError {
    fn from(err: ReviewTokenError) -> Self {
        match err {
            ReviewTokenError::SecretMissing => {
                BaseError::Configuration(BaseError::detail("review_secret_missing"))
            }
            ReviewTokenError::TtlInvalid => {
                BaseError::Configuration(BaseError::detail("review_ttl_invalid"))
            }
            other => BaseError::ParamInvalid(Some(other.to_string())),
        }
    }
}

impl From<EmailSendError> for BaseError {
    fn from(err: EmailSendError) -> Self {
        BaseError::BadGateway(Some(format!("email_send_failed: {}", err)))
    }
}

impl IntoResponse for BaseError {
    fn into_response(self) -> Response {
        let (status, error_code, detail) = match self {
            BaseError::ParamInvalid(msg) => (
                StatusCode::BAD_REQUEST,
                1001,
                msg.unwrap_or("request params invalid".to_string()),
            ),
            BaseError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                1002,
                msg.unwrap_or("data not found".to_string()),
            ),
            BaseError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                1003,
                msg.unwrap_or("unauthorized".to_string()),
            ),
            BaseError::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                1004,
                msg.unwrap_or("forbidden".to_string()),
            ),
            BaseError::DatabaseFatal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                1100,
                msg.unwrap_or("database unknown error".to_string()),
            ),
            BaseError::BadGateway(msg) => (
                StatusCode::BAD_GATEWAY,
                1200,
                msg.unwrap_or("bad gateway".to_string()),
            ),
            BaseError::Configuration(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                1300,
                msg.unwrap_or("internal configuration error".to_string()),
            ),
            BaseError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                1400,
                msg.unwrap_or("service unavailable".to_string()),
            ),
        };
        let body = Json(json!({
            "code": error_code,
            "detail": detail,
        }));
        (status, body).into_response()
    }
}
