use axum::body::Body;
use axum::extract::{FromRequestParts, Request};
use axum::http::{self, request::Parts, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Identity taken from the bearer token. The token is opaque and is used as
/// the user principal name without further validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub String);

#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    Empty,
    Invalid,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, detail) = match self {
            AuthError::Empty => (
                StatusCode::UNAUTHORIZED,
                1003,
                "authorization_header_missing",
            ),
            AuthError::Invalid => (
                StatusCode::UNAUTHORIZED,
                1003,
                "invalid_authorization_header",
            ),
        };
        let body = Json(json!({
            "code": error_code,
            "detail": detail,
        }));
        (status, body).into_response()
    }
}

pub fn parse_bearer(header: Option<&str>) -> Result<CurrentUser, AuthError> {
    let header = header.ok_or(AuthError::Empty)?;
    let mut parts = header.trim().splitn(2, char::is_whitespace);
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::Invalid);
    }
    Ok(CurrentUser(token.to_string()))
}

pub async fn authorization_identity_middleware(
    mut req: Request,
    next: Next,
) -> Result<Response<Body>, AuthError> {
    let header = match req.headers().get(http::header::AUTHORIZATION) {
        Some(value) => Some(value.to_str().map_err(|_| AuthError::Invalid)?),
        None => None,
    };
    let user = parse_bearer(header)?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AuthError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bearer() {
        assert_eq!(
            parse_bearer(Some("Bearer ana@contoso.com")),
            Ok(CurrentUser("ana@contoso.com".to_string()))
        );
        assert_eq!(
            parse_bearer(Some("bearer   ana@contoso.com  ")),
            Ok(CurrentUser("ana@contoso.com".to_string()))
        );
        assert_eq!(parse_bearer(None), Err(AuthError::Empty));
        assert_eq!(parse_bearer(Some("Basic abc")), Err(AuthError::Invalid));
        assert_eq!(parse_bearer(Some("Bearer")), Err(AuthError::Invalid));
        assert_eq!(parse_bearer(Some("Bearer   ")), Err(AuthError::Invalid));
        assert_eq!(parse_bearer(Some("")), Err(AuthError::Invalid));
    }
}
