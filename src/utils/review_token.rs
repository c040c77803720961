//! Signed, time-limited tokens embedded in "service experience review" links.
//!
//! A token is `base64url(payload) "." base64url(HMAC-SHA256(payload, secret))`
//! where the payload is the compact JSON `{"ticket_id":..,"iat":..,"exp":..}`.

use base64::{
    alphabet,
    engine::{general_purpose::URL_SAFE_NO_PAD, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Accepts both padded and unpadded input.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReviewTokenError {
    #[error("secret_missing")]
    SecretMissing,
    #[error("invalid_token")]
    Invalid,
    #[error("token_expired")]
    Expired,
    #[error("review_ttl_invalid")]
    TtlInvalid,
}

/// Expiry for a token issued at `now`, or `None` when the TTL is not
/// positive or the result does not fit.
pub fn expiry(now: i64, ttl_hours: i64) -> Option<i64> {
    if ttl_hours <= 0 {
        return None;
    }
    ttl_hours.checked_mul(3600).and_then(|secs| now.checked_add(secs))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewClaims {
    pub ticket_id: String,
    pub iat: i64,
    pub exp: i64,
}

fn sign(payload: &[u8], secret: &str) -> Result<HmacSha256, ReviewTokenError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| ReviewTokenError::SecretMissing)?;
    mac.update(payload);
    Ok(mac)
}

pub fn generate_at(
    ticket_id: &str,
    secret: &str,
    ttl_hours: i64,
    now: i64,
) -> Result<String, ReviewTokenError> {
    if secret.is_empty() {
        return Err(ReviewTokenError::SecretMissing);
    }
    let claims = ReviewClaims {
        ticket_id: ticket_id.to_string(),
        iat: now,
        exp: expiry(now, ttl_hours).ok_or(ReviewTokenError::TtlInvalid)?,
    };
    let payload = serde_json::to_vec(&claims).map_err(|_| ReviewTokenError::Invalid)?;
    let signature = sign(&payload, secret)?.finalize().into_bytes();
    Ok(format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(&payload),
        URL_SAFE_NO_PAD.encode(signature)
    ))
}

pub fn decode(token: &str, secret: &str) -> Result<ReviewClaims, ReviewTokenError> {
    decode_at(token, secret, Utc::now().timestamp())
}

pub fn decode_at(token: &str, secret: &str, now: i64) -> Result<ReviewClaims, ReviewTokenError> {
    if token.is_empty() || secret.is_empty() {
        return Err(ReviewTokenError::Invalid);
    }
    let (payload_b64, signature_b64) = token.split_once('.').ok_or(ReviewTokenError::Invalid)?;
    let payload = URL_SAFE_LENIENT
        .decode(payload_b64)
        .map_err(|_| ReviewTokenError::Invalid)?;
    let signature = URL_SAFE_LENIENT
        .decode(signature_b64)
        .map_err(|_| ReviewTokenError::Invalid)?;

    // verify_slice compares in constant time
    sign(&payload, secret)
        .map_err(|_| ReviewTokenError::Invalid)?
        .verify_slice(&signature)
        .map_err(|_| ReviewTokenError::Invalid)?;

    let claims: ReviewClaims =
        serde_json::from_slice(&payload).map_err(|_| ReviewTokenError::Invalid)?;
    if now > claims.exp {
        return Err(ReviewTokenError::Expired);
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "review-secret";
    const NOW: i64 = 1_760_000_000;

    #[test]
    fn test_round_trip_keeps_ticket_id() {
        for ticket_id in ["1", "48213", "REQ-0001", "ticket with spaces", "ñandú"] {
            let token = generate_at(ticket_id, SECRET, 72, NOW).unwrap();
            let claims = decode_at(&token, SECRET, NOW + 60).unwrap();
            assert_eq!(claims.ticket_id, ticket_id);
            assert_eq!(claims.iat, NOW);
            assert_eq!(claims.exp, NOW + 72 * 3600);
        }
    }

    #[test]
    fn test_token_is_unpadded_base64url() {
        let token = generate_at("42", SECRET, 1, NOW).unwrap();
        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
        assert_eq!(token.matches('.').count(), 1);
    }

    #[test]
    fn test_padded_token_is_accepted() {
        let token = generate_at("42", SECRET, 1, NOW).unwrap();
        let (payload, signature) = token.split_once('.').unwrap();
        let pad = |s: &str| format!("{}{}", s, "=".repeat((4 - s.len() % 4) % 4));
        let padded = format!("{}.{}", pad(payload), pad(signature));
        assert_eq!(decode_at(&padded, SECRET, NOW).unwrap().ticket_id, "42");
    }

    #[test]
    fn test_expired_after_ttl() {
        let token = generate_at("42", SECRET, 2, NOW).unwrap();
        assert!(decode_at(&token, SECRET, NOW + 2 * 3600).is_ok());
        assert_eq!(
            decode_at(&token, SECRET, NOW + 2 * 3600 + 1),
            Err(ReviewTokenError::Expired)
        );
    }

    #[test]
    fn test_tampered_signature_is_invalid() {
        let token = generate_at("42", SECRET, 2, NOW).unwrap();
        let (payload, signature) = token.split_once('.').unwrap();
        let mut raw = URL_SAFE_NO_PAD.decode(signature).unwrap();
        for i in 0..raw.len() {
            raw[i] ^= 0x01;
            let forged = format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(&raw));
            assert_eq!(decode_at(&forged, SECRET, NOW), Err(ReviewTokenError::Invalid));
            raw[i] ^= 0x01;
        }
    }

    #[test]
    fn test_tampered_payload_is_invalid() {
        let token = generate_at("42", SECRET, 2, NOW).unwrap();
        let (_, signature) = token.split_once('.').unwrap();
        let forged_payload = URL_SAFE_NO_PAD.encode(br#"{"ticket_id":"43","iat":0,"exp":9999999999}"#);
        let forged = format!("{}.{}", forged_payload, signature);
        assert_eq!(decode_at(&forged, SECRET, NOW), Err(ReviewTokenError::Invalid));
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let token = generate_at("42", SECRET, 2, NOW).unwrap();
        assert_eq!(decode_at(&token, "other", NOW), Err(ReviewTokenError::Invalid));
    }

    #[test]
    fn test_malformed_tokens_are_invalid() {
        for token in ["", "no-dot", "###.###", "e30.", ".abc"] {
            assert_eq!(decode_at(token, SECRET, NOW), Err(ReviewTokenError::Invalid));
        }
        let token = generate_at("42", SECRET, 2, NOW).unwrap();
        assert_eq!(decode_at(&token, "", NOW), Err(ReviewTokenError::Invalid));
    }

    #[test]
    fn test_missing_secret_on_generate() {
        assert_eq!(generate_at("42", "", 2, NOW), Err(ReviewTokenError::SecretMissing));
    }

    #[test]
    fn test_unusable_ttl_is_rejected() {
        for ttl in [0, -3, i64::MAX, i64::MAX / 3600] {
            assert_eq!(
                generate_at("42", SECRET, ttl, NOW),
                Err(ReviewTokenError::TtlInvalid)
            );
        }
        assert_eq!(expiry(NOW, 2), Some(NOW + 7200));
        assert_eq!(expiry(i64::MAX - 10, 1), None);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ReviewTokenError::Invalid.to_string(), "invalid_token");
        assert_eq!(ReviewTokenError::Expired.to_string(), "token_expired");
    }
}
