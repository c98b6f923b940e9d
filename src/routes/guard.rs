//! Admin gate for `/api/v1/admin` routes.
//!
//! Authentication itself happens elsewhere; the narrow interface here is a
//! bearer access token whose claims carry the admin identity and whether
//! that identity has completed two-factor enrollment. The gate requires a
//! valid token, and (unless `TWO_FACTOR_REQUIRED` is turned off for the
//! deployment) the 2FA claim as well.

use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    pub sub: String,
    pub role: String,
    #[serde(default)]
    pub two_factor_enabled: bool,
    pub exp: usize,
}

static DECODING_KEY: Lazy<DecodingKey> = Lazy::new(|| {
    let secret = std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| "default-jwt-secret-change-in-production".to_string());
    DecodingKey::from_secret(secret.as_bytes())
});

fn decode_with_key(
    token: &str,
    key: &DecodingKey,
) -> Result<AdminClaims, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<AdminClaims>(token, key, &validation).map(|data| data.claims)
}

pub fn verify_access_token(token: &str) -> Result<AdminClaims, jsonwebtoken::errors::Error> {
    decode_with_key(token, &DECODING_KEY)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn two_factor_required() -> bool {
    !matches!(
        std::env::var("TWO_FACTOR_REQUIRED").as_deref(),
        Ok("false") | Ok("0")
    )
}

pub async fn require_admin(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let token =
        bearer_token(request.headers()).ok_or(ApiError::Unauthorized("Authorization required"))?;

    let claims = verify_access_token(token)
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token"))?;

    if two_factor_required() && !claims.two_factor_enabled {
        return Err(ApiError::Forbidden {
            message: "Two-Factor Authentication (2FA) is required to access admin features. \
                      Please enable 2FA first."
                .to_string(),
            code: "2FA_REQUIRED",
        });
    }

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn make_token(secret: &[u8], two_factor_enabled: bool, exp_offset: i64) -> String {
        let claims = AdminClaims {
            sub: "admin".to_string(),
            role: "ADMIN".to_string(),
            two_factor_enabled,
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    #[test]
    fn test_valid_token_round_trip() {
        let token = make_token(b"test-secret", true, 3600);
        let claims = decode_with_key(&token, &DecodingKey::from_secret(b"test-secret")).unwrap();
        assert_eq!(claims.sub, "admin");
        assert!(claims.two_factor_enabled);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = make_token(b"test-secret", true, 3600);
        assert!(decode_with_key(&token, &DecodingKey::from_secret(b"other-secret")).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = make_token(b"test-secret", true, -3600);
        assert!(decode_with_key(&token, &DecodingKey::from_secret(b"test-secret")).is_err());
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}
