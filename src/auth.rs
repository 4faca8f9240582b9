use axum::{
    extract::FromRequestParts,
    http::{
        header::{AUTHORIZATION, COOKIE},
        request::Parts,
    },
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::AppState;

/// Name of the cookie carrying the session token.
pub const TOKEN_COOKIE: &str = "token";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub id: String,
    pub exp: usize,
}

/// Signs a session token for `user_id` valid for `ttl`.
pub fn issue_token(
    user_id: &str,
    secret: &str,
    ttl: chrono::Duration,
) -> Result<String, AppError> {
    let claims = Claims {
        id: user_id.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    let validation = Validation::new(Algorithm::HS256);
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(token_data.claims)
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
}

fn cookie_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .map(|(_, value)| value)
}

/// The authenticated caller, taken from a bearer token or the session cookie.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .or_else(|| cookie_token(parts))
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Token missing".to_string()))?;

        let claims = validate_token(token, &state.config.jwt_secret)?;
        if claims.id.is_empty() {
            return Err(AppError::Unauthorized("User not authenticated".to_string()));
        }

        Ok(AuthUser {
            user_id: claims.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_round_trips_user_id() {
        let token = issue_token("user-1", "secret", chrono::Duration::days(7)).unwrap();
        let claims = validate_token(&token, "secret").unwrap();
        assert_eq!(claims.id, "user-1");
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = issue_token("user-1", "secret", chrono::Duration::days(7)).unwrap();
        let result = validate_token(&token, "other");
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue_token("user-1", "secret", chrono::Duration::hours(-2)).unwrap();
        assert!(validate_token(&token, "secret").is_err());
    }

    #[test]
    fn reads_token_from_cookie_header() {
        let (parts, _) = axum::http::Request::builder()
            .header(COOKIE, "theme=dark; token=abc.def.ghi")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(cookie_token(&parts), Some("abc.def.ghi"));
        assert_eq!(bearer_token(&parts), None);
    }
}
