//! Bearer-token guard for the `/api` routes.

use crate::{errors::AppError, state::AppState};
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

/// Extracts the bearer token from the Authorization header.
fn extract_bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
}

/// Compares tokens without an early exit on the first differing byte.
/// Only the length can be learned from timing.
fn tokens_match(supplied: &str, expected: &str) -> bool {
    let (supplied, expected) = (supplied.as_bytes(), expected.as_bytes());
    if supplied.len() != expected.len() {
        return false;
    }
    supplied
        .iter()
        .zip(expected)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

/// Proof that the request carried the configured API token. With no token
/// configured every request is refused.
#[derive(Debug, Clone, Copy)]
pub struct ApiAuth;

impl FromRequestParts<AppState> for ApiAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.api_token.as_ref() else {
            return Err(AppError::unauthorized("API access is disabled"));
        };

        let supplied = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(extract_bearer_token);

        match supplied {
            Some(token) if tokens_match(token, expected.expose()) => Ok(ApiAuth),
            Some(_) => Err(AppError::unauthorized("invalid token")),
            None => Err(AppError::unauthorized(
                "Authorization header with Bearer token is required",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(extract_bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(extract_bearer_token("bearer abc"), Some("abc"));
        assert_eq!(extract_bearer_token("Basic abc"), None);
    }

    #[test]
    fn tokens_must_match_exactly() {
        assert!(tokens_match("test-token", "test-token"));
        assert!(!tokens_match("test-tokeN", "test-token"));
        assert!(!tokens_match("test-toke", "test-token"));
        assert!(!tokens_match("", "test-token"));
        assert!(!tokens_match("test-token-", "test-token"));
    }
}
