//! Bearer token authentication for the OCR endpoint.

use hyper::header::{HeaderMap, AUTHORIZATION};

use crate::errors::RequestError;

/// Check `Authorization: Bearer <token>` against the configured secret
///
/// The scheme is matched case-insensitively, the token exactly.
pub fn check_bearer_token(headers: &HeaderMap, expected_token: &str) -> Result<(), RequestError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(RequestError::Unauthorized)?;

    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or(RequestError::Unauthorized)?;

    if !scheme.eq_ignore_ascii_case("bearer") || token.trim() != expected_token {
        return Err(RequestError::Unauthorized);
    }

    Ok(())
}
