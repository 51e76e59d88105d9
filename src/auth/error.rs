// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.
//!
//! Every variant is terminal for the request that produced it. Authentication
//! failures ("who are you") map to `401`, the scope failure ("you are known but
//! not permitted") maps to `403`.

use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No authorization header present
    #[error("Authorization header is required")]
    MissingAuthHeader,
    /// Authorization header is not `Bearer <token>`
    #[error("Invalid authorization header format (expected 'Bearer <token>')")]
    InvalidAuthHeader,
    /// Token cannot be parsed as a compact JWT
    #[error("Token is malformed")]
    MalformedToken,
    /// Token header declares an algorithm outside the configured allow-list
    #[error("Token algorithm {0} is not accepted")]
    AlgorithmNotAllowed(String),
    /// No key in the key set matches the token's `kid`
    #[error("No key with id '{}' found in JWKS", display_kid(.0))]
    KeyNotFound(String),
    /// Key set could not be fetched and no cached copy exists
    #[error("Failed to fetch JWKS: {0}")]
    KeySetFetchError(String),
    /// Token signature does not verify
    #[error("Token signature is invalid")]
    InvalidSignature,
    /// Token has expired
    #[error("Token has expired")]
    TokenExpired,
    /// Token is not yet valid
    #[error("Token is not yet valid")]
    TokenNotYetValid,
    /// Token audience does not contain the API identifier
    #[error("Token audience does not match this API")]
    AudienceMismatch,
    /// Token issuer is not the trusted issuer
    #[error("Token issuer is not trusted")]
    IssuerMismatch,
    /// Token is valid but lacks the scope required by the route
    #[error("Insufficient scope: '{required}' is required")]
    InsufficientScope { required: String },
}

/// Longest `kid` echoed back in messages; the value comes from the token.
const MAX_DISPLAYED_KID: usize = 64;

fn display_kid(kid: &str) -> String {
    match kid.char_indices().nth(MAX_DISPLAYED_KID) {
        Some((cut, _)) => format!("{}...", &kid[..cut]),
        None => kid.to_string(),
    }
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::AlgorithmNotAllowed(_) => "algorithm_not_allowed",
            AuthError::KeyNotFound(_) => "key_not_found",
            AuthError::KeySetFetchError(_) => "key_set_fetch_error",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::AudienceMismatch => "audience_mismatch",
            AuthError::IssuerMismatch => "issuer_mismatch",
            AuthError::InsufficientScope { .. } => "insufficient_scope",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InsufficientScope { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// RFC 6750 challenge sent alongside the denial.
    fn challenge(&self) -> HeaderValue {
        let value = match self {
            AuthError::MissingAuthHeader | AuthError::InvalidAuthHeader => {
                r#"Bearer error="invalid_request""#.to_string()
            }
            AuthError::InsufficientScope { required } => {
                format!(r#"Bearer error="insufficient_scope", scope="{required}""#)
            }
            _ => r#"Bearer error="invalid_token""#.to_string(),
        };
        HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("Bearer"))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let challenge = self.challenge();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        let mut response = (status, body).into_response();
        response.headers_mut().insert(WWW_AUTHENTICATE, challenge);
        response
    }
}
