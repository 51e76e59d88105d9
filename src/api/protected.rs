// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Protected endpoints.
//!
//! Scope checks happen in the route's `scope_gate` layer before these handlers
//! run; see `api::router`.

use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{Auth, Claims, ScopeSet};

/// Scope required by `GET /protected-read`.
pub const READ_SCOPE: &str = "read:data";

/// Scope required by `GET /protected-write`.
pub const WRITE_SCOPE: &str = "write:data";

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// Response for GET /v1/me
#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    /// Token subject
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Granted scopes, sorted
    pub scopes: Vec<String>,
    /// All verified claims
    #[schema(value_type = Object)]
    pub claims: Claims,
}

impl From<Claims> for MeResponse {
    fn from(claims: Claims) -> Self {
        Self {
            sub: claims.subject().map(str::to_string),
            scopes: ScopeSet::from_claims(&claims).to_vec(),
            claims,
        }
    }
}

#[utoipa::path(
    get,
    path = "/protected-read",
    tag = "Protected",
    security(("bearer" = ["read:data"])),
    responses(
        (status = 200, description = "Read access granted", body = MessageResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Token lacks read:data"),
    )
)]
pub async fn protected_read() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Read access granted".to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/protected-write",
    tag = "Protected",
    security(("bearer" = ["write:data"])),
    responses(
        (status = 200, description = "Write access granted", body = MessageResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Token lacks write:data"),
    )
)]
pub async fn protected_write() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Write access granted".to_string(),
    })
}

/// Identity and scopes of the calling token.
#[utoipa::path(
    get,
    path = "/v1/me",
    tag = "Protected",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Caller identity", body = MeResponse),
        (status = 401, description = "Missing or invalid token"),
    )
)]
pub async fn me(Auth(claims): Auth) -> Json<MeResponse> {
    Json(claims.into())
}
