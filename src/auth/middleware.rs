// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-route scope gate for Axum.
//!
//! Each protected route declares the one scope it needs when it is registered:
//!
//! ```rust,ignore
//! let guard = ScopeGuard::new(verifier.clone(), ScopeRequirement::from_static("read:data"));
//!
//! let app = Router::new().route(
//!     "/protected-read",
//!     get(protected_read).route_layer(axum::middleware::from_fn_with_state(guard, scope_gate)),
//! );
//! ```
//!
//! On success the verified [`Claims`] are placed in the request extensions, where
//! the `Auth` extractor or `Extension<Claims>` picks them up.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::extractor::bearer_token;
use super::scope::{authorize, ScopeRequirement};
use super::verifier::TokenVerifier;
use super::AuthError;

/// State of one route's scope gate.
#[derive(Clone)]
pub struct ScopeGuard {
    verifier: Arc<TokenVerifier>,
    requirement: ScopeRequirement,
}

impl ScopeGuard {
    pub fn new(verifier: Arc<TokenVerifier>, requirement: ScopeRequirement) -> Self {
        Self {
            verifier,
            requirement,
        }
    }

    pub fn requirement(&self) -> &ScopeRequirement {
        &self.requirement
    }
}

/// Verify the bearer token and require the guard's scope.
pub async fn scope_gate(
    State(guard): State<ScopeGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(request.headers())?.to_owned();
    let claims = guard.verifier.verify(&token).await?;
    let claims = authorize(&guard.requirement, claims)?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
