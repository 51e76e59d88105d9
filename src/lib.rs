// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ClientCo API - JWT-protected resource server
//!
//! Verifies bearer tokens issued by an external OAuth2/OIDC tenant against its
//! published JWKS and gates endpoints on token scopes.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers and router (Axum)
//! - `auth` - Token verification, JWKS cache and scope authorization
//! - `config` - Environment configuration
//! - `logging` - Tracing subscriber setup

pub mod api;
pub mod auth;
pub mod config;
pub mod logging;
pub mod state;

#[cfg(test)]
mod test_support;
