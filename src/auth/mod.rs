// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer token verification and scope enforcement for the ClientCo API.
//!
//! ## Auth Flow
//!
//! 1. Client obtains an access token from the identity provider
//! 2. Client sends `Authorization: Bearer <JWT>`
//! 3. Server:
//!    - Resolves the signing key by `kid` from the issuer's JWKS (cached)
//!    - Verifies the signature with a pinned algorithm (RS256 by default)
//!    - Checks `aud` against the API identifier, then `iss` against the issuer
//!    - Checks the route's required scope against the `scope` claim
//!
//! ## Security
//!
//! - Every failure is an explicit 401/403; there is no anonymous fallback
//! - The token's `alg` header must be in the configured allow-list
//! - JWKS is fetched with a bounded timeout and cached with a refresh interval
//! - Clock skew tolerance is 60 seconds

pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod middleware;
pub mod refresh;
pub mod scope;
pub mod verifier;

pub use claims::Claims;
pub use error::AuthError;
pub use extractor::Auth;
pub use jwks::{JwksManager, KeySetStatus};
pub use middleware::{scope_gate, ScopeGuard};
pub use refresh::JwksRefresher;
pub use scope::{authorize, ScopeRequirement, ScopeSet};
pub use verifier::{TokenVerifier, VerifierConfig};
