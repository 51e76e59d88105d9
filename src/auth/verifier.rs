// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token verification against the issuer's JWKS.
//!
//! Order of checks:
//!
//! 1. Parse the header without trusting it
//! 2. Reject any `alg` outside the configured allow-list (algorithm confusion)
//! 3. Resolve the key by `kid`
//! 4. Verify the signature and time claims
//! 5. `aud` must contain the API identifier
//! 6. `iss` must equal the trusted issuer

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use tracing::debug;

use super::jwks::JwksManager;
use super::{AuthError, Claims};

/// Clock skew tolerance (60 seconds).
pub const CLOCK_SKEW_LEEWAY: u64 = 60;

/// What a token must satisfy to be accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierConfig {
    /// Trusted issuer, compared exactly with `iss`
    pub issuer: String,
    /// API identifier that must appear in `aud`
    pub audience: String,
    /// Signing algorithms accepted in the token header
    pub algorithms: Vec<Algorithm>,
    /// Clock skew tolerance for `exp`/`nbf`, in seconds
    pub leeway: u64,
}

impl VerifierConfig {
    /// RS256-only configuration.
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            algorithms: vec![Algorithm::RS256],
            leeway: CLOCK_SKEW_LEEWAY,
        }
    }

    /// Replace the accepted algorithm list.
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }
}

/// Verifies bearer tokens and returns their claims.
#[derive(Clone)]
pub struct TokenVerifier {
    jwks: JwksManager,
    config: VerifierConfig,
}

impl TokenVerifier {
    pub fn new(jwks: JwksManager, config: VerifierConfig) -> Self {
        Self { jwks, config }
    }

    pub fn jwks(&self) -> &JwksManager {
        &self.jwks
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verify `token` and return its claims exactly as encoded.
    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let result = self.verify_inner(token).await;
        if let Err(e) = &result {
            debug!(error_code = e.error_code(), error = %e, "Bearer token rejected");
        }
        result
    }

    async fn verify_inner(&self, token: &str) -> Result<Claims, AuthError> {
        // Unknown algorithms, including "none", fail header parsing.
        let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;
        let algorithm = header.alg;

        if !self.config.algorithms.contains(&algorithm) {
            return Err(AuthError::AlgorithmNotAllowed(format!("{algorithm:?}")));
        }

        let kid = header.kid.ok_or(AuthError::MalformedToken)?;
        let key = self.jwks.resolve(&kid).await?;

        if !key.supports(algorithm) {
            return Err(AuthError::AlgorithmNotAllowed(format!("{algorithm:?}")));
        }

        let mut validation = Validation::new(algorithm);
        validation.algorithms = vec![algorithm];
        validation.leeway = self.config.leeway;
        validation.validate_nbf = true;
        // Audience and issuer are checked below, in a fixed order.
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let token_data = decode::<Claims>(token, key.decoding_key(), &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                ErrorKind::InvalidAlgorithm => {
                    AuthError::AlgorithmNotAllowed(format!("{algorithm:?}"))
                }
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
                _ => AuthError::MalformedToken,
            }
        })?;

        let claims = token_data.claims;

        if !claims.audiences().contains(&self.config.audience.as_str()) {
            return Err(AuthError::AudienceMismatch);
        }

        if claims.issuer() != Some(self.config.issuer.as_str()) {
            return Err(AuthError::IssuerMismatch);
        }

        Ok(claims)
    }
}
