// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for unit tests: RSA signing keys, token builders and an
//! in-memory key set source.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rand::rngs::OsRng;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};

use crate::auth::jwks::{JwksDocument, JwksManager, KeySetSource};
use crate::auth::verifier::{TokenVerifier, VerifierConfig};
use crate::auth::AuthError;
use crate::state::AppState;

pub const TEST_ISSUER: &str = "https://tenant.example/";
pub const TEST_AUDIENCE: &str = "https://clientco/api";

/// RSA key pair with its public half rendered as JWK components.
pub struct TestKey {
    pub kid: String,
    pub n: String,
    pub e: String,
    encoding: EncodingKey,
}

impl TestKey {
    fn generate(kid: &str) -> Self {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let public_key = private_key.to_public_key();
        let pem = private_key
            .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
            .unwrap();

        Self {
            kid: kid.to_string(),
            n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
            encoding: EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap(),
        }
    }

    /// Public JWK for this key.
    pub fn jwk(&self) -> Value {
        json!({
            "kid": self.kid,
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "n": self.n,
            "e": self.e,
        })
    }

    /// Sign `claims` with RS256 under this key's `kid`.
    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    /// Sign `claims` with this key under an arbitrary header.
    pub fn sign_with_header(&self, header: &Header, claims: &Value) -> String {
        encode(header, claims, &self.encoding).unwrap()
    }
}

static PRIMARY: LazyLock<TestKey> = LazyLock::new(|| TestKey::generate("abc"));
static SECONDARY: LazyLock<TestKey> = LazyLock::new(|| TestKey::generate("rotated-2026"));

/// Key published under kid `abc`.
pub fn primary_key() -> &'static TestKey {
    &PRIMARY
}

/// A second key, used for rotation and wrong-key scenarios.
pub fn secondary_key() -> &'static TestKey {
    &SECONDARY
}

pub fn jwks_document(keys: &[&TestKey]) -> JwksDocument {
    JwksDocument {
        keys: keys.iter().map(|k| k.jwk()).collect(),
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// Claims accepted by [`test_verifier`], granting `read:data write:data`.
pub fn valid_claims() -> Value {
    json!({
        "sub": "auth0|5f7c8ec7c33c6c004bbafe82",
        "aud": TEST_AUDIENCE,
        "iss": TEST_ISSUER,
        "scope": "read:data write:data",
        "iat": now(),
        "exp": now() + 3600,
    })
}

/// Build a compact token from raw parts without signing it.
pub fn raw_token(header: &Value, claims: &Value, signature: &str) -> String {
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string()),
        signature
    )
}

/// In-memory key set source that counts fetch attempts.
pub struct StaticKeySource {
    response: Mutex<Result<JwksDocument, AuthError>>,
    delay: Mutex<Duration>,
    fetches: AtomicUsize,
}

impl StaticKeySource {
    pub fn new(document: JwksDocument) -> Self {
        Self {
            response: Mutex::new(Ok(document)),
            delay: Mutex::new(Duration::ZERO),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        let source = Self::new(JwksDocument::default());
        source.fail_with(reason);
        source
    }

    pub fn set_document(&self, document: JwksDocument) {
        *self.response.lock().unwrap() = Ok(document);
    }

    pub fn fail_with(&self, reason: &str) {
        *self.response.lock().unwrap() = Err(AuthError::KeySetFetchError(reason.to_string()));
    }

    /// Make every later fetch take `delay` (tokio time) before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySetSource for StaticKeySource {
    async fn fetch(&self) -> Result<JwksDocument, AuthError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.response.lock().unwrap().clone()
    }

    fn location(&self) -> &str {
        "memory://jwks"
    }
}

pub fn test_verifier_config() -> VerifierConfig {
    VerifierConfig::new(TEST_ISSUER, TEST_AUDIENCE)
}

/// Verifier trusting [`primary_key`] only.
pub fn test_verifier() -> TokenVerifier {
    let source = Arc::new(StaticKeySource::new(jwks_document(&[primary_key()])));
    TokenVerifier::new(JwksManager::new(source), test_verifier_config())
}

pub fn test_state() -> AppState {
    AppState::new(test_verifier())
}
