// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values and the
//! typed settings built from them at startup. Nothing about the identity
//! provider is compiled in.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `AUTH_ISSUER_DOMAIN` | Identity provider host, e.g. `tenant.example` | Required |
//! | `AUTH_ISSUER` | Expected JWT issuer claim | `https://<domain>/` |
//! | `AUTH_JWKS_URL` | JWKS endpoint | `https://<domain>/.well-known/jwks.json` |
//! | `AUTH_AUDIENCE` | Expected JWT audience (API identifier) | Required |
//! | `AUTH_ALGORITHMS` | Comma separated accepted signing algorithms | `RS256` |
//! | `AUTH_JWKS_REFRESH_SECS` | JWKS refresh interval, `0` disables | `300` |
//! | `AUTH_JWKS_MIN_REFRESH_SECS` | Minimum gap between JWKS refresh attempts | `30` |
//! | `AUTH_JWKS_TIMEOUT_SECS` | JWKS request timeout | `10` |
//! | `AUTH_LEEWAY_SECS` | Clock skew tolerance for `exp`/`nbf` | `60` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `TLS_CERT_PATH` | PEM certificate chain; enables HTTPS with `TLS_KEY_PATH` | Unset |
//! | `TLS_KEY_PATH` | PEM private key | Unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use url::Url;

use crate::auth::jwks::{
    DEFAULT_FETCH_TIMEOUT, DEFAULT_MIN_REFRESH_INTERVAL, DEFAULT_REFRESH_INTERVAL,
};
use crate::auth::verifier::CLOCK_SKEW_LEEWAY;
use crate::auth::{AuthError, JwksManager, VerifierConfig};
use crate::logging::LogFormat;

pub const AUTH_ISSUER_DOMAIN_ENV: &str = "AUTH_ISSUER_DOMAIN";
pub const AUTH_ISSUER_ENV: &str = "AUTH_ISSUER";
pub const AUTH_JWKS_URL_ENV: &str = "AUTH_JWKS_URL";
pub const AUTH_AUDIENCE_ENV: &str = "AUTH_AUDIENCE";
pub const AUTH_ALGORITHMS_ENV: &str = "AUTH_ALGORITHMS";
pub const AUTH_JWKS_REFRESH_SECS_ENV: &str = "AUTH_JWKS_REFRESH_SECS";
pub const AUTH_JWKS_MIN_REFRESH_SECS_ENV: &str = "AUTH_JWKS_MIN_REFRESH_SECS";
pub const AUTH_JWKS_TIMEOUT_SECS_ENV: &str = "AUTH_JWKS_TIMEOUT_SECS";
pub const AUTH_LEEWAY_SECS_ENV: &str = "AUTH_LEEWAY_SECS";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Path of the key set relative to the issuer root.
const JWKS_PATH: &str = ".well-known/jwks.json";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

/// Invalid or missing configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} is not a valid number: {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{var} is not a valid URL: {reason}")]
    InvalidUrl { var: &'static str, reason: String },
    #[error("{0} must use https (plain http is only accepted for localhost)")]
    InsecureUrl(&'static str),
    #[error("unknown signing algorithm {0:?}")]
    UnknownAlgorithm(String),
    #[error("{0} is a shared-secret algorithm and cannot be verified against a JWKS")]
    SymmetricAlgorithm(String),
    #[error("AUTH_ALGORITHMS must list at least one algorithm")]
    NoAlgorithms,
    #[error("{0:?} is not a valid bind address")]
    InvalidBindAddress(String),
    #[error("TLS_CERT_PATH and TLS_KEY_PATH must be set together")]
    IncompleteTls,
    #[error("LOG_FORMAT must be 'pretty' or 'json', got {0:?}")]
    InvalidLogFormat(String),
}

/// Token verification settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSettings {
    pub issuer: String,
    pub audience: String,
    pub jwks_url: Url,
    pub algorithms: Vec<Algorithm>,
    pub refresh_interval: Option<Duration>,
    pub min_refresh_interval: Duration,
    pub fetch_timeout: Duration,
    pub leeway: u64,
}

impl AuthSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// Build settings from a variable lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let domain = get(AUTH_ISSUER_DOMAIN_ENV).ok_or(ConfigError::Missing(AUTH_ISSUER_DOMAIN_ENV))?;
        let issuer_root = issuer_root(&domain)?;

        let issuer = get(AUTH_ISSUER_ENV).unwrap_or_else(|| issuer_root.to_string());
        let audience = get(AUTH_AUDIENCE_ENV).ok_or(ConfigError::Missing(AUTH_AUDIENCE_ENV))?;

        let jwks_url = match get(AUTH_JWKS_URL_ENV) {
            Some(raw) => parse_url(AUTH_JWKS_URL_ENV, &raw)?,
            None => issuer_root.join(JWKS_PATH).map_err(|e| ConfigError::InvalidUrl {
                var: AUTH_ISSUER_DOMAIN_ENV,
                reason: e.to_string(),
            })?,
        };

        let algorithms = match get(AUTH_ALGORITHMS_ENV) {
            Some(raw) => parse_algorithms(&raw)?,
            None => vec![Algorithm::RS256],
        };

        let refresh_interval = match get(AUTH_JWKS_REFRESH_SECS_ENV) {
            Some(raw) => match parse_number(AUTH_JWKS_REFRESH_SECS_ENV, &raw)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            None => Some(DEFAULT_REFRESH_INTERVAL),
        };

        let secs_or = |var: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            get(var)
                .map(|raw| parse_number(var, &raw).map(Duration::from_secs))
                .unwrap_or(Ok(default))
        };

        Ok(Self {
            issuer,
            audience,
            jwks_url,
            algorithms,
            refresh_interval,
            min_refresh_interval: secs_or(AUTH_JWKS_MIN_REFRESH_SECS_ENV, DEFAULT_MIN_REFRESH_INTERVAL)?,
            fetch_timeout: secs_or(AUTH_JWKS_TIMEOUT_SECS_ENV, DEFAULT_FETCH_TIMEOUT)?,
            leeway: secs_or(AUTH_LEEWAY_SECS_ENV, Duration::from_secs(CLOCK_SKEW_LEEWAY))?.as_secs(),
        })
    }

    pub fn verifier_config(&self) -> VerifierConfig {
        VerifierConfig {
            issuer: self.issuer.clone(),
            audience: self.audience.clone(),
            algorithms: self.algorithms.clone(),
            leeway: self.leeway,
        }
    }

    /// Key set cache for the configured JWKS endpoint.
    pub fn jwks_manager(&self) -> Result<JwksManager, AuthError> {
        Ok(JwksManager::from_url(self.jwks_url.as_str(), self.fetch_timeout)?
            .with_refresh_interval(self.refresh_interval)
            .with_min_refresh_interval(self.min_refresh_interval))
    }
}

/// TLS certificate and key files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Listener and logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    pub tls: Option<TlsPaths>,
    pub log_format: LogFormat,
}

impl ServerSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let ip: IpAddr = host
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(host.clone()))?;
        let port = match get(PORT_ENV) {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidNumber {
                var: PORT_ENV,
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };

        let log_format = match get(LOG_FORMAT_ENV) {
            Some(raw) => raw.parse()?,
            None => LogFormat::default(),
        };

        Ok(Self {
            bind: SocketAddr::new(ip, port),
            tls,
            log_format,
        })
    }
}

fn env_lookup(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

/// `https://<domain>/`, accepting a bare host or one with an `https://` prefix.
fn issuer_root(domain: &str) -> Result<Url, ConfigError> {
    let host = domain
        .strip_prefix("https://")
        .unwrap_or(domain)
        .trim_end_matches('/');
    let url = Url::parse(&format!("https://{host}/")).map_err(|e| ConfigError::InvalidUrl {
        var: AUTH_ISSUER_DOMAIN_ENV,
        reason: e.to_string(),
    })?;
    if url.path() != "/" || url.query().is_some() {
        return Err(ConfigError::InvalidUrl {
            var: AUTH_ISSUER_DOMAIN_ENV,
            reason: "expected a bare host name".to_string(),
        });
    }
    Ok(url)
}

fn parse_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        var,
        reason: e.to_string(),
    })?;
    let local = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
    match url.scheme() {
        "https" => Ok(url),
        "http" if local => Ok(url),
        _ => Err(ConfigError::InsecureUrl(var)),
    }
}

fn parse_number(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: raw.to_string(),
    })
}

fn parse_algorithms(raw: &str) -> Result<Vec<Algorithm>, ConfigError> {
    let mut algorithms = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let alg = Algorithm::from_str(name)
            .map_err(|_| ConfigError::UnknownAlgorithm(name.to_string()))?;
        if matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(ConfigError::SymmetricAlgorithm(name.to_string()));
        }
        if !algorithms.contains(&alg) {
            algorithms.push(alg);
        }
    }
    if algorithms.is_empty() {
        return Err(ConfigError::NoAlgorithms);
    }
    Ok(algorithms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            (AUTH_ISSUER_DOMAIN_ENV, "tenant.example"),
            (AUTH_AUDIENCE_ENV, "https://clientco/api"),
        ]
    }

    fn with(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        let mut vars = base();
        vars.extend_from_slice(extra);
        vars
    }

    #[test]
    fn defaults_derive_from_issuer_domain() {
        let settings = AuthSettings::from_lookup(lookup(&base())).unwrap();
        assert_eq!(settings.issuer, "https://tenant.example/");
        assert_eq!(settings.audience, "https://clientco/api");
        assert_eq!(
            settings.jwks_url.as_str(),
            "https://tenant.example/.well-known/jwks.json"
        );
        assert_eq!(settings.algorithms, vec![Algorithm::RS256]);
        assert_eq!(settings.refresh_interval, Some(Duration::from_secs(300)));
        assert_eq!(settings.min_refresh_interval, Duration::from_secs(30));
        assert_eq!(settings.fetch_timeout, Duration::from_secs(10));
        assert_eq!(settings.leeway, 60);
    }

    #[test]
    fn domain_with_scheme_and_slash_is_normalised() {
        let vars = [
            (AUTH_ISSUER_DOMAIN_ENV, "https://tenant.example/"),
            (AUTH_AUDIENCE_ENV, "api"),
        ];
        let settings = AuthSettings::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(settings.issuer, "https://tenant.example/");
    }

    #[test]
    fn missing_required_values() {
        let no_domain = [(AUTH_AUDIENCE_ENV, "api")];
        assert_eq!(
            AuthSettings::from_lookup(lookup(&no_domain)),
            Err(ConfigError::Missing(AUTH_ISSUER_DOMAIN_ENV))
        );

        let blank_audience = [(AUTH_ISSUER_DOMAIN_ENV, "tenant.example"), (AUTH_AUDIENCE_ENV, "  ")];
        assert_eq!(
            AuthSettings::from_lookup(lookup(&blank_audience)),
            Err(ConfigError::Missing(AUTH_AUDIENCE_ENV))
        );
    }

    #[test]
    fn overrides_are_applied() {
        let vars = with(&[
            (AUTH_ISSUER_ENV, "https://login.tenant.example/"),
            (AUTH_JWKS_URL_ENV, "http://localhost:9000/jwks.json"),
            (AUTH_ALGORITHMS_ENV, "RS256, PS256,RS256"),
            (AUTH_JWKS_REFRESH_SECS_ENV, "0"),
            (AUTH_JWKS_TIMEOUT_SECS_ENV, "3"),
            (AUTH_LEEWAY_SECS_ENV, "5"),
        ]);
        let settings = AuthSettings::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(settings.issuer, "https://login.tenant.example/");
        assert_eq!(settings.jwks_url.as_str(), "http://localhost:9000/jwks.json");
        assert_eq!(settings.algorithms, vec![Algorithm::RS256, Algorithm::PS256]);
        assert_eq!(settings.refresh_interval, None);
        assert_eq!(settings.fetch_timeout, Duration::from_secs(3));
        assert_eq!(settings.verifier_config().leeway, 5);
    }

    #[test]
    fn plain_http_jwks_is_rejected_for_remote_hosts() {
        let vars = with(&[(AUTH_JWKS_URL_ENV, "http://tenant.example/.well-known/jwks.json")]);
        assert_eq!(
            AuthSettings::from_lookup(lookup(&vars)),
            Err(ConfigError::InsecureUrl(AUTH_JWKS_URL_ENV))
        );
    }

    #[test]
    fn symmetric_and_unknown_algorithms_are_rejected() {
        let hs = with(&[(AUTH_ALGORITHMS_ENV, "RS256,HS256")]);
        assert_eq!(
            AuthSettings::from_lookup(lookup(&hs)),
            Err(ConfigError::SymmetricAlgorithm("HS256".into()))
        );

        let none = with(&[(AUTH_ALGORITHMS_ENV, "none")]);
        assert_eq!(
            AuthSettings::from_lookup(lookup(&none)),
            Err(ConfigError::UnknownAlgorithm("none".into()))
        );

        let empty = with(&[(AUTH_ALGORITHMS_ENV, " , ")]);
        assert_eq!(
            AuthSettings::from_lookup(lookup(&empty)),
            Err(ConfigError::NoAlgorithms)
        );
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let vars = with(&[(AUTH_JWKS_TIMEOUT_SECS_ENV, "ten")]);
        assert_eq!(
            AuthSettings::from_lookup(lookup(&vars)),
            Err(ConfigError::InvalidNumber {
                var: AUTH_JWKS_TIMEOUT_SECS_ENV,
                value: "ten".into()
            })
        );
    }

    #[test]
    fn server_defaults() {
        let settings = ServerSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.bind, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(settings.tls, None);
        assert_eq!(settings.log_format, LogFormat::Pretty);
    }

    #[test]
    fn server_overrides() {
        let vars = [
            (HOST_ENV, "::1"),
            (PORT_ENV, "8443"),
            (TLS_CERT_PATH_ENV, "/etc/tls/cert.pem"),
            (TLS_KEY_PATH_ENV, "/etc/tls/key.pem"),
            (LOG_FORMAT_ENV, "json"),
        ];
        let settings = ServerSettings::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(settings.bind, "[::1]:8443".parse::<SocketAddr>().unwrap());
        assert_eq!(
            settings.tls,
            Some(TlsPaths {
                cert: "/etc/tls/cert.pem".into(),
                key: "/etc/tls/key.pem".into(),
            })
        );
        assert_eq!(settings.log_format, LogFormat::Json);
    }

    #[test]
    fn server_rejects_bad_values() {
        assert_eq!(
            ServerSettings::from_lookup(lookup(&[(PORT_ENV, "99999")])),
            Err(ConfigError::InvalidNumber {
                var: PORT_ENV,
                value: "99999".into()
            })
        );
        assert_eq!(
            ServerSettings::from_lookup(lookup(&[(TLS_CERT_PATH_ENV, "/c.pem")])),
            Err(ConfigError::IncompleteTls)
        );
        assert!(matches!(
            ServerSettings::from_lookup(lookup(&[(HOST_ENV, "example.com")])),
            Err(ConfigError::InvalidBindAddress(_))
        ));
    }
}
