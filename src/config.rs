// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values and the
//! [`ServiceConfig`] loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `5002` |
//! | `DATA_DIR` | Directory holding `users.redb` | `./data` |
//! | `JWKS_URL` / `COGNITO_JWKS_URL` | Signing key set endpoint | Derived from pool id |
//! | `COGNITO_USER_POOL_ID` | Identity provider user pool | None |
//! | `COGNITO_REGION` / `AWS_REGION` | User pool region | `ap-southeast-1` |
//! | `JWT_ISSUER` / `COGNITO_ISSUER` | Expected `iss` claim | Derived from pool id |
//! | `JWT_AUDIENCE` / `COGNITO_APP_CLIENT_ID` | Expected `aud` / `client_id` | Unchecked |
//! | `JWT_ALGORITHMS` | Comma-separated algorithm allow-list | `RS256` |
//! | `JWT_LEEWAY` | Clock skew tolerance, seconds | `0` |
//! | `JWKS_CACHE_TTL` | Key set TTL, seconds | `300` |
//! | `JWKS_FETCH_TIMEOUT_MS` | Bound on one key set refresh | `5000` |
//! | `STORE_TIMEOUT_MS` | Bound on one storage operation | `2000` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use url::Url;

use crate::auth::VerificationPolicy;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the database directory.
///
/// # Default
/// `./data`
pub const DATA_DIR_ENV: &str = "DATA_DIR";

pub const JWKS_URL_ENV: [&str; 2] = ["JWKS_URL", "COGNITO_JWKS_URL"];
pub const USER_POOL_ID_ENV: &str = "COGNITO_USER_POOL_ID";
pub const REGION_ENV: [&str; 2] = ["COGNITO_REGION", "AWS_REGION"];
pub const ISSUER_ENV: [&str; 2] = ["JWT_ISSUER", "COGNITO_ISSUER"];
pub const AUDIENCE_ENV: [&str; 2] = ["JWT_AUDIENCE", "COGNITO_APP_CLIENT_ID"];
pub const ALGORITHMS_ENV: &str = "JWT_ALGORITHMS";
pub const LEEWAY_ENV: &str = "JWT_LEEWAY";
pub const JWKS_CACHE_TTL_ENV: &str = "JWKS_CACHE_TTL";
pub const JWKS_FETCH_TIMEOUT_ENV: &str = "JWKS_FETCH_TIMEOUT_MS";
pub const STORE_TIMEOUT_ENV: &str = "STORE_TIMEOUT_MS";

/// Environment variable selecting log output (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5002;
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_REGION: &str = "ap-southeast-1";
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";
pub const DATABASE_FILE: &str = "users.redb";

/// Startup configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(String),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}

impl ConfigError {
    fn invalid(name: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Fully resolved service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub jwks_url: Url,
    pub issuer: String,
    pub audience: Option<String>,
    pub algorithms: Vec<Algorithm>,
    pub leeway: u64,
    pub jwks_cache_ttl: Duration,
    pub jwks_fetch_timeout: Duration,
    pub store_timeout: Duration,
}

impl ServiceConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let first = |names: &[&str]| names.iter().find_map(|name| get(*name));

        let host = get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_or(&get, PORT_ENV, DEFAULT_PORT)?;
        let bind_addr = format!("{host}:{port}")
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::invalid(HOST_ENV, e.to_string()))?;

        let data_dir = PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()));

        let pool = get(USER_POOL_ID_ENV);
        let region = first(&REGION_ENV[..]).unwrap_or_else(|| DEFAULT_REGION.to_string());
        let provider_base = pool
            .as_ref()
            .map(|pool| format!("https://cognito-idp.{region}.amazonaws.com/{pool}"));

        let jwks_raw = first(&JWKS_URL_ENV[..])
            .or_else(|| provider_base.as_ref().map(|base| format!("{base}/.well-known/jwks.json")))
            .ok_or_else(|| ConfigError::Missing(format!("{} or {USER_POOL_ID_ENV}", JWKS_URL_ENV[0])))?;
        let jwks_url = parse_jwks_url(&jwks_raw)?;

        let issuer = first(&ISSUER_ENV[..])
            .or(provider_base)
            .ok_or_else(|| ConfigError::Missing(format!("{} or {USER_POOL_ID_ENV}", ISSUER_ENV[0])))?;

        let audience = first(&AUDIENCE_ENV[..]);

        let algorithms = match get(ALGORITHMS_ENV) {
            Some(list) => parse_algorithms(&list)?,
            None => vec![Algorithm::RS256],
        };

        Ok(Self {
            bind_addr,
            data_dir,
            jwks_url,
            issuer,
            audience,
            algorithms,
            leeway: parse_or(&get, LEEWAY_ENV, 0)?,
            jwks_cache_ttl: Duration::from_secs(parse_or(&get, JWKS_CACHE_TTL_ENV, 300)?),
            jwks_fetch_timeout: Duration::from_millis(parse_or(&get, JWKS_FETCH_TIMEOUT_ENV, 5000)?),
            store_timeout: Duration::from_millis(parse_or(&get, STORE_TIMEOUT_ENV, 2000)?),
        })
    }

    /// Path of the database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    /// Verification policy derived from this configuration.
    pub fn verification_policy(&self) -> VerificationPolicy {
        let policy = VerificationPolicy::new(self.issuer.clone())
            .with_algorithms(self.algorithms.clone())
            .with_leeway(self.leeway);
        match &self.audience {
            Some(audience) => policy.with_audience(audience.clone()),
            None => policy,
        }
    }
}

fn parse_or<T, G>(get: &G, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(name, e.to_string())),
        None => Ok(default),
    }
}

/// Key set URLs must be HTTPS; plain HTTP is allowed for loopback hosts only.
fn parse_jwks_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::invalid(JWKS_URL_ENV[0], e.to_string()))?;
    let scheme = url.scheme().to_string();
    match scheme.as_str() {
        "https" => Ok(url),
        "http" if is_loopback(&url) => Ok(url),
        scheme => Err(ConfigError::invalid(
            JWKS_URL_ENV[0],
            format!("scheme {scheme} is not allowed (use https)"),
        )),
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(domain)) => domain == "localhost",
        Some(url::Host::Ipv4(addr)) => addr.is_loopback(),
        Some(url::Host::Ipv6(addr)) => addr.is_loopback(),
        None => false,
    }
}

fn parse_algorithms(list: &str) -> Result<Vec<Algorithm>, ConfigError> {
    let mut algorithms = Vec::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let alg = Algorithm::from_str(name)
            .map_err(|_| ConfigError::invalid(ALGORITHMS_ENV, format!("unknown algorithm {name}")))?;
        if matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(ConfigError::invalid(
                ALGORITHMS_ENV,
                format!("symmetric algorithm {name} cannot verify published keys"),
            ));
        }
        if !algorithms.contains(&alg) {
            algorithms.push(alg);
        }
    }
    if algorithms.is_empty() {
        return Err(ConfigError::invalid(ALGORITHMS_ENV, "allow-list is empty"));
    }
    Ok(algorithms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ServiceConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn pool_id_derives_urls() {
        let config = load(&[(USER_POOL_ID_ENV, "ap-southeast-1_abc")]).unwrap();
        assert_eq!(
            config.jwks_url.as_str(),
            "https://cognito-idp.ap-southeast-1.amazonaws.com/ap-southeast-1_abc/.well-known/jwks.json"
        );
        assert_eq!(
            config.issuer,
            "https://cognito-idp.ap-southeast-1.amazonaws.com/ap-southeast-1_abc"
        );
        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.algorithms, vec![Algorithm::RS256]);
        assert_eq!(config.leeway, 0);
        assert_eq!(config.audience, None);
        assert_eq!(config.database_path(), PathBuf::from("./data/users.redb"));
    }

    #[test]
    fn region_alias_is_honored() {
        let config = load(&[(USER_POOL_ID_ENV, "pool"), ("AWS_REGION", "eu-west-1")]).unwrap();
        assert!(config.issuer.contains("cognito-idp.eu-west-1.amazonaws.com"));
    }

    #[test]
    fn explicit_values_override_derivation() {
        let config = load(&[
            ("JWKS_URL", "https://idp.example.com/keys"),
            ("JWT_ISSUER", "https://idp.example.com"),
            ("COGNITO_APP_CLIENT_ID", "client-1"),
            (ALGORITHMS_ENV, "RS256, ES256,RS256"),
            (LEEWAY_ENV, "30"),
            (STORE_TIMEOUT_ENV, "750"),
            (PORT_ENV, "8081"),
        ])
        .unwrap();
        assert_eq!(config.jwks_url.as_str(), "https://idp.example.com/keys");
        assert_eq!(config.audience.as_deref(), Some("client-1"));
        assert_eq!(config.algorithms, vec![Algorithm::RS256, Algorithm::ES256]);
        assert_eq!(config.store_timeout, Duration::from_millis(750));
        assert_eq!(config.bind_addr.port(), 8081);

        let policy = config.verification_policy();
        assert_eq!(policy.leeway, 30);
        assert_eq!(policy.audience.as_deref(), Some("client-1"));
    }

    #[test]
    fn missing_provider_is_an_error() {
        assert!(matches!(load(&[]), Err(ConfigError::Missing(_))));
        assert!(matches!(
            load(&[("JWKS_URL", "https://idp.example.com/keys")]),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn plain_http_only_for_loopback() {
        let remote = load(&[
            ("JWKS_URL", "http://idp.example.com/keys"),
            ("JWT_ISSUER", "iss"),
        ]);
        assert!(matches!(remote, Err(ConfigError::Invalid { .. })));

        let local = load(&[
            ("JWKS_URL", "http://127.0.0.1:9000/keys"),
            ("JWT_ISSUER", "iss"),
        ]);
        assert!(local.is_ok());
    }

    #[test]
    fn bad_values_are_rejected() {
        let base = [("COGNITO_USER_POOL_ID", "pool")];
        for (name, value) in [
            (ALGORITHMS_ENV, "HS256"),
            (ALGORITHMS_ENV, "none"),
            (ALGORITHMS_ENV, " , "),
            (PORT_ENV, "http"),
            (LEEWAY_ENV, "-5"),
        ] {
            let mut vars = base.to_vec();
            vars.push((name, value));
            assert!(
                matches!(load(&vars), Err(ConfigError::Invalid { .. })),
                "{name}={value}"
            );
        }
    }
}
