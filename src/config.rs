//! # Configuration Management
//!
//! Configuration comes from the environment (12-factor style), with a `.env`
//! file loaded first when present.
//!
//! ## Environment Variables
//! - `HOST` / `PORT`: bind address (default `127.0.0.1:8080`)
//! - `DATABASE_URL`: SQLite connection string
//! - `DATABASE_MAX_CONNECTIONS`: pool size (default 5)
//! - `RP_ID`: WebAuthn Relying Party ID (your domain)
//! - `RP_ORIGIN`: expected origin of every ceremony response
//! - `RP_NAME`: human-readable service name
//! - `CHALLENGE_TTL_SECS`: challenge time-to-live (default 60)
//! - `VERIFIER_TIMEOUT_MS`: upper bound on a verification (default 5000)
//! - `ALLOW_REREGISTRATION`: enroll further passkeys for a known user
//! - `CHALLENGE_CLEANUP_SECS`: interval of the expired-challenge purge

use anyhow::{bail, Context, Result};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Application configuration
///
/// ## WebAuthn Terminology
/// - **RP ID**: your domain name (e.g. "example.com" or "localhost")
/// - **RP Origin**: full origin of the application (e.g. "https://example.com")
///
/// The origin's host must be the RP ID or one of its subdomains, otherwise
/// no browser would ever produce a response this server accepts.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// Format: "sqlite:filename.db?mode=rwc" (read, write, create)
    pub database_url: String,
    pub database_max_connections: u32,

    pub rp_id: String,

    /// Normalised to `scheme://host[:port]` without a trailing slash
    pub rp_origin: String,

    pub rp_name: String,

    pub challenge_ttl: Duration,
    pub verifier_timeout: Duration,
    pub allow_reregistration: bool,
    pub cleanup_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// ## Example .env file
    /// ```text
    /// HOST=127.0.0.1
    /// PORT=8080
    /// DATABASE_URL=sqlite:passkeys.db?mode=rwc
    /// RP_ID=localhost
    /// RP_ORIGIN=http://localhost:8080
    /// RP_NAME=Passkey Demo
    /// CHALLENGE_TTL_SECS=60
    /// ```
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let rp_id = text("RP_ID", "localhost").to_ascii_lowercase();
        let rp_origin = normalize_origin(&text("RP_ORIGIN", "http://localhost:8080"), &rp_id)?;

        let challenge_ttl = Duration::from_secs(parse(&lookup, "CHALLENGE_TTL_SECS", 60u64)?);
        if challenge_ttl.is_zero() {
            bail!("CHALLENGE_TTL_SECS must be positive");
        }
        let verifier_timeout = Duration::from_millis(parse(&lookup, "VERIFIER_TIMEOUT_MS", 5000u64)?);
        if verifier_timeout.is_zero() {
            bail!("VERIFIER_TIMEOUT_MS must be positive");
        }
        let cleanup_interval = Duration::from_secs(parse(&lookup, "CHALLENGE_CLEANUP_SECS", 600u64)?);
        if cleanup_interval.is_zero() {
            bail!("CHALLENGE_CLEANUP_SECS must be positive");
        }

        Ok(Config {
            host: text("HOST", "127.0.0.1"),
            port: parse(&lookup, "PORT", 8080u16)?,
            database_url: text("DATABASE_URL", "sqlite:passkeys.db?mode=rwc"),
            database_max_connections: parse(&lookup, "DATABASE_MAX_CONNECTIONS", 5u32)?,
            rp_id,
            rp_origin,
            rp_name: text("RP_NAME", "Passkey Demo"),
            challenge_ttl,
            verifier_timeout,
            allow_reregistration: parse(&lookup, "ALLOW_REREGISTRATION", false)?,
            cleanup_interval,
        })
    }

    /// Socket address for `tokio::net::TcpListener::bind()`, e.g. "127.0.0.1:8080"
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}

/// Reduce an origin URL to `scheme://host[:port]` and check it against the RP ID
fn normalize_origin(raw: &str, rp_id: &str) -> Result<String> {
    let url = Url::parse(raw).with_context(|| format!("RP_ORIGIN is not a URL: {raw:?}"))?;

    if !matches!(url.scheme(), "http" | "https") {
        bail!("RP_ORIGIN must use http or https");
    }
    let Some(host) = url.host_str() else {
        bail!("RP_ORIGIN has no host");
    };
    if host != rp_id && !host.ends_with(&format!(".{rp_id}")) {
        bail!("RP_ORIGIN host {host:?} is not within RP_ID {rp_id:?}");
    }

    Ok(url.origin().ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.rp_id, "localhost");
        assert_eq!(config.rp_origin, "http://localhost:8080");
        assert_eq!(config.challenge_ttl, Duration::from_secs(60));
        assert_eq!(config.verifier_timeout, Duration::from_millis(5000));
        assert!(!config.allow_reregistration);
    }

    #[test]
    fn origin_is_normalised() {
        let config = config(&[
            ("RP_ID", "example.com"),
            ("RP_ORIGIN", "https://login.example.com:443/path/"),
        ])
        .unwrap();
        assert_eq!(config.rp_origin, "https://login.example.com");
    }

    #[test]
    fn origin_outside_rp_id_is_rejected() {
        assert!(config(&[("RP_ID", "example.com"), ("RP_ORIGIN", "https://evil.com")]).is_err());
        assert!(config(&[("RP_ID", "example.com"), ("RP_ORIGIN", "https://notexample.com")]).is_err());
        assert!(config(&[("RP_ORIGIN", "ftp://localhost")]).is_err());
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let err = config(&[("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
        assert!(config(&[("CHALLENGE_TTL_SECS", "0")]).is_err());
        assert!(config(&[("ALLOW_REREGISTRATION", "maybe")]).is_err());
    }

    #[test]
    fn flags_parse() {
        let config = config(&[
            ("ALLOW_REREGISTRATION", "true"),
            ("CHALLENGE_TTL_SECS", "120"),
        ])
        .unwrap();
        assert!(config.allow_reregistration);
        assert_eq!(config.challenge_ttl, Duration::from_secs(120));
    }
}
