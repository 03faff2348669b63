//! # Database Module
//!
//! SQLite persistence adapter for the ledger and the credential store:
//! - `models`: row types and their conversions
//! - `users`: profile rows
//! - `credentials`: [`SqliteCredentialStore`](credentials::SqliteCredentialStore)
//! - `challenges`: [`SqliteChallengeStore`](challenges::SqliteChallengeStore)
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings so that text
//! comparison in SQL matches chronological order.

pub mod challenges;
pub mod credentials;
pub mod models;
pub mod users;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Open a pool and apply migrations
///
/// `sqlite::memory:` databases live per connection, so callers using one
/// should pass `max_connections = 1`.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

pub(crate) fn encode_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn decode_time(raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}
