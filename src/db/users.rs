use super::encode_time;
use crate::db::models::{UserRow, BIRTHDATE_FORMAT};
use crate::user::{UserIdentity, UserProfile};
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

/// Unique `users` column named by a constraint violation, if that is what
/// `err` is
pub fn duplicate_field(err: &sqlx::Error) -> Option<&'static str> {
    let sqlx::Error::Database(db) = err else {
        return None;
    };
    if !db.is_unique_violation() {
        return None;
    }
    // SQLite reports "UNIQUE constraint failed: users.<column>"
    let message = db.message();
    ["email", "idnumber", "user_handle"]
        .into_iter()
        .find(|field| message.contains(&format!("users.{field}")))
}

/// Insert the profile unless the username already exists
///
/// Runs on a caller-supplied connection so it can share a transaction with
/// the credential insert. Returns whether a row was created. A clash on
/// another unique column is returned as the database error.
pub async fn insert_if_absent(
    conn: &mut SqliteConnection,
    profile: &UserProfile,
    created_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query::<Sqlite>(
        "INSERT INTO users
         (username, user_handle, firstname, lastname, idnumber, contact, birthdate,
          gender, email, civilstatus, address, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (username) DO NOTHING",
    )
    .bind(profile.identity.as_str())
    .bind(profile.user_handle.as_bytes().as_slice())
    .bind(&profile.firstname)
    .bind(&profile.lastname)
    .bind(&profile.idnumber)
    .bind(&profile.contact)
    .bind(profile.birthdate.format(BIRTHDATE_FORMAT).to_string())
    .bind(&profile.gender)
    .bind(&profile.email)
    .bind(&profile.civilstatus)
    .bind(&profile.address)
    .bind(encode_time(created_at))
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn find_by_username(pool: &SqlitePool, user: &UserIdentity) -> Result<Option<UserProfile>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = ?")
        .bind(user.as_str())
        .fetch_optional(pool)
        .await?
        .map(UserProfile::try_from)
        .transpose()
}

/// First unique field of `profile` already held by a different username
pub async fn find_conflict(pool: &SqlitePool, profile: &UserProfile) -> Result<Option<&'static str>, sqlx::Error> {
    let taken: Option<String> = sqlx::query_scalar(
        "SELECT email FROM users
         WHERE username <> ? AND (email = ? OR idnumber = ?)
         LIMIT 1",
    )
    .bind(profile.identity.as_str())
    .bind(&profile.email)
    .bind(&profile.idnumber)
    .fetch_optional(pool)
    .await?;

    Ok(taken.map(|email| if email == profile.email { "email" } else { "idnumber" }))
}
