//! # Database Models
//!
//! Row structs mapped with `sqlx::FromRow`, and conversions into the domain
//! types. A row that cannot be converted (bad timestamp, negative counter,
//! invalid username, bad user handle) surfaces as `sqlx::Error::Decode`.

use super::decode_time;
use crate::credentials::CredentialRecord;
use crate::ledger::{CeremonyKind, PendingChallenge};
use crate::user::{UserIdentity, UserProfile};
use chrono::NaiveDate;
use uuid::Uuid;

pub(crate) const BIRTHDATE_FORMAT: &str = "%Y-%m-%d";

fn decode_err(message: String) -> sqlx::Error {
    sqlx::Error::Decode(message.into())
}

/// Row of the `users` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub username: String,
    pub user_handle: Vec<u8>,
    pub firstname: String,
    pub lastname: String,
    pub idnumber: String,
    pub contact: String,
    /// `YYYY-MM-DD`
    pub birthdate: String,
    pub gender: String,
    pub email: String,
    pub civilstatus: String,
    pub address: String,
    pub created_at: String,
}

impl TryFrom<UserRow> for UserProfile {
    type Error = sqlx::Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let identity = UserIdentity::parse(&row.username).map_err(|e| decode_err(e.to_string()))?;
        let user_handle = Uuid::from_slice(&row.user_handle)
            .map_err(|e| decode_err(format!("user handle: {e}")))?;
        let birthdate = NaiveDate::parse_from_str(&row.birthdate, BIRTHDATE_FORMAT)
            .map_err(|e| decode_err(format!("birthdate {:?}: {e}", row.birthdate)))?;

        Ok(UserProfile {
            identity,
            user_handle,
            firstname: row.firstname,
            lastname: row.lastname,
            idnumber: row.idnumber,
            contact: row.contact,
            birthdate,
            gender: row.gender,
            email: row.email,
            civilstatus: row.civilstatus,
            address: row.address,
        })
    }
}

/// Row of the `credentials` table
///
/// `counter` is an INTEGER (i64) column holding a u32.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CredentialRow {
    pub credential_id: Vec<u8>,
    pub username: String,
    pub public_key: Vec<u8>,
    pub counter: i64,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

impl TryFrom<CredentialRow> for CredentialRecord {
    type Error = sqlx::Error;

    fn try_from(row: CredentialRow) -> Result<Self, Self::Error> {
        let counter = u32::try_from(row.counter)
            .map_err(|_| decode_err(format!("counter {} out of range", row.counter)))?;
        let last_used_at = row.last_used_at.as_deref().map(decode_time).transpose()?;

        Ok(CredentialRecord {
            credential_id: row.credential_id,
            public_key: row.public_key,
            counter,
            created_at: decode_time(&row.created_at)?,
            last_used_at,
        })
    }
}

/// Row of the `challenges` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChallengeRow {
    pub username: String,
    pub kind: String,
    pub challenge: Vec<u8>,
    pub context: Vec<u8>,
    pub issued_at: String,
    pub expires_at: String,
}

impl TryFrom<ChallengeRow> for PendingChallenge {
    type Error = sqlx::Error;

    fn try_from(row: ChallengeRow) -> Result<Self, Self::Error> {
        let user = UserIdentity::parse(&row.username).map_err(|e| decode_err(e.to_string()))?;
        let kind = row.kind.parse::<CeremonyKind>().map_err(decode_err)?;

        Ok(PendingChallenge {
            user,
            kind,
            challenge: row.challenge,
            context: row.context,
            issued_at: decode_time(&row.issued_at)?,
            expires_at: decode_time(&row.expires_at)?,
        })
    }
}
