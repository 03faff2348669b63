//! # User Identity and Profile
//!
//! Every ledger entry and credential is keyed by a [`UserIdentity`]. It is
//! validated once, at the boundary, and never changes afterwards.
//!
//! The profile captured at registration carries the person's civil data.
//! `email` and `idnumber` are unique across users; the stores enforce that.

use crate::error::{AppError, AppResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 64;
pub const MAX_FIELD_LEN: usize = 256;

/// Unique, immutable user name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserIdentity(String);

impl UserIdentity {
    /// Validate a raw username
    ///
    /// Rules: 3 to 64 characters, no whitespace, no control characters.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let len = raw.chars().count();
        if len < MIN_USERNAME_LEN {
            return Err(AppError::InputInvalid(format!(
                "username must be at least {MIN_USERNAME_LEN} characters"
            )));
        }
        if len > MAX_USERNAME_LEN {
            return Err(AppError::InputInvalid(format!(
                "username must be at most {MAX_USERNAME_LEN} characters"
            )));
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(AppError::InputInvalid(
                "username must not contain whitespace or control characters".to_string(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserIdentity {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UserIdentity> for String {
    fn from(value: UserIdentity) -> Self {
        value.0
    }
}

/// Registration form as posted by the client
///
/// Missing fields deserialize as empty strings so that validation, not the
/// JSON extractor, reports which one is wrong.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileForm {
    pub username: String,
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
}

/// Profile captured when registration begins
///
/// It travels with the registration challenge and is persisted only when
/// the first credential is enrolled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub identity: UserIdentity,
    /// WebAuthn `user.id`; random, so it reveals nothing about the user
    pub user_handle: Uuid,
    pub firstname: String,
    pub lastname: String,
    pub idnumber: String,
    pub contact: String,
    pub birthdate: NaiveDate,
    pub gender: String,
    pub email: String,
    pub civilstatus: String,
    pub address: String,
}

fn required(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::InputInvalid(format!("{field} is required")));
    }
    if value.chars().count() > MAX_FIELD_LEN {
        return Err(AppError::InputInvalid(format!(
            "{field} must be at most {MAX_FIELD_LEN} characters"
        )));
    }
    Ok(value.to_string())
}

impl UserProfile {
    /// Validate the registration form
    ///
    /// `user_handle` is the existing account's handle when the identity is
    /// already enrolled, a fresh v4 UUID otherwise.
    pub fn parse(form: &ProfileForm, user_handle: Uuid) -> AppResult<Self> {
        let identity = UserIdentity::parse(&form.username)?;

        let email = required("email", &form.email)?.to_lowercase();
        if !email.contains('@') {
            return Err(AppError::InputInvalid("invalid email".to_string()));
        }

        let birthdate = NaiveDate::parse_from_str(&required("birthdate", &form.birthdate)?, "%Y-%m-%d")
            .map_err(|_| AppError::InputInvalid("birthdate must be YYYY-MM-DD".to_string()))?;

        Ok(Self {
            identity,
            user_handle,
            firstname: required("firstname", &form.firstname)?,
            lastname: required("lastname", &form.lastname)?,
            idnumber: required("idnumber", &form.idnumber)?,
            contact: required("contact", &form.contact)?,
            birthdate,
            gender: required("gender", &form.gender)?,
            email,
            civilstatus: required("civilstatus", &form.civilstatus)?,
            address: required("address", &form.address)?,
        })
    }

    /// Name shown by the authenticator
    pub fn display_name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
    }
}

/// Public profile fields returned after a successful login
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    pub username: String,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
}

impl From<UserProfile> for AuthenticatedUser {
    fn from(profile: UserProfile) -> Self {
        Self {
            username: profile.identity.into(),
            firstname: profile.firstname,
            lastname: profile.lastname,
            email: profile.email,
        }
    }
}
