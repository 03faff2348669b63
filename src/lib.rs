//! # Passkey Ceremony Server
//!
//! A WebAuthn relying party: single-use challenges, a credential registry
//! with signature-counter enforcement, and the registration and
//! authentication ceremonies that tie them together.
//!
//! ## Key Concepts
//! - **Challenge Ledger** (`ledger`): one pending challenge per user and
//!   ceremony kind, consumed at most once, expiring after a time-to-live
//! - **Credential Record Store** (`credentials`, `db`): credential ids, COSE
//!   public keys and counters, with compare-and-set counter updates
//! - **Ceremonies** (`webauthn`): stateless orchestration over the two,
//!   delegating cryptography to pluggable verifiers
//! - **Transport** (`handlers`): a thin axum router

pub mod clock;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod state;
pub mod user;
pub mod webauthn;

#[cfg(test)]
pub(crate) mod test_support;
