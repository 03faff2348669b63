//! # WebAuthn Module
//!
//! The passkey ceremonies and everything they need to judge a response.
//!
//! ## Submodules
//! - `types`: request payloads and boundary checks on client credentials
//! - `verifier`: the attestation/assertion verifier contracts
//! - `passkey`: the production verifier, backed by webauthn-rs
//! - `registration`: creating new passkey credentials
//! - `authentication`: logging in with existing passkeys
//!
//! ## WebAuthn Flow Overview
//!
//! ### Registration (Creating a Passkey)
//! 1. Client requests registration → `registration::start_registration()`
//! 2. webauthn-rs builds the creation options; the ledger records their challenge
//! 3. Client calls `navigator.credentials.create()` with them
//! 4. Client sends the credential back → `registration::finish_registration()`
//! 5. Server consumes the challenge, verifies the attestation, stores the public key
//!
//! ### Authentication (Logging In)
//! 1. Client requests authentication → `authentication::start_authentication()`
//! 2. webauthn-rs builds the request options over the user's passkeys
//! 3. Client calls `navigator.credentials.get()` to sign the challenge
//! 4. Client sends the assertion back → `authentication::finish_authentication()`
//! 5. Server consumes the challenge, verifies the signature, advances the counter

pub mod authentication;
pub mod passkey;
pub mod registration;
pub mod types;
pub mod verifier;
