//! A platform authenticator in software.
//!
//! Produces real `none`-attestation registrations and signed assertions
//! for ES256 (P-256) and RS256 (RSA-2048) keys, so ceremonies run through
//! the production verifier end to end. Shared by the unit tests and the
//! integration tests.

use base64::prelude::*;
use ciborium::value::Value as Cbor;
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::sign::Signer;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use webauthn_rs_proto::{
    CreationChallengeResponse, PublicKeyCredential, RegisterPublicKeyCredential, RequestChallengeResponse,
};

pub const ORIGIN: &str = "http://localhost:8080";

pub const FLAG_UP: u8 = 0x01;
pub const FLAG_UV: u8 = 0x04;
pub const FLAG_AT: u8 = 0x40;

pub const COSE_ALG_ES256: i64 = -7;
pub const COSE_ALG_RS256: i64 = -257;

fn b64(bytes: &[u8]) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

fn int(value: i64) -> Cbor {
    Cbor::Integer(value.into())
}

fn cbor(value: &Cbor) -> Vec<u8> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).unwrap();
    buf
}

pub struct SoftAuthenticator {
    key: PKey<Private>,
    cose_key: Vec<u8>,
    credential_id: Vec<u8>,
    pub user_handle: Option<String>,
    pub origin: String,
    pub flags: u8,
}

impl SoftAuthenticator {
    fn with_key(label: &str, key: PKey<Private>, cose_key: Vec<u8>) -> Self {
        Self {
            key,
            cose_key,
            // same label, same credential id
            credential_id: Sha256::digest(label.as_bytes()).to_vec(),
            user_handle: None,
            origin: ORIGIN.to_string(),
            flags: FLAG_UP | FLAG_UV,
        }
    }

    /// P-256 key, COSE algorithm -7
    pub fn es256(label: &str) -> Self {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let ec = EcKey::generate(&group).unwrap();

        let mut ctx = BigNumContext::new().unwrap();
        let mut x = BigNum::new().unwrap();
        let mut y = BigNum::new().unwrap();
        ec.public_key()
            .affine_coordinates_gfp(&group, &mut x, &mut y, &mut ctx)
            .unwrap();

        let cose_key = cbor(&Cbor::Map(vec![
            (int(1), int(2)),
            (int(3), int(COSE_ALG_ES256)),
            (int(-1), int(1)),
            (int(-2), Cbor::Bytes(x.to_vec_padded(32).unwrap())),
            (int(-3), Cbor::Bytes(y.to_vec_padded(32).unwrap())),
        ]));
        Self::with_key(label, PKey::from_ec_key(ec).unwrap(), cose_key)
    }

    /// RSA-2048 key, COSE algorithm -257 (PKCS#1 v1.5 with SHA-256)
    pub fn rs256(label: &str) -> Self {
        let rsa = Rsa::generate(2048).unwrap();
        let cose_key = cbor(&Cbor::Map(vec![
            (int(1), int(3)),
            (int(3), int(COSE_ALG_RS256)),
            (int(-1), Cbor::Bytes(rsa.n().to_vec())),
            (int(-2), Cbor::Bytes(rsa.e().to_vec())),
        ]));
        Self::with_key(label, PKey::from_rsa(rsa).unwrap(), cose_key)
    }

    pub fn credential_id(&self) -> &[u8] {
        &self.credential_id
    }

    fn client_data(&self, type_: &str, challenge: &str) -> Vec<u8> {
        json!({
            "type": type_,
            "challenge": challenge,
            "origin": self.origin,
            "crossOrigin": false,
        })
        .to_string()
        .into_bytes()
    }

    fn auth_data(&self, rp_id: &str, flags: u8, sign_count: u32) -> Vec<u8> {
        let mut data = Sha256::digest(rp_id.as_bytes()).to_vec();
        data.push(flags);
        data.extend_from_slice(&sign_count.to_be_bytes());
        data
    }

    fn sign(&self, auth_data: &[u8], client_data_json: &[u8]) -> Vec<u8> {
        let mut signer = Signer::new(MessageDigest::sha256(), &self.key).unwrap();
        signer.update(auth_data).unwrap();
        signer.update(&Sha256::digest(client_data_json)).unwrap();
        signer.sign_to_vec().unwrap()
    }

    /// Answer `navigator.credentials.create()`
    pub fn attest(&mut self, options: &CreationChallengeResponse) -> RegisterPublicKeyCredential {
        let options = serde_json::to_value(options).unwrap();
        let public_key = &options["publicKey"];
        self.user_handle = public_key["user"]["id"].as_str().map(str::to_string);

        let challenge = public_key["challenge"].as_str().unwrap();
        let rp_id = public_key["rp"]["id"].as_str().unwrap();
        let client_data_json = self.client_data("webauthn.create", challenge);

        let mut auth_data = self.auth_data(rp_id, self.flags | FLAG_AT, 0);
        auth_data.extend_from_slice(&[0; 16]);
        auth_data.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
        auth_data.extend_from_slice(&self.credential_id);
        auth_data.extend_from_slice(&self.cose_key);

        let attestation_object = cbor(&Cbor::Map(vec![
            (Cbor::Text("fmt".into()), Cbor::Text("none".into())),
            (Cbor::Text("attStmt".into()), Cbor::Map(vec![])),
            (Cbor::Text("authData".into()), Cbor::Bytes(auth_data)),
        ]));

        serde_json::from_value(json!({
            "id": b64(&self.credential_id),
            "rawId": b64(&self.credential_id),
            "type": "public-key",
            "response": {
                "attestationObject": b64(&attestation_object),
                "clientDataJSON": b64(&client_data_json),
            },
            "extensions": {},
        }))
        .unwrap()
    }

    /// Answer `navigator.credentials.get()` reporting `sign_count`
    pub fn assert(&self, options: &RequestChallengeResponse, sign_count: u32) -> PublicKeyCredential {
        let options = serde_json::to_value(options).unwrap();
        let public_key = &options["publicKey"];

        let challenge = public_key["challenge"].as_str().unwrap();
        let rp_id = public_key["rpId"].as_str().unwrap();
        let client_data_json = self.client_data("webauthn.get", challenge);
        let auth_data = self.auth_data(rp_id, self.flags, sign_count);
        let signature = self.sign(&auth_data, &client_data_json);

        serde_json::from_value(json!({
            "id": b64(&self.credential_id),
            "rawId": b64(&self.credential_id),
            "type": "public-key",
            "response": {
                "authenticatorData": b64(&auth_data),
                "clientDataJSON": b64(&client_data_json),
                "signature": b64(&signature),
                "userHandle": self.user_handle.clone().map(Value::String).unwrap_or(Value::Null),
            },
            "extensions": {},
        }))
        .unwrap()
    }
}
