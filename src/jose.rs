use base64::prelude::*;
use ring::digest::{digest, SHA256};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair};
use serde::Serialize;
use thiserror::Error;

/// Flattened JWS body for an ACME POST. New accounts are signed with an embedded JWK,
/// everything after that with the account `kid`.
pub(crate) fn sign(key: &EcdsaKeyPair, kid: Option<&str>, nonce: String, url: &str, payload: &str) -> Result<String, JoseError> {
    let jwk = match kid {
        None => Some(Jwk::new(key)),
        Some(_) => None,
    };
    let protected = Protected::base64(jwk, kid, nonce, url)?;
    let payload = BASE64_URL_SAFE_NO_PAD.encode(payload);
    let signing_input = format!("{}.{}", protected, payload);
    let signature = key.sign(&SystemRandom::new(), signing_input.as_bytes())?;
    let body = Body {
        protected,
        payload,
        signature: BASE64_URL_SAFE_NO_PAD.encode(signature.as_ref()),
    };
    Ok(serde_json::to_string(&body)?)
}

/// The http-01 proof: `token.thumbprint(account key)`.
pub(crate) fn key_authorization(key: &EcdsaKeyPair, token: &str) -> Result<String, JoseError> {
    let thumbprint = Jwk::new(key).thumb_sha256_base64()?;
    Ok(format!("{}.{}", token, thumbprint))
}

#[derive(Serialize)]
struct Body {
    protected: String,
    payload: String,
    signature: String,
}

#[derive(Serialize)]
struct Protected<'a> {
    alg: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    jwk: Option<Jwk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<&'a str>,
    nonce: String,
    url: &'a str,
}

impl<'a> Protected<'a> {
    fn base64(jwk: Option<Jwk>, kid: Option<&'a str>, nonce: String, url: &'a str) -> Result<String, JoseError> {
        let protected = Self {
            alg: "ES256",
            jwk,
            kid,
            nonce,
            url,
        };
        Ok(BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(&protected)?))
    }
}

#[derive(Serialize)]
struct Jwk {
    alg: &'static str,
    crv: &'static str,
    kty: &'static str,
    #[serde(rename = "use")]
    u: &'static str,
    x: String,
    y: String,
}

impl Jwk {
    fn new(key: &EcdsaKeyPair) -> Self {
        // uncompressed point: 0x04 || x || y
        let (x, y) = key.public_key().as_ref()[1..].split_at(32);
        Self {
            alg: "ES256",
            crv: "P-256",
            kty: "EC",
            u: "sig",
            x: BASE64_URL_SAFE_NO_PAD.encode(x),
            y: BASE64_URL_SAFE_NO_PAD.encode(y),
        }
    }
    fn thumb_sha256_base64(&self) -> Result<String, JoseError> {
        // RFC 7638: required members only, lexicographic order
        let thumb = JwkThumb {
            crv: self.crv,
            kty: self.kty,
            x: &self.x,
            y: &self.y,
        };
        let hash = digest(&SHA256, &serde_json::to_vec(&thumb)?);
        Ok(BASE64_URL_SAFE_NO_PAD.encode(hash))
    }
}

#[derive(Serialize)]
struct JwkThumb<'a> {
    crv: &'a str,
    kty: &'a str,
    x: &'a str,
    y: &'a str,
}

#[derive(Error, Debug)]
pub enum JoseError {
    #[error("json serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("crypto error: {0}")]
    Crypto(#[from] ring::error::Unspecified),
}
