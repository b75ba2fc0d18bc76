use base64::prelude::*;
use crate::https_helper::{https, HttpsRequestError, HttpsResponse};
use crate::jose::{key_authorization, sign, JoseError};
use futures_rustls::rustls::ClientConfig;
use http_types::Method;
use ring::error::{KeyRejected, Unspecified};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

pub const LETS_ENCRYPT_STAGING_DIRECTORY: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";
pub const LETS_ENCRYPT_PRODUCTION_DIRECTORY: &str = "https://acme-v02.api.letsencrypt.org/directory";

const JOSE_CONTENT_TYPE: &str = "application/jose+json";

#[derive(Debug)]
pub struct Account {
    pub key_pair: EcdsaKeyPair,
    pub directory: Directory,
    pub kid: String,
}

impl Account {
    pub fn generate_key_pair() -> Result<Vec<u8>, AcmeError> {
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &SystemRandom::new())?;
        Ok(pkcs8.as_ref().to_vec())
    }
    pub async fn create_with_keypair(
        client_config: &Arc<ClientConfig>,
        directory: Directory,
        contact: &[String],
        agree_tos: bool,
        key_pair: &[u8],
    ) -> Result<Self, AcmeError> {
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, key_pair, &SystemRandom::new())?;
        let payload = json!({
            "termsOfServiceAgreed": agree_tos,
            "contact": contact,
        })
        .to_string();
        let body = sign(&key_pair, None, directory.nonce(client_config).await?, &directory.new_account, &payload)?;
        let response = post(client_config, &directory.new_account, body).await?;
        let kid = get_header(&response, "Location")?;
        log::debug!("acme account {}", kid);
        Ok(Account { key_pair, directory, kid })
    }
    async fn request(&self, client_config: &Arc<ClientConfig>, url: impl AsRef<str>, payload: &str) -> Result<(Option<String>, String), AcmeError> {
        let body = sign(
            &self.key_pair,
            Some(&self.kid),
            self.directory.nonce(client_config).await?,
            url.as_ref(),
            payload,
        )?;
        let response = post(client_config, url.as_ref(), body).await?;
        let location = response.header("Location");
        log::debug!("response: {:?}", response.body);
        Ok((location, response.body))
    }
    pub async fn new_order(&self, client_config: &Arc<ClientConfig>, domains: &[String]) -> Result<(String, Order), AcmeError> {
        let identifiers: Vec<Identifier> = domains.iter().cloned().map(Identifier::Dns).collect();
        let payload = json!({ "identifiers": identifiers }).to_string();
        let (location, body) = self.request(client_config, &self.directory.new_order, &payload).await?;
        let url = location.ok_or(AcmeError::MissingHeader("Location"))?;
        Ok((url, serde_json::from_str(&body)?))
    }
    pub async fn auth(&self, client_config: &Arc<ClientConfig>, url: impl AsRef<str>) -> Result<Auth, AcmeError> {
        let (_, body) = self.request(client_config, url, "").await?;
        Ok(serde_json::from_str(&body)?)
    }
    pub async fn challenge(&self, client_config: &Arc<ClientConfig>, url: impl AsRef<str>) -> Result<(), AcmeError> {
        self.request(client_config, url, "{}").await?;
        Ok(())
    }
    pub async fn order(&self, client_config: &Arc<ClientConfig>, url: impl AsRef<str>) -> Result<Order, AcmeError> {
        let (_, body) = self.request(client_config, url, "").await?;
        Ok(serde_json::from_str(&body)?)
    }
    pub async fn finalize(&self, client_config: &Arc<ClientConfig>, url: impl AsRef<str>, csr: &[u8]) -> Result<Order, AcmeError> {
        let payload = json!({ "csr": BASE64_URL_SAFE_NO_PAD.encode(csr) }).to_string();
        let (_, body) = self.request(client_config, url, &payload).await?;
        Ok(serde_json::from_str(&body)?)
    }
    pub async fn certificate(&self, client_config: &Arc<ClientConfig>, url: impl AsRef<str>) -> Result<String, AcmeError> {
        Ok(self.request(client_config, url, "").await?.1)
    }
    /// Picks the http-01 challenge and computes the proof to serve for it.
    pub fn http_01<'a>(&self, challenges: &'a [Challenge]) -> Result<(&'a Challenge, String), AcmeError> {
        let challenge = challenges
            .iter()
            .find(|c| c.typ == ChallengeType::Http01)
            .ok_or(AcmeError::NoHttp01Challenge)?;
        let key_auth = key_authorization(&self.key_pair, &challenge.token)?;
        Ok((challenge, key_auth))
    }
}

async fn post(client_config: &Arc<ClientConfig>, url: &str, body: String) -> Result<HttpsResponse, HttpsRequestError> {
    https(client_config, url, Method::Post, &[], Some((body, JOSE_CONTENT_TYPE))).await
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    pub new_nonce: String,
    pub new_account: String,
    pub new_order: String,
}

impl Directory {
    pub async fn discover(client_config: &Arc<ClientConfig>, url: impl AsRef<str>) -> Result<Self, AcmeError> {
        let response = https(client_config, url, Method::Get, &[], None).await?;
        Ok(serde_json::from_str(&response.body)?)
    }
    pub async fn nonce(&self, client_config: &Arc<ClientConfig>) -> Result<String, AcmeError> {
        let response = https(client_config, &self.new_nonce, Method::Get, &[], None).await?;
        get_header(&response, "Replay-Nonce")
    }
}

#[derive(Debug, Deserialize, Eq, PartialEq)]
pub enum ChallengeType {
    #[serde(rename = "http-01")]
    Http01,
    #[serde(rename = "dns-01")]
    Dns01,
    #[serde(rename = "tls-alpn-01")]
    TlsAlpn01,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(flatten)]
    pub status: OrderStatus,
    #[serde(default)]
    pub authorizations: Vec<String>,
    pub finalize: String,
    #[serde(default)]
    pub error: Option<Problem>,
}

#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum OrderStatus {
    Pending,
    Ready,
    Valid { certificate: String },
    Invalid,
    Processing,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auth {
    pub status: AuthStatus,
    pub identifier: Identifier,
    #[serde(default)]
    pub challenges: Vec<Challenge>,
}

#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthStatus {
    Pending,
    Valid,
    Invalid,
    Revoked,
    Expired,
    Deactivated,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Identifier {
    Dns(String),
}

impl Identifier {
    pub fn domain(&self) -> &str {
        match self {
            Identifier::Dns(domain) => domain,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Challenge {
    #[serde(rename = "type")]
    pub typ: ChallengeType,
    pub url: String,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct Problem {
    #[serde(rename = "type", default)]
    pub typ: String,
    #[serde(default)]
    pub detail: String,
}

#[derive(Error, Debug)]
pub enum AcmeError {
    #[error("JOSE error: {0}")]
    Jose(#[from] JoseError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("http request error: {0}")]
    HttpRequest(#[from] HttpsRequestError),
    #[error("invalid key pair: {0}")]
    KeyRejected(#[from] KeyRejected),
    #[error("crypto error: {0}")]
    Crypto(#[from] Unspecified),
    #[error("acme service response is missing {0} header")]
    MissingHeader(&'static str),
    #[error("no http-01 challenge found")]
    NoHttp01Challenge,
}

fn get_header(response: &HttpsResponse, header: &'static str) -> Result<String, AcmeError> {
    response.header(header).ok_or(AcmeError::MissingHeader(header))
}
