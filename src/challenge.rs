use crate::https_helper::{http_get, HttpsRequestError};
use crate::platform::PlatformError;
use crate::store::StoreError;
use async_trait::async_trait;
use futures_rustls::rustls::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Path the validator fetches for `token`, also the key the proof is stored under.
pub fn challenge_path(token: &str) -> String {
    format!("{}{}", ACME_CHALLENGE_PREFIX, token)
}

pub fn challenge_url(domain: &str, token: &str) -> String {
    format!("http://{}{}", domain, challenge_path(token))
}

/// Makes http-01 proofs fetchable at `http://{domain}/.well-known/acme-challenge/{token}`.
///
/// At most one challenge per domain is outstanding at a time. Calls for the same token
/// must not overlap.
#[async_trait]
pub trait ChallengeProvider: Send + Sync {
    async fn set(&self, domain: &str, token: &str, proof: &str) -> Result<(), ChallengeError>;
    async fn get(&self, domain: &str, token: &str) -> Result<Option<String>, ChallengeError>;
    /// Succeeds when nothing is stored for `token`.
    async fn remove(&self, domain: &str, token: &str) -> Result<(), ChallengeError>;
    /// Fetches the challenge url over plain http and returns the body.
    async fn loopback(&self, domain: &str, token: &str) -> Result<String, ChallengeError>;

    /// Checks that the challenge url serves exactly `proof`.
    async fn verify(&self, domain: &str, token: &str, proof: &str) -> Result<(), ChallengeError> {
        let served = self.loopback(domain, token).await?;
        match served.trim() == proof {
            true => Ok(()),
            false => Err(ChallengeError::ProofMismatch {
                url: challenge_url(domain, token),
                served,
            }),
        }
    }
}

#[derive(Error, Debug)]
pub enum ChallengeError {
    #[error("could not write the challenge to the app configuration: {0}")]
    ConfigWrite(#[source] PlatformError),
    #[error("could not restart the app: {0}")]
    Restart(#[source] PlatformError),
    #[error("the app did not serve the challenge in time, last status: {}", display_status(.last_status))]
    Timeout { last_status: Option<u16> },
    #[error("{url} is unreachable: {source}")]
    Unreachable { url: String, source: HttpsRequestError },
    #[error("{url} answered with status {status}")]
    UnexpectedStatus { url: String, status: u16 },
    #[error("{url} served {served:?} instead of the expected proof")]
    ProofMismatch { url: String, served: String },
    #[error("challenge store error: {0}")]
    Store(#[from] StoreError),
    #[error("not supported by this challenge provider")]
    NotSupported,
    #[error("cancelled while waiting for the challenge")]
    Cancelled,
}

fn display_status(status: &Option<u16>) -> String {
    match status {
        Some(status) => status.to_string(),
        None => "none".to_string(),
    }
}

/// One GET of the challenge url, any status but 200 is an error.
pub(crate) async fn fetch_challenge(
    client_config: &Arc<ClientConfig>,
    domain: &str,
    token: &str,
    limit: Duration,
) -> Result<String, ChallengeError> {
    let url = challenge_url(domain, token);
    match http_get(client_config, &url, limit).await {
        Ok((200, body)) => Ok(body),
        Ok((status, _)) => Err(ChallengeError::UnexpectedStatus { url, status }),
        Err(source) => Err(ChallengeError::Unreachable { url, source }),
    }
}
