use crate::https_helper::HttpsRequestError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// App-scoped view of the hosting platform API.
#[async_trait]
pub trait Platform: Send + Sync {
    async fn domains(&self) -> Result<Vec<Domain>, PlatformError>;
    async fn config_vars(&self) -> Result<HashMap<String, String>, PlatformError>;
    /// `None` unsets the variable.
    async fn set_config_var(&self, key: &str, value: Option<&str>) -> Result<(), PlatformError>;
    /// Restarts every process of the app. Returns once the supervisor has accepted the request.
    async fn restart(&self) -> Result<(), PlatformError>;
    async fn sni_endpoints(&self) -> Result<Vec<SniEndpoint>, PlatformError>;
    async fn create_sni_endpoint(&self, certificate_chain: &str, private_key: &str) -> Result<SniEndpoint, PlatformError>;
    async fn update_sni_endpoint(&self, id: &str, certificate_chain: &str, private_key: &str) -> Result<SniEndpoint, PlatformError>;
    async fn account(&self) -> Result<PlatformAccount, PlatformError>;
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Domain {
    pub hostname: String,
    pub kind: String,
}

impl Domain {
    pub fn is_custom(&self) -> bool {
        self.kind == "custom"
    }
}

/// Hostnames of the custom domains, platform managed default domains left out.
pub fn custom_hostnames(domains: &[Domain]) -> Vec<String> {
    domains.iter().filter(|d| d.is_custom()).map(|d| d.hostname.clone()).collect()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SniEndpoint {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub certificate_chain: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct PlatformAccount {
    pub email: String,
}

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("platform api request failed: {0}")]
    Http(#[from] HttpsRequestError),
    #[error("unexpected platform api response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Rejected(String),
}
