use crate::acme::{Account, AcmeError, Auth, AuthStatus, Directory, Order, OrderStatus, LETS_ENCRYPT_PRODUCTION_DIRECTORY};
use crate::certificate::{CertParseError, CertificateBundle};
use crate::challenge::{ChallengeError, ChallengeProvider};
use crate::https_helper::default_client_config;
use crate::Shutdown;
use async_trait::async_trait;
use futures_rustls::rustls::ClientConfig;
use rcgen::{CertificateParams, DistinguishedName, KeyPair};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// What to ask the CA for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub domains: Vec<String>,
    /// Plain address, `mailto:` is added when registering the account.
    pub email: String,
    pub agree_tos: bool,
}

/// Obtains a signed certificate for a set of domains, answering http-01 challenges through
/// `provider`.
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    async fn register(&self, provider: &dyn ChallengeProvider, registration: &Registration) -> Result<CertificateBundle, OrderError>;
}

/// ACME v2 issuer. A fresh account key is generated for every registration.
#[derive(Clone)]
pub struct AcmeClient {
    directory_url: String,
    client_config: Arc<ClientConfig>,
    verify_served: bool,
    shutdown: Shutdown,
}

impl AcmeClient {
    pub fn new(directory_url: impl ToString) -> Self {
        Self {
            directory_url: directory_url.to_string(),
            client_config: default_client_config(),
            verify_served: true,
            shutdown: Shutdown::never(),
        }
    }
    /// Backoff waits end early with [`OrderError::Cancelled`] once `shutdown` fires.
    /// Challenges already set are still removed.
    pub fn shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }
    /// Fetch every challenge url ourselves before asking the CA to validate it.
    /// Providers that cannot do so are skipped.
    pub fn verify_served(mut self, verify: bool) -> Self {
        self.verify_served = verify;
        self
    }
    pub fn directory_url(&self) -> &str {
        &self.directory_url
    }
}

impl Default for AcmeClient {
    fn default() -> Self {
        Self::new(LETS_ENCRYPT_PRODUCTION_DIRECTORY)
    }
}

#[async_trait]
impl CertificateIssuer for AcmeClient {
    async fn register(&self, provider: &dyn ChallengeProvider, registration: &Registration) -> Result<CertificateBundle, OrderError> {
        let client_config = &self.client_config;
        log::info!("registering {} with {}", registration.email, self.directory_url);
        let directory = Directory::discover(client_config, &self.directory_url).await?;
        let contact = vec![format!("mailto:{}", registration.email)];
        let key_pair = Account::generate_key_pair()?;
        let account = Account::create_with_keypair(client_config, directory, &contact, registration.agree_tos, &key_pair).await?;
        let process = OrderProcess {
            account: &account,
            client_config,
            provider,
            verify_served: self.verify_served,
            shutdown: &self.shutdown,
        };
        process.run(&registration.domains).await
    }
}

struct OrderProcess<'a> {
    account: &'a Account,
    client_config: &'a Arc<ClientConfig>,
    provider: &'a dyn ChallengeProvider,
    verify_served: bool,
    shutdown: &'a Shutdown,
}

impl<'a> OrderProcess<'a> {
    async fn run(&self, domains: &[String]) -> Result<CertificateBundle, OrderError> {
        let (url, mut order) = self.account.new_order(self.client_config, domains).await?;
        let key_pair = KeyPair::generate()?;
        let mut authorized = false;
        loop {
            order = match order.status {
                // the CA has not caught up with the valid authorizations yet
                OrderStatus::Pending if authorized => self.wait_while(&url, OrderStatus::Pending).await?,
                OrderStatus::Pending => {
                    // one at a time, a provider may only hold one challenge
                    for auth_url in &order.authorizations {
                        self.authorize(auth_url).await?;
                    }
                    log::info!("completed all authorizations");
                    authorized = true;
                    self.account.order(self.client_config, &url).await?
                }
                OrderStatus::Processing => self.wait_while(&url, OrderStatus::Processing).await?,
                OrderStatus::Ready => {
                    log::info!("sending csr");
                    let mut params = CertificateParams::new(domains.to_vec())?;
                    params.distinguished_name = DistinguishedName::new();
                    let csr = params.serialize_request(&key_pair)?;
                    self.account.finalize(self.client_config, &order.finalize, csr.der()).await?
                }
                OrderStatus::Valid { ref certificate } => {
                    log::info!("download certificate");
                    let chain = self.account.certificate(self.client_config, certificate).await?;
                    return Ok(CertificateBundle::from_pem(key_pair.serialize_pem(), &chain)?);
                }
                OrderStatus::Invalid => return Err(OrderError::BadOrder(order)),
            }
        }
    }

    async fn sleep(&self, duration: Duration) -> Result<(), OrderError> {
        self.shutdown.sleep(duration).await.map_err(|_| OrderError::Cancelled)
    }

    /// Refetches the order with backoff until it leaves `status`.
    async fn wait_while(&self, url: &str, status: OrderStatus) -> Result<Order, OrderError> {
        for i in 0u64..10 {
            log::info!("order {:?}", status);
            self.sleep(Duration::from_secs(1u64 << i)).await?;
            let order = self.account.order(self.client_config, url).await?;
            if order.status != status {
                return Ok(order);
            }
        }
        let order = self.account.order(self.client_config, url).await?;
        match order.status == status {
            true => Err(OrderError::ProcessingTimeout(order)),
            false => Ok(order),
        }
    }

    async fn authorize(&self, url: &str) -> Result<(), OrderError> {
        let auth = self.account.auth(self.client_config, url).await?;
        match auth.status {
            AuthStatus::Pending => {}
            AuthStatus::Valid => return Ok(()),
            _ => return Err(OrderError::BadAuth(auth)),
        }
        let domain = auth.identifier.domain().to_string();
        let (challenge, proof) = self.account.http_01(&auth.challenges)?;
        let token = challenge.token.clone();
        let challenge_url = challenge.url.clone();

        log::info!("trigger challenge for {}", domain);
        let result = self.validate(url, &domain, &token, &proof, &challenge_url).await;
        if let Err(err) = self.provider.remove(&domain, &token).await {
            log::warn!("could not remove challenge {} for {}: {}", token, domain, err);
        }
        result
    }

    async fn validate(&self, url: &str, domain: &str, token: &str, proof: &str, challenge_url: &str) -> Result<(), OrderError> {
        self.provider.set(domain, token, proof).await?;
        if self.verify_served {
            match self.provider.verify(domain, token, proof).await {
                Ok(()) => log::info!("challenge for {} is served", domain),
                Err(ChallengeError::NotSupported) => log::debug!("skipping self check for {}", domain),
                Err(err) => return Err(err.into()),
            }
        }
        self.account.challenge(self.client_config, challenge_url).await?;
        for i in 0u64..5 {
            self.sleep(Duration::from_secs(1u64 << i)).await?;
            let auth = self.account.auth(self.client_config, url).await?;
            match auth.status {
                AuthStatus::Pending => {
                    log::info!("authorization for {} still pending", domain);
                    self.account.challenge(self.client_config, challenge_url).await?
                }
                AuthStatus::Valid => return Ok(()),
                _ => return Err(OrderError::BadAuth(auth)),
            }
        }
        Err(OrderError::TooManyAttemptsAuth(domain.to_string()))
    }
}

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("acme error: {0}")]
    Acme(#[from] AcmeError),
    #[error("certificate generation error: {0}")]
    Rcgen(#[from] rcgen::Error),
    #[error("bad order object: {0:?}")]
    BadOrder(Order),
    #[error("bad auth object: {0:?}")]
    BadAuth(Auth),
    #[error("authorization for {0} failed too many times")]
    TooManyAttemptsAuth(String),
    #[error("order stayed {:?} too long", .0.status)]
    ProcessingTimeout(Order),
    #[error("certificate parsing error: {0}")]
    CertParse(#[from] CertParseError),
    #[error("challenge error: {0}")]
    Challenge(#[from] ChallengeError),
    #[error("cancelled")]
    Cancelled,
}
