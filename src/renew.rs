use crate::challenge::{ChallengeError, ChallengeProvider};
use crate::challenges::{RestartChallengeProvider, StoreChallengeProvider};
use crate::config::{ChallengeMode, RenewConfig};
use crate::freshness::{evaluate, is_staging_issuer, RenewalDecision};
use crate::order::{CertificateIssuer, OrderError, Registration};
use crate::platform::{custom_hostnames, Platform, PlatformError, SniEndpoint};
use crate::publish::publish;
use crate::store::StoreError;
use crate::stores::RedisStore;
use crate::Shutdown;
use std::sync::Arc;
use thiserror::Error;

/// Config var holding the location of the app's redis.
pub const REDIS_URL_CONFIG_VAR: &str = "REDIS_URL";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenewOutcome {
    /// The installed certificate is fresh enough.
    Skipped,
    Created(SniEndpoint),
    Updated(SniEndpoint),
}

/// One renewal run against one app.
///
/// Every step runs once and in order. Any failure ends the run, nothing is retried since
/// config writes and restarts are not safe to repeat quickly.
pub struct Renewal<P: Platform + 'static, I: CertificateIssuer> {
    platform: Arc<P>,
    issuer: I,
    config: RenewConfig,
    shutdown: Shutdown,
    provider: Option<Box<dyn ChallengeProvider>>,
}

impl<P: Platform + 'static, I: CertificateIssuer> Renewal<P, I> {
    pub fn new(platform: Arc<P>, issuer: I, config: RenewConfig) -> Self {
        Self {
            platform,
            issuer,
            config,
            shutdown: Shutdown::never(),
            provider: None,
        }
    }
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }
    /// Use `provider` instead of the one the challenge mode would build.
    pub fn with_provider(mut self, provider: impl ChallengeProvider + 'static) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    pub async fn run(self) -> Result<RenewOutcome, RenewError> {
        log::info!("analyzing app");
        let domains = custom_hostnames(&self.platform.domains().await?);
        if domains.is_empty() {
            return Err(RenewError::NoDomains);
        }
        log::info!("custom domains: {}", domains.join(", "));

        let endpoints = self.platform.sni_endpoints().await?;
        if endpoints.len() > 1 {
            log::warn!("found {} sni endpoints, only the first one is managed", endpoints.len());
        }
        let existing = endpoints.into_iter().next();
        match &existing {
            Some(endpoint) if self.config.force => log::info!("forcing renewal of sni endpoint {}", endpoint.id),
            Some(endpoint) => {
                match evaluate(&endpoint.certificate_chain, &domains, self.config.threshold_days, false) {
                    Ok(RenewalDecision::Skip) => {
                        log::info!("certificate is still fresh, nothing to do");
                        return Ok(RenewOutcome::Skipped);
                    }
                    Ok(RenewalDecision::Renew) => log::info!("certificate expires soon, renewing"),
                    Err(err) => log::warn!("could not read the installed certificate, renewing: {}", err),
                }
            }
            None => log::info!("no sni endpoint yet"),
        }

        let provider = match self.provider {
            Some(provider) => provider,
            None => build_provider(&self.platform, &self.config, &self.shutdown).await?,
        };
        let email = self.platform.account().await?.email;
        log::info!("obtaining certificate for {}", domains.join(", "));
        let registration = Registration {
            domains,
            email,
            agree_tos: true,
        };
        let bundle = match self.issuer.register(provider.as_ref(), &registration).await {
            Ok(bundle) => bundle,
            Err(OrderError::Challenge(ChallengeError::Cancelled)) | Err(OrderError::Cancelled) => {
                return Err(RenewError::Cancelled)
            }
            Err(err) => return Err(RenewError::Acme(err)),
        };
        log::info!("certificate issued by {}, expires {}", bundle.issuer, bundle.expires_at);
        if is_staging_issuer(&bundle.certificate_pem) {
            log::warn!("!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!");
            log::warn!("the certificate was issued by a staging CA ({})", bundle.issuer);
            log::warn!("browsers will not trust it, use the production server for real traffic");
            log::warn!("!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!");
        }

        let endpoint = publish(self.platform.as_ref(), existing.as_ref(), &bundle)
            .await
            .map_err(RenewError::Publish)?;
        match existing {
            Some(_) => {
                log::info!("updated sni endpoint {}", endpoint.id);
                Ok(RenewOutcome::Updated(endpoint))
            }
            None => {
                log::info!("created sni endpoint {}", endpoint.id);
                log::info!("point the DNS records of your domains at the sni endpoint, see `heroku domains`");
                Ok(RenewOutcome::Created(endpoint))
            }
        }
    }
}

async fn build_provider<P: Platform + 'static>(
    platform: &Arc<P>,
    config: &RenewConfig,
    shutdown: &Shutdown,
) -> Result<Box<dyn ChallengeProvider>, RenewError> {
    match &config.challenge {
        ChallengeMode::Restart => Ok(Box::new(RestartChallengeProvider::new(
            platform.clone(),
            config.poll.clone(),
            shutdown.clone(),
        ))),
        ChallengeMode::Store { redis_url } => {
            let redis_url = match redis_url {
                Some(url) => url.clone(),
                None => platform
                    .config_vars()
                    .await?
                    .remove(REDIS_URL_CONFIG_VAR)
                    .ok_or(RenewError::MissingDependencyConfig(REDIS_URL_CONFIG_VAR))?,
            };
            let store = RedisStore::connect(&redis_url).await?;
            Ok(Box::new(
                StoreChallengeProvider::new(store).loopback_timeout(config.poll.probe_timeout),
            ))
        }
    }
}

#[derive(Error, Debug)]
pub enum RenewError {
    #[error("the app has no custom domains, add one with `heroku domains:add`")]
    NoDomains,
    #[error("{0} is not configured on the app")]
    MissingDependencyConfig(&'static str),
    #[error("platform api error: {0}")]
    Platform(#[from] PlatformError),
    #[error("challenge store error: {0}")]
    Store(#[from] StoreError),
    #[error("could not obtain a certificate: {0}")]
    Acme(#[source] OrderError),
    #[error("could not install the certificate: {0}")]
    Publish(#[source] PlatformError),
    #[error("cancelled")]
    Cancelled,
}
