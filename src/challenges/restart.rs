use crate::challenge::{challenge_url, ChallengeError, ChallengeProvider};
use crate::https_helper::{default_client_config, http_get};
use crate::{Platform, Shutdown};
use async_trait::async_trait;
use futures_rustls::rustls::ClientConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Config var the app reads the proof from.
pub const CHALLENGE_CONFIG_VAR: &str = "LETS_ENCRYPT_CHALLENGE";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Restart plus cold boot can take a while.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChallengeState {
    Idle,
    Configuring,
    Restarting,
    Polling,
    Ready,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
    pub probe_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Serves proofs through the app itself: the proof goes into a config var, the app is
/// restarted to pick it up, then the challenge url is polled until it answers 200.
///
/// `get` and `loopback` are not supported, the proof is only visible from the app side.
pub struct RestartChallengeProvider<P: Platform> {
    platform: Arc<P>,
    config_var: String,
    poll: PollSettings,
    shutdown: Shutdown,
    client_config: Arc<ClientConfig>,
    states: Mutex<HashMap<String, ChallengeState>>,
}

impl<P: Platform> RestartChallengeProvider<P> {
    pub fn new(platform: Arc<P>, poll: PollSettings, shutdown: Shutdown) -> Self {
        Self {
            platform,
            config_var: CHALLENGE_CONFIG_VAR.to_string(),
            poll,
            shutdown,
            client_config: default_client_config(),
            states: Mutex::new(HashMap::new()),
        }
    }
    pub fn config_var(mut self, name: impl Into<String>) -> Self {
        self.config_var = name.into();
        self
    }
    pub fn state(&self, token: &str) -> ChallengeState {
        self.lock().get(token).copied().unwrap_or(ChallengeState::Idle)
    }
    fn transition(&self, domain: &str, token: &str, state: ChallengeState) {
        log::debug!("challenge {} for {}: {:?}", token, domain, state);
        self.lock().insert(token.to_string(), state);
    }
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ChallengeState>> {
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
    async fn run(&self, domain: &str, token: &str, proof: &str) -> Result<(), ChallengeError> {
        self.transition(domain, token, ChallengeState::Configuring);
        log::info!("updating {} in the app configuration to {}", self.config_var, proof);
        self.platform
            .set_config_var(&self.config_var, Some(proof))
            .await
            .map_err(ChallengeError::ConfigWrite)?;

        self.transition(domain, token, ChallengeState::Restarting);
        log::info!("restarting the app");
        self.platform.restart().await.map_err(ChallengeError::Restart)?;

        self.transition(domain, token, ChallengeState::Polling);
        log::info!("waiting for the app to serve the challenge on {}", domain);
        wait_until_served(&self.client_config, &challenge_url(domain, token), &self.poll, &self.shutdown).await
    }
}

#[async_trait]
impl<P: Platform> ChallengeProvider for RestartChallengeProvider<P> {
    async fn set(&self, domain: &str, token: &str, proof: &str) -> Result<(), ChallengeError> {
        match self.run(domain, token, proof).await {
            Ok(()) => {
                self.transition(domain, token, ChallengeState::Ready);
                Ok(())
            }
            Err(err) => {
                self.transition(domain, token, ChallengeState::Failed);
                Err(err)
            }
        }
    }
    async fn get(&self, domain: &str, token: &str) -> Result<Option<String>, ChallengeError> {
        log::debug!("get({}, {}) is not supported when restarting", domain, token);
        Err(ChallengeError::NotSupported)
    }
    /// Best effort, the certificate is already decided by the time this runs.
    async fn remove(&self, domain: &str, token: &str) -> Result<(), ChallengeError> {
        log::info!("removing {} from the app configuration", self.config_var);
        if let Err(err) = self.platform.set_config_var(&self.config_var, None).await {
            log::warn!("could not remove challenge {} for {}: {}", token, domain, err);
        }
        Ok(())
    }
    async fn loopback(&self, domain: &str, token: &str) -> Result<String, ChallengeError> {
        log::debug!("loopback({}, {}) is not supported when restarting", domain, token);
        Err(ChallengeError::NotSupported)
    }
}

/// Probes `url` every `poll.interval` until it answers 200 or `poll.timeout` has passed
/// since the first probe.
pub async fn wait_until_served(
    client_config: &Arc<ClientConfig>,
    url: &str,
    poll: &PollSettings,
    shutdown: &Shutdown,
) -> Result<(), ChallengeError> {
    let deadline = Instant::now() + poll.timeout;
    let mut last_status = None;
    loop {
        match http_get(client_config, url, poll.probe_timeout).await {
            Ok((200, _)) => {
                log::info!("{} is served", url);
                return Ok(());
            }
            Ok((status, _)) => {
                log::debug!("{} answered {}", url, status);
                last_status = Some(status);
            }
            Err(err) => log::debug!("{} not reachable yet: {}", url, err),
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(ChallengeError::Timeout { last_status });
        }
        let pause = poll.interval.min(deadline - now);
        if shutdown.sleep(pause).await.is_err() {
            return Err(ChallengeError::Cancelled);
        }
    }
}
