use crate::acme::{LETS_ENCRYPT_PRODUCTION_DIRECTORY, LETS_ENCRYPT_STAGING_DIRECTORY};
use crate::challenges::PollSettings;
use crate::order::AcmeClient;
use std::time::Duration;

pub const DEFAULT_THRESHOLD_DAYS: i64 = 7;

/// How http-01 proofs reach the app.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChallengeMode {
    /// Through a redis instance the app reads from. Without a url the app's `REDIS_URL`
    /// config var is used.
    Store { redis_url: Option<String> },
    /// Through a config var and an app restart.
    Restart,
}

impl Default for ChallengeMode {
    fn default() -> Self {
        ChallengeMode::Store { redis_url: None }
    }
}

#[derive(Clone, Debug)]
pub struct RenewConfig {
    pub(crate) directory_url: String,
    pub(crate) threshold_days: i64,
    pub(crate) force: bool,
    pub(crate) challenge: ChallengeMode,
    pub(crate) poll: PollSettings,
    pub(crate) verify_served: bool,
}

impl Default for RenewConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RenewConfig {
    pub fn new() -> Self {
        RenewConfig {
            directory_url: LETS_ENCRYPT_PRODUCTION_DIRECTORY.to_string(),
            threshold_days: DEFAULT_THRESHOLD_DAYS,
            force: false,
            challenge: ChallengeMode::default(),
            poll: PollSettings::default(),
            verify_served: true,
        }
    }
    pub fn directory(mut self, directory_url: impl ToString) -> Self {
        self.directory_url = directory_url.to_string();
        self
    }
    pub fn directory_lets_encrypt(mut self, production: bool) -> Self {
        self.directory_url = match production {
            true => LETS_ENCRYPT_PRODUCTION_DIRECTORY,
            false => LETS_ENCRYPT_STAGING_DIRECTORY,
        }
        .to_string();
        self
    }
    /// `production`, `staging` or a full directory url.
    pub fn server(self, server: &str) -> Self {
        match server {
            "production" => self.directory_lets_encrypt(true),
            "staging" => self.directory_lets_encrypt(false),
            url => self.directory(url),
        }
    }
    /// Renew once fewer than `days` whole days of validity remain.
    pub fn threshold(mut self, days: i64) -> Self {
        self.threshold_days = days;
        self
    }
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
    pub fn challenge(mut self, mode: ChallengeMode) -> Self {
        self.challenge = mode;
        self
    }
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll.interval = interval;
        self
    }
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll.timeout = timeout;
        self
    }
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.poll.probe_timeout = timeout;
        self
    }
    /// Fetch each challenge url before asking the CA to validate it.
    pub fn verify_served(mut self, verify: bool) -> Self {
        self.verify_served = verify;
        self
    }

    pub fn directory_url(&self) -> &str {
        &self.directory_url
    }
    pub fn threshold_days(&self) -> i64 {
        self.threshold_days
    }
    pub fn is_forced(&self) -> bool {
        self.force
    }
    pub fn challenge_mode(&self) -> &ChallengeMode {
        &self.challenge
    }
    pub fn poll_settings(&self) -> &PollSettings {
        &self.poll
    }

    /// Issuer talking to the configured directory.
    pub fn acme_client(&self) -> AcmeClient {
        AcmeClient::new(&self.directory_url).verify_served(self.verify_served)
    }
}
