//! Doubles shared by the unit tests.

use crate::certificate::CertificateBundle;
use crate::challenge::{ChallengeError, ChallengeProvider};
use crate::order::{CertificateIssuer, OrderError, Registration};
use crate::platform::{Domain, Platform, PlatformAccount, PlatformError, SniEndpoint};
use async_std::net::TcpListener;
use async_trait::async_trait;
use chrono::{Datelike, Duration as ChronoDuration, Utc};
use futures::StreamExt;
use http_types::{Request, Response};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug)]
pub(crate) struct Ymd(i32, u8, u8);

pub(crate) fn ymd(year: i32, month: u8, day: u8) -> Ymd {
    Ymd(year, month, day)
}

/// Self signed certificate, so the issuer is `common_name` too. Returns key and cert pem.
pub(crate) fn certificate(common_name: &str, domains: &[&str], not_before: Ymd, not_after: Ymd) -> (String, String) {
    let key_pair = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(domains.iter().map(|d| d.to_string()).collect::<Vec<_>>()).unwrap();
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, common_name);
    params.not_before = rcgen::date_time_ymd(not_before.0, not_before.1, not_before.2);
    params.not_after = rcgen::date_time_ymd(not_after.0, not_after.1, not_after.2);
    let cert = params.self_signed(&key_pair).unwrap();
    (key_pair.serialize_pem(), cert.pem())
}

fn days_from_now(days: i64) -> Ymd {
    let date = (Utc::now() + ChronoDuration::days(days)).date_naive();
    ymd(date.year(), date.month() as u8, date.day() as u8)
}

pub(crate) fn certificate_expiring_in(days: i64) -> String {
    certificate("R3", &["www.example.com"], days_from_now(-60), days_from_now(days)).1
}

pub(crate) fn bundle(domain: &str, days: i64) -> CertificateBundle {
    let (key, cert) = certificate("R3", &[domain], days_from_now(-1), days_from_now(days));
    CertificateBundle::from_pem(key, &cert).unwrap()
}

#[derive(Clone, Debug)]
pub(crate) struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
    pub authorization: Option<String>,
    pub accept: Option<String>,
}

#[derive(Default)]
struct ServerState {
    status: u16,
    body: String,
    routes: HashMap<String, VecDeque<(u16, String)>>,
    headers: Vec<(String, String)>,
    requests: Vec<RecordedRequest>,
}

/// Local HTTP/1.1 server on 127.0.0.1. Paths without a route get the default status and
/// body. A route given several responses plays them in order and then repeats the last.
#[derive(Clone)]
pub(crate) struct TestServer {
    port: u16,
    state: Arc<Mutex<ServerState>>,
}

impl TestServer {
    pub async fn start(status: u16, body: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(ServerState {
            status,
            body: body.to_string(),
            ..Default::default()
        }));
        let shared = state.clone();
        async_std::task::spawn(async move {
            let mut incoming = listener.incoming();
            while let Some(Ok(stream)) = incoming.next().await {
                let state = shared.clone();
                async_std::task::spawn(async move {
                    let _ = async_h1::accept(stream, |request| respond(state.clone(), request)).await;
                });
            }
        });
        TestServer { port, state }
    }

    /// A `host:port` nothing listens on.
    pub async fn unused_domain() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("127.0.0.1:{}", port)
    }

    pub fn domain(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.domain(), path)
    }
    pub fn route(&self, path: &str, status: u16, body: &str) {
        let mut state = self.state.lock().unwrap();
        state.routes.entry(path.to_string()).or_default().push_back((status, body.to_string()));
    }
    pub fn default_header(&self, name: &str, value: impl Into<String>) {
        self.state.lock().unwrap().headers.push((name.to_string(), value.into()));
    }
    pub fn set_status(&self, status: u16) {
        self.state.lock().unwrap().status = status;
    }
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }
}

async fn respond(state: Arc<Mutex<ServerState>>, mut request: Request) -> http_types::Result<Response> {
    let body = request.body_string().await?;
    let header = |name: &str| request.header(name).map(|values| values.last().to_string());
    let recorded = RecordedRequest {
        method: request.method().to_string(),
        path: request.url().path().to_string(),
        body,
        authorization: header("Authorization"),
        accept: header("Accept"),
    };
    let (status, body, headers) = {
        let mut guard = state.lock().unwrap();
        let state = &mut *guard;
        let (status, body) = match state.routes.get_mut(&recorded.path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => (state.status, state.body.clone()),
        };
        state.requests.push(recorded);
        (status, body, state.headers.clone())
    };
    let mut response = Response::new(status);
    for (name, value) in headers {
        response.insert_header(name.as_str(), value.as_str());
    }
    response.set_body(body);
    Ok(response)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    Domains,
    ConfigVars,
    SetConfigVar(String, Option<String>),
    Restart,
    SniEndpoints,
    CreateSniEndpoint,
    UpdateSniEndpoint(String),
    Account,
}

#[derive(Default)]
struct PlatformState {
    domains: Vec<Domain>,
    config_vars: HashMap<String, String>,
    endpoints: Vec<SniEndpoint>,
    private_keys: HashMap<String, String>,
    calls: Vec<Call>,
    fail_config_writes: bool,
    fail_restarts: bool,
    fail_publishing: bool,
}

/// In-memory app that records every call made to it.
#[derive(Default)]
pub(crate) struct FakePlatform {
    state: Mutex<PlatformState>,
}

impl FakePlatform {
    fn lock(&self) -> std::sync::MutexGuard<'_, PlatformState> {
        self.state.lock().unwrap()
    }
    fn record(&self, call: Call) -> std::sync::MutexGuard<'_, PlatformState> {
        let mut state = self.lock();
        state.calls.push(call);
        state
    }
    pub fn add_domain(&self, hostname: &str, kind: &str) {
        self.lock().domains.push(Domain {
            hostname: hostname.to_string(),
            kind: kind.to_string(),
        });
    }
    pub fn add_endpoint(&self, certificate_chain: &str) -> SniEndpoint {
        let mut state = self.lock();
        let endpoint = SniEndpoint {
            id: format!("ep-{}", state.endpoints.len() + 1),
            name: None,
            certificate_chain: certificate_chain.to_string(),
        };
        state.endpoints.push(endpoint.clone());
        endpoint
    }
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }
    pub fn endpoints(&self) -> Vec<SniEndpoint> {
        self.lock().endpoints.clone()
    }
    pub fn config_var(&self, key: &str) -> Option<String> {
        self.lock().config_vars.get(key).cloned()
    }
    pub fn private_key(&self, id: &str) -> Option<String> {
        self.lock().private_keys.get(id).cloned()
    }
    pub fn fail_config_writes(&self, fail: bool) {
        self.lock().fail_config_writes = fail;
    }
    pub fn fail_restarts(&self, fail: bool) {
        self.lock().fail_restarts = fail;
    }
    pub fn fail_publishing(&self, fail: bool) {
        self.lock().fail_publishing = fail;
    }
}

fn rejected(what: &str) -> PlatformError {
    PlatformError::Rejected(format!("{} rejected", what))
}

#[async_trait]
impl Platform for FakePlatform {
    async fn domains(&self) -> Result<Vec<Domain>, PlatformError> {
        Ok(self.record(Call::Domains).domains.clone())
    }
    async fn config_vars(&self) -> Result<HashMap<String, String>, PlatformError> {
        Ok(self.record(Call::ConfigVars).config_vars.clone())
    }
    async fn set_config_var(&self, key: &str, value: Option<&str>) -> Result<(), PlatformError> {
        let mut state = self.record(Call::SetConfigVar(key.to_string(), value.map(String::from)));
        if state.fail_config_writes {
            return Err(rejected("config write"));
        }
        match value {
            Some(value) => state.config_vars.insert(key.to_string(), value.to_string()),
            None => state.config_vars.remove(key),
        };
        Ok(())
    }
    async fn restart(&self) -> Result<(), PlatformError> {
        match self.record(Call::Restart).fail_restarts {
            true => Err(rejected("restart")),
            false => Ok(()),
        }
    }
    async fn sni_endpoints(&self) -> Result<Vec<SniEndpoint>, PlatformError> {
        Ok(self.record(Call::SniEndpoints).endpoints.clone())
    }
    async fn create_sni_endpoint(&self, certificate_chain: &str, private_key: &str) -> Result<SniEndpoint, PlatformError> {
        let mut state = self.record(Call::CreateSniEndpoint);
        if state.fail_publishing {
            return Err(rejected("create"));
        }
        let endpoint = SniEndpoint {
            id: format!("ep-{}", state.endpoints.len() + 1),
            name: None,
            certificate_chain: certificate_chain.to_string(),
        };
        state.private_keys.insert(endpoint.id.clone(), private_key.to_string());
        state.endpoints.push(endpoint.clone());
        Ok(endpoint)
    }
    async fn update_sni_endpoint(&self, id: &str, certificate_chain: &str, private_key: &str) -> Result<SniEndpoint, PlatformError> {
        let mut state = self.record(Call::UpdateSniEndpoint(id.to_string()));
        if state.fail_publishing {
            return Err(rejected("update"));
        }
        state.private_keys.insert(id.to_string(), private_key.to_string());
        let endpoint = state
            .endpoints
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| rejected("unknown endpoint"))?;
        endpoint.certificate_chain = certificate_chain.to_string();
        Ok(endpoint.clone())
    }
    async fn account(&self) -> Result<PlatformAccount, PlatformError> {
        drop(self.record(Call::Account));
        Ok(PlatformAccount {
            email: "ops@example.com".to_string(),
        })
    }
}

#[derive(Default)]
struct IssuerState {
    registrations: Vec<Registration>,
    challenges_seen: usize,
}

/// Issues self signed certificates after a set/remove round trip through the provider.
/// The challenge is removed whether or not setting it succeeded.
#[derive(Clone, Default)]
pub(crate) struct FakeIssuer {
    issuer: Option<String>,
    fail: bool,
    state: Arc<Mutex<IssuerState>>,
}

impl FakeIssuer {
    pub fn with_issuer(issuer: &str) -> Self {
        FakeIssuer {
            issuer: Some(issuer.to_string()),
            ..Default::default()
        }
    }
    pub fn failing() -> Self {
        FakeIssuer {
            fail: true,
            ..Default::default()
        }
    }
    pub fn registrations(&self) -> Vec<Registration> {
        self.state.lock().unwrap().registrations.clone()
    }
    pub fn challenges_seen(&self) -> usize {
        self.state.lock().unwrap().challenges_seen
    }
}

#[async_trait]
impl CertificateIssuer for FakeIssuer {
    async fn register(&self, provider: &dyn ChallengeProvider, registration: &Registration) -> Result<CertificateBundle, OrderError> {
        self.state.lock().unwrap().registrations.push(registration.clone());
        let domain = &registration.domains[0];
        let set = provider.set(domain, "fake-token", "fake-token.proof").await;
        let seen = match provider.get(domain, "fake-token").await {
            Ok(proof) => proof.as_deref() == Some("fake-token.proof"),
            Err(ChallengeError::NotSupported) => set.is_ok(),
            Err(_) => false,
        };
        if seen {
            self.state.lock().unwrap().challenges_seen += 1;
        }
        provider.remove(domain, "fake-token").await?;
        set?;
        if self.fail {
            return Err(OrderError::TooManyAttemptsAuth(domain.clone()));
        }
        let domains: Vec<&str> = registration.domains.iter().map(String::as_str).collect();
        let issuer = self.issuer.as_deref().unwrap_or("R3");
        let (key, cert) = certificate(issuer, &domains, days_from_now(-1), days_from_now(90));
        Ok(CertificateBundle::from_pem(key, &cert)?)
    }
}
