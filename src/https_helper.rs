use async_std::future::timeout;
use async_std::net::TcpStream;
use futures_rustls::pki_types::{InvalidDnsNameError, ServerName};
use futures_rustls::rustls::{ClientConfig, RootCertStore};
use futures_rustls::TlsConnector;
use http_types::{Method, Request, Response, StatusCode, Url};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub(crate) fn default_client_config() -> Arc<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();
    Arc::new(config)
}

pub(crate) struct HttpsResponse {
    response: Response,
    pub(crate) body: String,
}

impl HttpsResponse {
    pub(crate) fn status(&self) -> StatusCode {
        self.response.status()
    }
    pub(crate) fn header(&self, name: &'static str) -> Option<String> {
        self.response.header(name).map(|values| values.last().to_string())
    }
}

/// Sends `method url` and fails on any non 2xx status.
pub(crate) async fn https(
    client_config: &Arc<ClientConfig>,
    url: impl AsRef<str>,
    method: Method,
    headers: &[(&'static str, String)],
    body: Option<(String, &'static str)>,
) -> Result<HttpsResponse, HttpsRequestError> {
    let mut request = Request::new(method, parse_url(url.as_ref())?);
    for (name, value) in headers {
        request.insert_header(*name, value.as_str());
    }
    if let Some((body, content_type)) = body {
        request.set_body(body);
        request.insert_header("Content-Type", content_type);
    }
    let response = send(client_config, request).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(HttpsRequestError::Non2xxStatus {
            status_code: status.into(),
            body: response.body,
        });
    }
    Ok(response)
}

/// Plain GET returning the status and body whatever the status is.
pub(crate) async fn http_get(
    client_config: &Arc<ClientConfig>,
    url: impl AsRef<str>,
    limit: Duration,
) -> Result<(u16, String), HttpsRequestError> {
    let request = Request::new(Method::Get, parse_url(url.as_ref())?);
    let response = match timeout(limit, send(client_config, request)).await {
        Ok(response) => response?,
        Err(_) => return Err(HttpsRequestError::Timeout(limit)),
    };
    Ok((response.status().into(), response.body))
}

async fn send(client_config: &Arc<ClientConfig>, request: Request) -> Result<HttpsResponse, HttpsRequestError> {
    let url = request.url().clone();
    let host = url.host_str().ok_or(HttpsRequestError::UndefinedHost)?.to_string();
    let port = url.port_or_known_default().ok_or(HttpsRequestError::UndefinedHost)?;
    let tls = match url.scheme() {
        "https" => true,
        "http" => false,
        scheme => return Err(HttpsRequestError::UnsupportedScheme(scheme.to_string())),
    };
    log::trace!("{} {}", request.method(), url);
    let tcp = TcpStream::connect((host.as_str(), port)).await?;
    let mut response = match tls {
        true => {
            let domain = ServerName::try_from(host)?;
            let tls = TlsConnector::from(client_config.clone()).connect(domain, tcp).await?;
            async_h1::connect(tls, request).await?
        }
        false => async_h1::connect(tcp, request).await?,
    };
    let body = response.body_string().await?;
    Ok(HttpsResponse { response, body })
}

fn parse_url(url: &str) -> Result<Url, HttpsRequestError> {
    Url::parse(url).map_err(|err| HttpsRequestError::InvalidUrl(format!("{}: {}", url, err)))
}

#[derive(Error, Debug)]
pub enum HttpsRequestError {
    #[error("io error: {0:?}")]
    Io(#[from] io::Error),
    #[error("invalid dns name: {0:?}")]
    InvalidDnsName(#[from] InvalidDnsNameError),
    #[error("invalid url {0}")]
    InvalidUrl(String),
    #[error("unsupported url scheme {0}")]
    UnsupportedScheme(String),
    #[error("http error: {0}")]
    Http(http_types::Error),
    #[error("non 2xx http status: {status_code} {body:?}")]
    Non2xxStatus { status_code: u16, body: String },
    #[error("could not determine host from url")]
    UndefinedHost,
    #[error("no response within {0:?}")]
    Timeout(Duration),
}

impl From<http_types::Error> for HttpsRequestError {
    fn from(e: http_types::Error) -> Self {
        Self::Http(e)
    }
}
