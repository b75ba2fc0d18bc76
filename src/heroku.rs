use crate::https_helper::{default_client_config, https, HttpsResponse};
use crate::platform::{Domain, Platform, PlatformAccount, PlatformError, SniEndpoint};
use async_trait::async_trait;
use futures_rustls::rustls::ClientConfig;
use http_types::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub const HEROKU_API_URL: &str = "https://api.heroku.com";
const HEROKU_ACCEPT: &str = "application/vnd.heroku+json; version=3";

/// Platform API client bound to one app.
pub struct HerokuApi {
    api_url: String,
    api_key: String,
    app: String,
    client_config: Arc<ClientConfig>,
}

impl fmt::Debug for HerokuApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HerokuApi").field("api_url", &self.api_url).field("app", &self.app).finish_non_exhaustive()
    }
}

impl HerokuApi {
    pub fn new(app: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: HEROKU_API_URL.to_string(),
            api_key: api_key.into(),
            app: app.into(),
            client_config: default_client_config(),
        }
    }
    pub fn api_url(mut self, api_url: impl ToString) -> Self {
        self.api_url = api_url.to_string().trim_end_matches('/').to_string();
        self
    }
    pub fn app(&self) -> &str {
        &self.app
    }
    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<HttpsResponse, PlatformError> {
        let url = format!("{}{}", self.api_url, path);
        log::debug!("{} {}", method, url);
        let headers = [
            ("Accept", HEROKU_ACCEPT.to_string()),
            ("Authorization", format!("Bearer {}", self.api_key)),
        ];
        let body = body.map(|body| (body.to_string(), "application/json"));
        Ok(https(&self.client_config, url, method, &headers, body).await?)
    }
    async fn json<T: DeserializeOwned>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, PlatformError> {
        let response = self.call(method, path, body).await?;
        Ok(serde_json::from_str(&response.body)?)
    }
    fn app_path(&self, rest: &str) -> String {
        format!("/apps/{}{}", self.app, rest)
    }
}

#[async_trait]
impl Platform for HerokuApi {
    async fn domains(&self) -> Result<Vec<Domain>, PlatformError> {
        self.json(Method::Get, &self.app_path("/domains"), None).await
    }
    async fn config_vars(&self) -> Result<HashMap<String, String>, PlatformError> {
        let vars: HashMap<String, Option<String>> = self.json(Method::Get, &self.app_path("/config-vars"), None).await?;
        Ok(vars.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))).collect())
    }
    async fn set_config_var(&self, key: &str, value: Option<&str>) -> Result<(), PlatformError> {
        let mut body = serde_json::Map::new();
        body.insert(key.to_string(), json!(value));
        self.call(Method::Patch, &self.app_path("/config-vars"), Some(Value::Object(body))).await?;
        Ok(())
    }
    async fn restart(&self) -> Result<(), PlatformError> {
        self.call(Method::Delete, &self.app_path("/dynos"), None).await?;
        Ok(())
    }
    async fn sni_endpoints(&self) -> Result<Vec<SniEndpoint>, PlatformError> {
        self.json(Method::Get, &self.app_path("/sni-endpoints"), None).await
    }
    async fn create_sni_endpoint(&self, certificate_chain: &str, private_key: &str) -> Result<SniEndpoint, PlatformError> {
        let body = json!({
            "certificate_chain": certificate_chain,
            "private_key": private_key,
        });
        self.json(Method::Post, &self.app_path("/sni-endpoints"), Some(body)).await
    }
    async fn update_sni_endpoint(&self, id: &str, certificate_chain: &str, private_key: &str) -> Result<SniEndpoint, PlatformError> {
        let body = json!({
            "certificate_chain": certificate_chain,
            "private_key": private_key,
        });
        self.json(Method::Patch, &self.app_path(&format!("/sni-endpoints/{}", id)), Some(body)).await
    }
    async fn account(&self) -> Result<PlatformAccount, PlatformError> {
        self.json(Method::Get, "/account", None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestServer;

    fn api(server: &TestServer) -> HerokuApi {
        HerokuApi::new("myapp", "secret").api_url(server.url(""))
    }

    #[async_std::test]
    async fn lists_domains_with_auth_headers() {
        let server = TestServer::start(404, "").await;
        server.route(
            "/apps/myapp/domains",
            200,
            r#"[{"hostname": "www.example.com", "kind": "custom"}, {"hostname": "myapp.herokuapp.com", "kind": "heroku"}]"#,
        );
        let domains = api(&server).domains().await.unwrap();
        assert_eq!(domains.len(), 2);
        assert!(domains[0].is_custom());

        let requests = server.requests();
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer secret"));
        assert_eq!(requests[0].accept.as_deref(), Some(HEROKU_ACCEPT));
    }

    #[async_std::test]
    async fn config_vars_drop_nulls() {
        let server = TestServer::start(404, "").await;
        server.route("/apps/myapp/config-vars", 200, r#"{"REDIS_URL": "redis://h:1", "EMPTY": null}"#);
        let vars = api(&server).config_vars().await.unwrap();
        assert_eq!(vars.get("REDIS_URL").map(String::as_str), Some("redis://h:1"));
        assert!(!vars.contains_key("EMPTY"));
    }

    #[async_std::test]
    async fn unsetting_a_config_var_sends_null() {
        let server = TestServer::start(404, "").await;
        server.route("/apps/myapp/config-vars", 200, "{}");
        api(&server).set_config_var("LETS_ENCRYPT_CHALLENGE", None).await.unwrap();
        let request = server.requests().pop().unwrap();
        assert_eq!(request.method, "PATCH");
        let body: Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body, json!({ "LETS_ENCRYPT_CHALLENGE": null }));
    }

    #[async_std::test]
    async fn update_patches_endpoint_by_id() {
        let server = TestServer::start(404, "").await;
        server.route(
            "/apps/myapp/sni-endpoints/ep-1",
            200,
            r#"{"id": "ep-1", "name": "tokyo-1", "certificate_chain": "CHAIN"}"#,
        );
        let endpoint = api(&server).update_sni_endpoint("ep-1", "CHAIN", "KEY").await.unwrap();
        assert_eq!(endpoint.id, "ep-1");
        let request = server.requests().pop().unwrap();
        assert_eq!(request.method, "PATCH");
        let body: Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body["private_key"], "KEY");
    }

    #[async_std::test]
    async fn api_errors_surface() {
        let server = TestServer::start(403, r#"{"id": "forbidden"}"#).await;
        assert!(matches!(api(&server).account().await, Err(PlatformError::Http(_))));
    }
}
