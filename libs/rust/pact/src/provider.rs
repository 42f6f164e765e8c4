//! HTTP implementations of the provider-side collaborators.

use crate::contract::Request;
use crate::error::{PactError, PactResult};
use crate::verification::{ProviderClient, ProviderResponse, StateSetup};
use async_trait::async_trait;
use cdct_common::{HttpConfig, PlatformError, build_http_client};
use reqwest::{Client, Method};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::{debug, instrument};
use url::Url;

/// Replays requests against a running provider.
#[derive(Debug, Clone)]
pub struct HttpProviderClient {
    base_url: String,
    http: Client,
}

impl HttpProviderClient {
    /// Create a client for the provider at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed or the HTTP client cannot be built.
    pub fn new(base_url: &str, http: &HttpConfig) -> PactResult<Self> {
        let parsed = Url::parse(base_url.trim())?;
        let http = build_http_client(http).map_err(PlatformError::from)?;
        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url_for(&self, request: &Request) -> PactResult<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, request.path))?;
        if let Some(query) = &request.query {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    #[instrument(skip_all, fields(method = %request.method, path = %request.path))]
    async fn call(&self, request: &Request) -> PactResult<ProviderResponse> {
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| {
                PactError::invalid_contract(format!("unsupported method '{}'", request.method))
            })?;

        let mut builder = self.http.request(method, self.url_for(request)?);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| PactError::provider_unreachable(e.to_string()))?;

        let status = response.status().as_u16();
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PactError::provider_unreachable(e.to_string()))?;
        let body = if bytes.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            }))
        };

        debug!(status, "Provider responded");
        Ok(ProviderResponse {
            status,
            headers,
            body,
        })
    }
}

/// Establishes provider states by POSTing to a state change endpoint.
///
/// Sends `{"state": <name>, "action": "setup"}`; any 2xx answer counts as done.
#[derive(Debug, Clone)]
pub struct HttpStateSetup {
    url: Url,
    http: Client,
}

impl HttpStateSetup {
    /// Create a state setup posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed or the HTTP client cannot be built.
    pub fn new(url: &str, http: &HttpConfig) -> PactResult<Self> {
        Ok(Self {
            url: Url::parse(url.trim())?,
            http: build_http_client(http).map_err(PlatformError::from)?,
        })
    }
}

#[async_trait]
impl StateSetup for HttpStateSetup {
    #[instrument(skip(self))]
    async fn setup(&self, state: &str) -> PactResult<()> {
        let response = self
            .http
            .post(self.url.clone())
            .json(&json!({"state": state, "action": "setup"}))
            .send()
            .await
            .map_err(|e| PactError::state_setup(state, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PactError::state_setup(state, format!("status {status}: {body}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{Contract, Interaction, Response};
    use crate::matcher::{Matcher, MismatchKind, Template};
    use crate::verification::{Verifier, VerifierConfig};
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpProviderClient {
        let http = HttpConfig::for_provider(Duration::from_secs(5));
        HttpProviderClient::new(&format!("{}/", server.uri()), &http).unwrap()
    }

    #[tokio::test]
    async fn test_call_forwards_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .and(query_param("page", "2"))
            .and(header("accept", "application/json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Request-Id", "r-1")
                    .set_body_json(json!([{"id": 1}])),
            )
            .mount(&server)
            .await;

        let request = Request::get("/users")
            .with_query("page", "2")
            .with_header("Accept", "application/json");
        let response = client(&server).call(&request).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.header("x-request-id"), Some("r-1"));
        assert_eq!(response.body, Some(json!([{"id": 1}])));
    }

    #[tokio::test]
    async fn test_call_text_and_empty_bodies() {
        let server = MockServer::start().await;
        Mock::given(path("/text"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;
        Mock::given(path("/empty"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let text = client(&server).call(&Request::get("/text")).await.unwrap();
        assert_eq!(text.body, Some(json!("hello")));

        let empty = client(&server).call(&Request::get("/empty")).await.unwrap();
        assert_eq!(empty.status, 204);
        assert!(empty.body.is_none());
    }

    #[tokio::test]
    async fn test_call_does_not_follow_redirects() {
        let server = MockServer::start().await;
        Mock::given(path("/old"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/new"))
            .mount(&server)
            .await;

        let response = client(&server).call(&Request::get("/old")).await.unwrap();
        assert_eq!(response.status, 302);
        assert_eq!(response.header("location"), Some("/new"));
    }

    #[tokio::test]
    async fn test_unsupported_method_is_invalid_request() {
        let server = MockServer::start().await;
        let interaction = Interaction::new("odd", Request::new("BR EW", "/x"), Response::new(200));

        let outcome = Verifier::default().verify(&interaction, &client(&server)).await;
        assert!(!outcome.passed);
        assert!(!outcome.is_run_fatal());
        assert_eq!(outcome.mismatches[0].kind, MismatchKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_call_unreachable() {
        let http = HttpConfig::for_provider(Duration::from_secs(1));
        let client = HttpProviderClient::new("http://127.0.0.1:9", &http).unwrap();
        let err = client.call(&Request::get("/users/1")).await.unwrap_err();
        assert!(matches!(err, PactError::ProviderUnreachable(_)));
    }

    #[tokio::test]
    async fn test_verifier_times_out_slow_provider() {
        let server = MockServer::start().await;
        Mock::given(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let verifier =
            Verifier::new(VerifierConfig::default().with_timeout(Duration::from_millis(100)));
        let interaction = Interaction::new("slow", Request::get("/slow"), Response::new(200));
        let outcome = verifier.verify(&interaction, &client(&server)).await;

        assert!(!outcome.passed);
        assert_eq!(outcome.mismatches[0].kind, MismatchKind::ProviderUnreachable);
    }

    #[tokio::test]
    async fn test_state_setup_posts_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_pact/state"))
            .and(body_json(json!({"state": "User with id 123 exists", "action": "setup"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let setup =
            HttpStateSetup::new(&format!("{}/_pact/state", server.uri()), &HttpConfig::default())
                .unwrap();
        setup.setup("User with id 123 exists").await.unwrap();
    }

    #[tokio::test]
    async fn test_state_setup_failure_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let setup =
            HttpStateSetup::new(&format!("{}/_pact/state", server.uri()), &HttpConfig::default())
                .unwrap();
        let err = setup.setup("anything").await.unwrap_err();
        assert!(matches!(err, PactError::StateSetupFailed { ref state, .. } if state == "anything"));
    }

    #[tokio::test]
    async fn test_verify_all_against_live_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_pact/state"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 123, "name": "Ada Lovelace", "active": true
            })))
            .mount(&server)
            .await;

        let contract = Contract::new("web-app", "user-service").with_interaction(
            Interaction::new(
                "get user 123",
                Request::get("/users/123"),
                Response::new(200).with_body(Template::object([
                    ("id", Matcher::integer(123)),
                    ("name", Matcher::like("Jane Doe")),
                ])),
            )
            .given("User with id 123 exists"),
        );

        let setup =
            HttpStateSetup::new(&format!("{}/_pact/state", server.uri()), &HttpConfig::default())
                .unwrap();
        let report = Verifier::default()
            .verify_all(&contract, Arc::new(client(&server)), Arc::new(setup))
            .await;

        assert!(report.passed(), "{}", report.summary());
    }
}
