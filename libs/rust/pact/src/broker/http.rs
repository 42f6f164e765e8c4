//! Client for a Pact-Broker style HTTP API.

use super::{
    Broker, ConsumerVersionSelector, ContractId, ContractRevision, FetchedContract,
    VerificationLedger, VerificationRecord,
};
use crate::contract::Contract;
use crate::error::{PactError, PactResult};
use crate::gate::MatrixEntry;
use crate::verification::VerificationReport;
use crate::version::ParticipantVersion;
use async_trait::async_trait;
use cdct_common::{HttpConfig, PlatformError, build_http_client};
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};
use url::Url;

const MAX_ERROR_BODY: usize = 512;

/// Broker connection settings.
#[derive(Debug)]
pub struct BrokerConfig {
    /// Broker base URL
    pub base_url: Url,
    /// Bearer token
    pub token: SecretString,
    /// HTTP client settings
    pub http: HttpConfig,
    /// Also fetch work-in-progress contracts published on or after this date
    pub include_wip_pacts_since: Option<NaiveDate>,
}

impl BrokerConfig {
    /// Create a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PactError::Configuration`] if the URL is not an absolute
    /// `http`/`https` URL or the token is empty.
    pub fn new(base_url: &str, token: SecretString) -> PactResult<Self> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|e| PactError::configuration(format!("invalid broker URL: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(PactError::configuration(format!(
                "broker URL must be http or https: {base_url}"
            )));
        }
        if token.expose_secret().trim().is_empty() {
            return Err(PactError::configuration("broker token is empty"));
        }
        Ok(Self {
            base_url,
            token,
            http: HttpConfig::default(),
            include_wip_pacts_since: None,
        })
    }

    /// Set HTTP client settings.
    #[must_use]
    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Ask for work-in-progress contracts published since `since`. They are
    /// always returned as pending.
    #[must_use]
    pub const fn with_wip_pacts_since(mut self, since: Option<NaiveDate>) -> Self {
        self.include_wip_pacts_since = since;
        self
    }
}

/// Broker reached over HTTP with bearer authentication.
pub struct HttpBroker {
    config: BrokerConfig,
    http: Client,
}

impl HttpBroker {
    /// Create a broker client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: BrokerConfig) -> PactResult<Self> {
        let http = build_http_client(&config.http).map_err(PlatformError::from)?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, segments: &[&str]) -> PactResult<Url> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| PactError::configuration("broker URL cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> PactResult<reqwest::Response> {
        let response = request
            .bearer_auth(self.config.token.expose_secret())
            .send()
            .await
            .map_err(|e| PactError::BrokerUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|&i| body.is_char_boundary(i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(PactError::Broker {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> PactResult<T> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PactError::BrokerUnavailable(e.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn fetch_document(&self, href: &str, pending: bool) -> PactResult<FetchedContract> {
        let response = self.send(self.http.get(href)).await?;
        let document: serde_json::Value = Self::read_json(response).await?;
        let links: PactLinks = document
            .get("_links")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        let contract: Contract = serde_json::from_value(document)?;

        let consumer_version = links
            .consumer_version
            .map(|link| link.name)
            .or_else(|| consumer_version_from_href(href))
            .ok_or_else(|| {
                PactError::invalid_contract(format!("cannot determine consumer version of {href}"))
            })?;
        let verification_url = links
            .publish_verification_results
            .map_or_else(|| format!("{href}/verification-results"), |link| link.href);

        Ok(FetchedContract {
            id: ContractId::new(
                &contract.consumer.name,
                &contract.provider.name,
                consumer_version,
            ),
            contract,
            pending,
            verification_url: Some(verification_url),
        })
    }
}

impl std::fmt::Debug for HttpBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBroker")
            .field("base_url", &self.config.base_url.as_str())
            .finish_non_exhaustive()
    }
}

fn consumer_version_from_href(href: &str) -> Option<String> {
    let url = Url::parse(href).ok()?;
    let segments: Vec<&str> = url.path_segments()?.collect();
    segments
        .windows(2)
        .rev()
        .find(|pair| pair[0] == "version")
        .map(|pair| pair[1].to_string())
}

#[derive(Debug, Deserialize)]
struct ForVerificationResponse {
    #[serde(rename = "_embedded")]
    embedded: Embedded,
}

#[derive(Debug, Deserialize)]
struct Embedded {
    #[serde(default)]
    pacts: Vec<PactForVerification>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PactForVerification {
    #[serde(rename = "_links")]
    links: SelfLinks,
    #[serde(default)]
    verification_properties: VerificationProperties,
}

#[derive(Debug, Deserialize)]
struct SelfLinks {
    #[serde(rename = "self")]
    this: Link,
}

#[derive(Debug, Default, Deserialize)]
struct VerificationProperties {
    #[serde(default)]
    pending: bool,
    #[serde(default)]
    wip: bool,
}

#[derive(Debug, Default, Deserialize)]
struct PactLinks {
    #[serde(rename = "pb:consumer-version")]
    consumer_version: Option<NamedLink>,
    #[serde(rename = "pb:publish-verification-results")]
    publish_verification_results: Option<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
}

#[derive(Debug, Deserialize)]
struct NamedLink {
    name: String,
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    #[serde(default)]
    matrix: Vec<MatrixRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatrixRow {
    consumer: MatrixParticipant,
    provider: MatrixParticipant,
    pact: MatrixPact,
    verification_result: Option<MatrixVerification>,
}

#[derive(Debug, Deserialize)]
struct MatrixParticipant {
    name: String,
    version: Option<MatrixVersion>,
}

#[derive(Debug, Deserialize)]
struct MatrixVersion {
    number: String,
    #[serde(default)]
    branch: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatrixPact {
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatrixVerification {
    success: bool,
    verified_at: DateTime<Utc>,
}

impl MatrixRow {
    fn into_entry(self) -> PactResult<MatrixEntry> {
        let consumer_version = self.consumer.version.ok_or_else(|| {
            PactError::invalid_contract(format!(
                "matrix row for {} has no consumer version",
                self.consumer.name
            ))
        })?;
        let id = ContractId::new(self.consumer.name, self.provider.name, consumer_version.number);
        let provider_version = self.provider.version;
        let verification = self.verification_result.map(|result| VerificationRecord {
            contract: id.clone(),
            provider_version: provider_version
                .as_ref()
                .map(|v| v.number.clone())
                .unwrap_or_default(),
            provider_branch: provider_version
                .as_ref()
                .and_then(|v| v.branch.clone())
                .unwrap_or_default(),
            success: result.success,
            verified_at: result.verified_at,
        });
        Ok(MatrixEntry::new(
            ContractRevision {
                id,
                revised_at: self.pact.created_at,
            },
            verification,
        ))
    }
}

#[async_trait]
impl Broker for HttpBroker {
    #[instrument(skip(self, selectors), fields(selectors = selectors.len()))]
    async fn fetch_contracts(
        &self,
        provider: &str,
        selectors: &[ConsumerVersionSelector],
    ) -> PactResult<Vec<FetchedContract>> {
        let url = self.endpoint(&["pacts", "provider", provider, "for-verification"])?;
        let mut body = json!({
            "consumerVersionSelectors": selectors,
            "includePendingStatus": true,
        });
        if let Some(since) = self.config.include_wip_pacts_since {
            body["includeWipPactsSince"] = Value::String(since.to_string());
        }
        let response = self.send(self.http.post(url).json(&body)).await?;
        let listing: ForVerificationResponse = Self::read_json(response).await?;
        debug!(count = listing.embedded.pacts.len(), "Broker returned contracts");

        let mut fetched = Vec::with_capacity(listing.embedded.pacts.len());
        for pact in listing.embedded.pacts {
            let properties = &pact.verification_properties;
            let pending = properties.pending || properties.wip;
            fetched.push(self.fetch_document(&pact.links.this.href, pending).await?);
        }
        Ok(fetched)
    }

    #[instrument(skip(self, contract, version), fields(contract = %contract.pair(), version = %version.version))]
    async fn publish_contract(
        &self,
        contract: &Contract,
        version: &ParticipantVersion,
    ) -> PactResult<ContractId> {
        if contract.consumer.name != version.name {
            return Err(PactError::invalid_contract(format!(
                "contract consumer '{}' does not match version participant '{}'",
                contract.consumer.name, version.name
            )));
        }
        contract.validate()?;

        let consumer = contract.consumer.name.as_str();
        let provider = contract.provider.name.as_str();
        let number = version.version.as_str();

        let url = self.endpoint(&[
            "pacts", "provider", provider, "consumer", consumer, "version", number,
        ])?;
        self.send(self.http.put(url).json(contract)).await?;

        let url = self.endpoint(&[
            "pacticipants",
            consumer,
            "branches",
            version.branch.as_str(),
            "versions",
            number,
        ])?;
        self.send(self.http.put(url).json(&json!({}))).await?;

        for tag in &version.tags {
            let url = self.endpoint(&[
                "pacticipants",
                consumer,
                "versions",
                number,
                "tags",
                tag.as_str(),
            ])?;
            self.send(self.http.put(url).json(&json!({}))).await?;
        }

        let id = ContractId::new(consumer, provider, number);
        info!(contract = %id, tags = version.tags.len(), "Published contract");
        Ok(id)
    }

    #[instrument(skip_all, fields(contract = %contract.id, provider_version = %provider.version))]
    async fn publish_verification_result(
        &self,
        contract: &FetchedContract,
        report: &VerificationReport,
        provider: &ParticipantVersion,
    ) -> PactResult<()> {
        let url = match &contract.verification_url {
            Some(href) => Url::parse(href)?,
            None => self.endpoint(&[
                "pacts",
                "provider",
                contract.id.provider.as_str(),
                "consumer",
                contract.id.consumer.as_str(),
                "version",
                contract.id.consumer_version.as_str(),
                "verification-results",
            ])?,
        };
        let body = json!({
            "success": report.passed(),
            "providerApplicationVersion": provider.version,
            "providerVersionBranch": provider.branch,
            "providerVersionTags": provider.tags,
            "testResults": report.outcomes,
            "verifiedBy": {
                "implementation": "cdct",
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        self.send(self.http.post(url).json(&body)).await?;
        info!(success = report.passed(), "Published verification result");
        Ok(())
    }
}

#[async_trait]
impl VerificationLedger for HttpBroker {
    #[instrument(skip(self))]
    async fn matrix(
        &self,
        participant: &str,
        version: &str,
        environment: &str,
    ) -> PactResult<Vec<MatrixEntry>> {
        let mut url = self.endpoint(&["matrix"])?;
        url.query_pairs_mut()
            .append_pair("q[][pacticipant]", participant)
            .append_pair("q[][version]", version)
            .append_pair("latestby", "cvp")
            .append_pair("environment", environment);

        let response = self.send(self.http.get(url)).await?;
        let matrix: MatrixResponse = Self::read_json(response).await?;
        matrix.matrix.into_iter().map(MatrixRow::into_entry).collect()
    }
}
