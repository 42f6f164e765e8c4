//! Contract model: participants, interactions, requests and expected responses.

use crate::error::{PactError, PactResult};
use crate::matcher::Template;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Specification version written into new documents.
pub const SPEC_VERSION: &str = "4.0";

/// A contract between one consumer and one provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contract {
    /// Consumer participant
    pub consumer: Participant,
    /// Provider participant
    pub provider: Participant,
    /// Contract interactions, in declaration order
    #[serde(default)]
    pub interactions: Vec<Interaction>,
    /// Contract metadata
    #[serde(default)]
    pub metadata: ContractMetadata,
}

impl Contract {
    /// Create an empty contract between `consumer` and `provider`.
    #[must_use]
    pub fn new(consumer: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            consumer: Participant::new(consumer),
            provider: Participant::new(provider),
            interactions: Vec::new(),
            metadata: ContractMetadata::default(),
        }
    }

    /// Append an interaction.
    #[must_use]
    pub fn with_interaction(mut self, interaction: Interaction) -> Self {
        self.interactions.push(interaction);
        self
    }

    /// Find an interaction by its description.
    #[must_use]
    pub fn interaction(&self, description: &str) -> Option<&Interaction> {
        self.interactions
            .iter()
            .find(|interaction| interaction.description == description)
    }

    /// `consumer -> provider` label used in logs and reports.
    #[must_use]
    pub fn pair(&self) -> String {
        format!("{} -> {}", self.consumer.name, self.provider.name)
    }

    /// Check the model invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PactError::InvalidContract`] when a participant name is
    /// empty, two interactions share a description, a request method or path
    /// is empty, or a matcher is unusable.
    pub fn validate(&self) -> PactResult<()> {
        if self.consumer.name.trim().is_empty() {
            return Err(PactError::invalid_contract("consumer name is empty"));
        }
        if self.provider.name.trim().is_empty() {
            return Err(PactError::invalid_contract("provider name is empty"));
        }

        let mut seen = HashSet::new();
        for interaction in &self.interactions {
            if !seen.insert(interaction.description.as_str()) {
                return Err(PactError::invalid_contract(format!(
                    "duplicate interaction description '{}'",
                    interaction.description
                )));
            }
            interaction.validate()?;
        }
        Ok(())
    }
}

/// A participant in a contract (consumer or provider).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    /// Participant name
    pub name: String,
}

impl Participant {
    /// Create a new participant.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// An interaction in a contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    /// Interaction description, unique within its contract
    pub description: String,
    /// Provider state (precondition)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_state: Option<String>,
    /// Request the consumer sends
    pub request: Request,
    /// Response the consumer expects
    pub response: Response,
}

impl Interaction {
    /// Create an interaction without a provider state.
    #[must_use]
    pub fn new(description: impl Into<String>, request: Request, response: Response) -> Self {
        Self {
            description: description.into(),
            provider_state: None,
            request,
            response,
        }
    }

    /// Require a provider state before the request is replayed.
    #[must_use]
    pub fn given(mut self, state: impl Into<String>) -> Self {
        self.provider_state = Some(state.into());
        self
    }

    fn validate(&self) -> PactResult<()> {
        if self.description.trim().is_empty() {
            return Err(PactError::invalid_contract("interaction description is empty"));
        }
        if self.request.method.trim().is_empty() {
            return Err(PactError::invalid_contract(format!(
                "interaction '{}' has no request method",
                self.description
            )));
        }
        if !self.request.path.starts_with('/') {
            return Err(PactError::invalid_contract(format!(
                "interaction '{}' has a request path that does not start with '/'",
                self.description
            )));
        }
        self.response
            .headers
            .values()
            .try_for_each(Template::validate)?;
        self.response.body.as_ref().map_or(Ok(()), Template::validate)
    }
}

/// HTTP request in an interaction. Always literal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Request {
    /// HTTP method
    pub method: String,
    /// Request path
    pub path: String,
    /// Request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Query parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<BTreeMap<String, String>>,
    /// Request body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Request {
    /// Create a request with the given method and path.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: BTreeMap::new(),
            query: None,
            body: None,
        }
    }

    /// Create a `GET` request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add a query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Expected HTTP response in an interaction. Headers and body may carry matchers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response headers that must be present; others are ignored
    #[serde(default)]
    pub headers: BTreeMap<String, Template>,
    /// Response body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Template>,
}

impl Response {
    /// Expect `status` with no headers and no body.
    #[must_use]
    pub const fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Require a header, either literal or matched.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Template>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the expected body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Template>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Example body a consumer would receive from a mock of this response.
    #[must_use]
    pub fn example_body(&self) -> Option<Value> {
        self.body.as_ref().map(Template::example)
    }
}

/// Contract metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractMetadata {
    /// Pact specification version
    #[serde(rename = "pactSpecification")]
    pub pact_specification: PactSpecification,
}

/// Pact specification version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PactSpecification {
    /// Version string
    pub version: String,
}

impl Default for ContractMetadata {
    fn default() -> Self {
        Self {
            pact_specification: PactSpecification {
                version: SPEC_VERSION.to_string(),
            },
        }
    }
}
