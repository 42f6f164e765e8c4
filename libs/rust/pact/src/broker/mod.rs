//! Broker collaborators: where contracts and verification results live.
//!
//! [`Broker`] covers publication and retrieval, [`VerificationLedger`] the
//! read-only queries the compatibility gate needs. [`InMemoryBroker`]
//! implements both locally; [`HttpBroker`] talks to a remote broker.

mod http;
mod memory;

pub use http::{BrokerConfig, HttpBroker};
pub use memory::InMemoryBroker;

use crate::contract::Contract;
use crate::error::PactResult;
use crate::gate::MatrixEntry;
use crate::verification::VerificationReport;
use crate::version::ParticipantVersion;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Selects which consumer versions' contracts a provider should verify.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerVersionSelector {
    /// Consumer versions built from this branch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Consumer versions currently deployed to this environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Consumer versions carrying this tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Keep only the newest matching version per consumer
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub latest: bool,
}

impl ConsumerVersionSelector {
    /// Latest version on `branch`.
    #[must_use]
    pub fn branch(branch: impl Into<String>) -> Self {
        Self {
            branch: Some(branch.into()),
            latest: true,
            ..Self::default()
        }
    }

    /// Versions deployed to `environment`.
    #[must_use]
    pub fn environment(environment: impl Into<String>) -> Self {
        Self {
            environment: Some(environment.into()),
            ..Self::default()
        }
    }

    /// Latest version tagged `tag`.
    #[must_use]
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            latest: true,
            ..Self::default()
        }
    }
}

/// Identity of a published contract.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractId {
    /// Consumer name
    pub consumer: String,
    /// Provider name
    pub provider: String,
    /// Consumer version the contract was published with
    pub consumer_version: String,
}

impl ContractId {
    /// Create a contract identity.
    #[must_use]
    pub fn new(
        consumer: impl Into<String>,
        provider: impl Into<String>,
        consumer_version: impl Into<String>,
    ) -> Self {
        Self {
            consumer: consumer.into(),
            provider: provider.into(),
            consumer_version: consumer_version.into(),
        }
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) -> {}",
            self.consumer, self.consumer_version, self.provider
        )
    }
}

/// A contract retrieved for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContract {
    /// Contract identity
    pub id: ContractId,
    /// The contract itself
    pub contract: Contract,
    /// Pending contracts are verified but their failure does not block
    pub pending: bool,
    /// Where to publish verification results, for remote brokers
    pub verification_url: Option<String>,
}

/// The latest content revision of a published contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRevision {
    /// Contract identity
    pub id: ContractId,
    /// When the content last changed
    pub revised_at: DateTime<Utc>,
}

/// A recorded verification result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    /// Verified contract
    pub contract: ContractId,
    /// Provider version that was verified
    pub provider_version: String,
    /// Provider branch that was verified
    #[serde(default)]
    pub provider_branch: String,
    /// Aggregate result
    pub success: bool,
    /// When the result was produced
    pub verified_at: DateTime<Utc>,
}

/// Publication and retrieval of contracts and verification results.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Contracts for `provider` whose consumer versions match any selector.
    /// An empty selector list means the latest version of every consumer.
    async fn fetch_contracts(
        &self,
        provider: &str,
        selectors: &[ConsumerVersionSelector],
    ) -> PactResult<Vec<FetchedContract>>;

    /// Publish `contract` for the consumer identity `version`.
    ///
    /// Publishing the same (participant, version, branch) again overwrites.
    async fn publish_contract(
        &self,
        contract: &Contract,
        version: &ParticipantVersion,
    ) -> PactResult<ContractId>;

    /// Record the outcome of verifying `contract` with provider `provider`.
    async fn publish_verification_result(
        &self,
        contract: &FetchedContract,
        report: &VerificationReport,
        provider: &ParticipantVersion,
    ) -> PactResult<()>;
}

/// Read-only view of recorded verification results.
#[async_trait]
pub trait VerificationLedger: Send + Sync {
    /// Contracts relevant to deploying `participant` at `version` into
    /// `environment`, each with its most recent verification record.
    async fn matrix(
        &self,
        participant: &str,
        version: &str,
        environment: &str,
    ) -> PactResult<Vec<MatrixEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_serialization() {
        let selector = ConsumerVersionSelector::branch("main");
        assert_eq!(
            serde_json::to_value(&selector).unwrap(),
            serde_json::json!({"branch": "main", "latest": true})
        );

        let selector = ConsumerVersionSelector::environment("test");
        assert_eq!(
            serde_json::to_value(&selector).unwrap(),
            serde_json::json!({"environment": "test"})
        );
    }

    #[test]
    fn test_contract_id_display() {
        let id = ContractId::new("web-app", "user-service", "abc1234");
        assert_eq!(id.to_string(), "web-app (abc1234) -> user-service");
    }
}
