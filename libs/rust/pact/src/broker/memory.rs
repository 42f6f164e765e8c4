//! In-process broker used by tests and local runs.

use super::{
    Broker, ConsumerVersionSelector, ContractId, ContractRevision, FetchedContract,
    VerificationLedger, VerificationRecord,
};
use crate::contract::Contract;
use crate::error::{PactError, PactResult};
use crate::gate::MatrixEntry;
use crate::verification::VerificationReport;
use crate::version::{Clock, ParticipantVersion, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct VersionEntry {
    branch: String,
    tags: BTreeSet<String>,
    sequence: u64,
}

#[derive(Debug, Clone)]
struct StoredContract {
    contract: Contract,
    revised_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    next_sequence: u64,
    /// (participant, version) -> version metadata
    versions: BTreeMap<(String, String), VersionEntry>,
    contracts: BTreeMap<ContractId, StoredContract>,
    /// Append-only; the last matching record is the most recent
    verifications: Vec<VerificationRecord>,
    /// (participant, environment) -> deployed version
    deployments: BTreeMap<(String, String), String>,
}

impl State {
    fn register_version(&mut self, version: &ParticipantVersion) {
        let key = (version.name.clone(), version.version.clone());
        if let Some(entry) = self.versions.get_mut(&key) {
            entry.branch.clone_from(&version.branch);
            entry.tags.extend(version.tags.iter().cloned());
            return;
        }
        self.next_sequence += 1;
        self.versions.insert(
            key,
            VersionEntry {
                branch: version.branch.clone(),
                tags: version.tags.clone(),
                sequence: self.next_sequence,
            },
        );
    }

    fn version(&self, participant: &str, version: &str) -> Option<&VersionEntry> {
        self.versions
            .get(&(participant.to_string(), version.to_string()))
    }

    fn deployed(&self, participant: &str, environment: &str) -> Option<&str> {
        self.deployments
            .get(&(participant.to_string(), environment.to_string()))
            .map(String::as_str)
    }

    fn selector_matches(&self, id: &ContractId, selector: &ConsumerVersionSelector) -> bool {
        let Some(entry) = self.version(&id.consumer, &id.consumer_version) else {
            return false;
        };
        selector.branch.as_ref().is_none_or(|b| &entry.branch == b)
            && selector.tag.as_ref().is_none_or(|t| entry.tags.contains(t))
            && selector.environment.as_ref().is_none_or(|env| {
                self.deployed(&id.consumer, env) == Some(id.consumer_version.as_str())
            })
    }

    fn select(&self, provider: &str, selector: &ConsumerVersionSelector) -> Vec<ContractId> {
        let candidates = self
            .contracts
            .keys()
            .filter(|id| id.provider == provider && self.selector_matches(id, selector));

        if !selector.latest {
            return candidates.cloned().collect();
        }

        let mut newest: BTreeMap<&str, (&ContractId, u64)> = BTreeMap::new();
        for id in candidates {
            let sequence = self
                .version(&id.consumer, &id.consumer_version)
                .map_or(0, |entry| entry.sequence);
            let slot = newest.entry(id.consumer.as_str()).or_insert((id, sequence));
            if sequence > slot.1 {
                *slot = (id, sequence);
            }
        }
        newest.into_values().map(|(id, _)| id.clone()).collect()
    }

    fn has_success(&self, id: &ContractId) -> bool {
        self.verifications
            .iter()
            .any(|record| &record.contract == id && record.success)
    }

    fn latest_record(&self, id: &ContractId, provider_version: &str) -> Option<VerificationRecord> {
        self.verifications
            .iter()
            .rev()
            .find(|record| &record.contract == id && record.provider_version == provider_version)
            .cloned()
    }

    fn entry(&self, id: &ContractId, provider_version: &str) -> Option<MatrixEntry> {
        let stored = self.contracts.get(id)?;
        Some(MatrixEntry::new(
            ContractRevision {
                id: id.clone(),
                revised_at: stored.revised_at,
            },
            self.latest_record(id, provider_version),
        ))
    }
}

/// Broker that keeps contracts, versions, deployments and verification
/// records in memory.
///
/// Implements both [`Broker`] and [`VerificationLedger`].
pub struct InMemoryBroker {
    state: RwLock<State>,
    clock: Arc<dyn Clock>,
}

impl InMemoryBroker {
    /// Create an empty broker on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty broker stamping revisions and records with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(State::default()),
            clock,
        }
    }

    /// Record that `participant` at `version` is now deployed to `environment`,
    /// replacing whatever was deployed there before.
    pub async fn record_deployment(&self, participant: &str, version: &str, environment: &str) {
        info!(participant, version, environment, "Recording deployment");
        self.state.write().await.deployments.insert(
            (participant.to_string(), environment.to_string()),
            version.to_string(),
        );
    }

    /// Append a verification record as-is.
    pub async fn record_verification(&self, record: VerificationRecord) {
        self.state.write().await.verifications.push(record);
    }

    /// Stored contract for `id`.
    pub async fn contract(&self, id: &ContractId) -> Option<Contract> {
        self.state
            .read()
            .await
            .contracts
            .get(id)
            .map(|stored| stored.contract.clone())
    }

    /// Latest content revision of `id`.
    pub async fn revision(&self, id: &ContractId) -> Option<ContractRevision> {
        self.state
            .read()
            .await
            .contracts
            .get(id)
            .map(|stored| ContractRevision {
                id: id.clone(),
                revised_at: stored.revised_at,
            })
    }

    /// Number of stored contracts.
    pub async fn contract_count(&self) -> usize {
        self.state.read().await.contracts.len()
    }

    /// All verification records for `id`, oldest first.
    pub async fn verifications(&self, id: &ContractId) -> Vec<VerificationRecord> {
        self.state
            .read()
            .await
            .verifications
            .iter()
            .filter(|record| &record.contract == id)
            .cloned()
            .collect()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBroker").finish_non_exhaustive()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn fetch_contracts(
        &self,
        provider: &str,
        selectors: &[ConsumerVersionSelector],
    ) -> PactResult<Vec<FetchedContract>> {
        let state = self.state.read().await;

        let default_selector = [ConsumerVersionSelector {
            latest: true,
            ..ConsumerVersionSelector::default()
        }];
        let selectors = if selectors.is_empty() {
            &default_selector[..]
        } else {
            selectors
        };

        let ids: BTreeSet<ContractId> = selectors
            .iter()
            .flat_map(|selector| state.select(provider, selector))
            .collect();

        debug!(provider, count = ids.len(), "Selected contracts");

        Ok(ids
            .into_iter()
            .filter_map(|id| {
                let stored = state.contracts.get(&id)?;
                Some(FetchedContract {
                    pending: !state.has_success(&id),
                    contract: stored.contract.clone(),
                    verification_url: None,
                    id,
                })
            })
            .collect())
    }

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

        let id = ContractId::new(
            &contract.consumer.name,
            &contract.provider.name,
            &version.version,
        );
        let now = self.clock.now();

        let mut state = self.state.write().await;
        state.register_version(version);

        let unchanged = state
            .contracts
            .get(&id)
            .is_some_and(|stored| stored.contract == *contract);
        if unchanged {
            debug!(contract = %id, "Contract unchanged, keeping revision");
        } else {
            info!(contract = %id, "Storing contract revision");
            state.contracts.insert(
                id.clone(),
                StoredContract {
                    contract: contract.clone(),
                    revised_at: now,
                },
            );
        }
        Ok(id)
    }

    async fn publish_verification_result(
        &self,
        contract: &FetchedContract,
        report: &VerificationReport,
        provider: &ParticipantVersion,
    ) -> PactResult<()> {
        let verified_at = self.clock.now();
        let mut state = self.state.write().await;
        if !state.contracts.contains_key(&contract.id) {
            return Err(PactError::Broker {
                status: 404,
                body: format!("no contract {}", contract.id),
            });
        }
        state.register_version(provider);
        state.verifications.push(VerificationRecord {
            contract: contract.id.clone(),
            provider_version: provider.version.clone(),
            provider_branch: provider.branch.clone(),
            success: report.passed(),
            verified_at,
        });
        info!(contract = %contract.id, success = report.passed(), "Recorded verification result");
        Ok(())
    }
}

#[async_trait]
impl VerificationLedger for InMemoryBroker {
    async fn matrix(
        &self,
        participant: &str,
        version: &str,
        environment: &str,
    ) -> PactResult<Vec<MatrixEntry>> {
        let state = self.state.read().await;
        let mut entries = Vec::new();

        // As provider: the contracts of consumers deployed to the environment.
        for ((consumer, env), consumer_version) in &state.deployments {
            if env != environment || consumer == participant {
                continue;
            }
            let id = ContractId::new(consumer, participant, consumer_version);
            entries.extend(state.entry(&id, version));
        }

        // As consumer: this version's contracts against deployed providers.
        for id in state.contracts.keys() {
            if id.consumer != participant || id.consumer_version != version {
                continue;
            }
            if let Some(provider_version) = state.deployed(&id.provider, environment) {
                entries.extend(state.entry(id, provider_version));
            }
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{Interaction, Request, Response};
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;
    use uuid::Uuid;

    struct StepClock(Mutex<DateTime<Utc>>);

    impl Clock for StepClock {
        fn now(&self) -> DateTime<Utc> {
            let mut now = self.0.lock().unwrap();
            *now += Duration::seconds(1);
            *now
        }
    }

    fn broker() -> InMemoryBroker {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        InMemoryBroker::with_clock(Arc::new(StepClock(Mutex::new(start))))
    }

    fn contract(status: u16) -> Contract {
        Contract::new("web-app", "user-service").with_interaction(Interaction::new(
            "get user",
            Request::get("/users/1"),
            Response::new(status),
        ))
    }

    fn report(passed: bool) -> VerificationReport {
        let outcome = crate::verification::VerificationOutcome::from_mismatches(
            "get user",
            if passed {
                vec![]
            } else {
                vec![crate::matcher::Mismatch::new(
                    crate::matcher::JsonPath::root().key("status"),
                    crate::matcher::MismatchKind::StatusDiffers,
                    "200",
                    Some(serde_json::json!(500)),
                )]
            },
        );
        VerificationReport {
            run_id: Uuid::new_v4(),
            consumer: "web-app".to_string(),
            provider: "user-service".to_string(),
            outcomes: vec![outcome],
            verified_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_is_idempotent() {
        let broker = broker();
        let version = ParticipantVersion::new("web-app", "abc1234", "main");

        let first = broker.publish_contract(&contract(200), &version).await.unwrap();
        let revision = broker.revision(&first).await.unwrap();
        let second = broker.publish_contract(&contract(200), &version).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(broker.contract_count().await, 1);
        assert_eq!(broker.revision(&second).await.unwrap(), revision);

        broker.publish_contract(&contract(201), &version).await.unwrap();
        assert!(broker.revision(&first).await.unwrap().revised_at > revision.revised_at);
        assert_eq!(broker.contract_count().await, 1);
    }

    #[tokio::test]
    async fn test_publish_rejects_mismatched_participant() {
        let broker = broker();
        let version = ParticipantVersion::new("mobile", "abc1234", "main");
        let err = broker.publish_contract(&contract(200), &version).await.unwrap_err();
        assert!(matches!(err, PactError::InvalidContract(_)));
    }

    #[tokio::test]
    async fn test_branch_selector_picks_latest() {
        let broker = broker();
        broker
            .publish_contract(&contract(200), &ParticipantVersion::new("web-app", "v1", "main"))
            .await
            .unwrap();
        broker
            .publish_contract(&contract(200), &ParticipantVersion::new("web-app", "v2", "main"))
            .await
            .unwrap();
        broker
            .publish_contract(&contract(200), &ParticipantVersion::new("web-app", "v3", "feat"))
            .await
            .unwrap();

        let fetched = broker
            .fetch_contracts("user-service", &[ConsumerVersionSelector::branch("main")])
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id.consumer_version, "v2");
        assert!(fetched[0].pending);

        let all = broker.fetch_contracts("user-service", &[]).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id.consumer_version, "v3");
    }

    #[tokio::test]
    async fn test_environment_selector_uses_deployments() {
        let broker = broker();
        broker
            .publish_contract(&contract(200), &ParticipantVersion::new("web-app", "v1", "main"))
            .await
            .unwrap();
        broker
            .publish_contract(&contract(200), &ParticipantVersion::new("web-app", "v2", "main"))
            .await
            .unwrap();
        broker.record_deployment("web-app", "v1", "production").await;

        let fetched = broker
            .fetch_contracts("user-service", &[ConsumerVersionSelector::environment("production")])
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id.consumer_version, "v1");
    }

    #[tokio::test]
    async fn test_verification_clears_pending_and_feeds_matrix() {
        let broker = broker();
        let consumer = ParticipantVersion::new("web-app", "v1", "main");
        broker.publish_contract(&contract(200), &consumer).await.unwrap();
        broker.record_deployment("web-app", "v1", "test").await;

        let fetched = broker.fetch_contracts("user-service", &[]).await.unwrap();
        let provider = ParticipantVersion::new("user-service", "p1", "main");
        broker
            .publish_verification_result(&fetched[0], &report(true), &provider)
            .await
            .unwrap();

        let fetched = broker.fetch_contracts("user-service", &[]).await.unwrap();
        assert!(!fetched[0].pending);

        let matrix = broker.matrix("user-service", "p1", "test").await.unwrap();
        assert_eq!(matrix.len(), 1);
        assert!(matrix[0].verification.as_ref().unwrap().success);

        let other = broker.matrix("user-service", "p2", "test").await.unwrap();
        assert!(other[0].verification.is_none());
    }

    #[tokio::test]
    async fn test_consumer_side_matrix() {
        let broker = broker();
        let consumer = ParticipantVersion::new("web-app", "v1", "main");
        broker.publish_contract(&contract(200), &consumer).await.unwrap();

        assert!(broker.matrix("web-app", "v1", "test").await.unwrap().is_empty());

        broker.record_deployment("user-service", "p1", "test").await;
        let fetched = broker.fetch_contracts("user-service", &[]).await.unwrap();
        broker
            .publish_verification_result(
                &fetched[0],
                &report(false),
                &ParticipantVersion::new("user-service", "p1", "main"),
            )
            .await
            .unwrap();

        let matrix = broker.matrix("web-app", "v1", "test").await.unwrap();
        assert_eq!(matrix.len(), 1);
        assert!(!matrix[0].verification.as_ref().unwrap().success);
    }
}
