//! Deploy compatibility decisions ("can I deploy?").

use crate::broker::{ContractRevision, VerificationLedger, VerificationRecord};
use crate::error::PactResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// One relevant contract and its most recent verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixEntry {
    /// The contract and its latest content revision
    pub revision: ContractRevision,
    /// Most recent verification, if any
    pub verification: Option<VerificationRecord>,
}

impl MatrixEntry {
    /// Create a matrix entry.
    #[must_use]
    pub const fn new(revision: ContractRevision, verification: Option<VerificationRecord>) -> Self {
        Self {
            revision,
            verification,
        }
    }

    /// Classify the entry.
    ///
    /// A record produced before the contract's latest revision is stale and
    /// counts as no record at all.
    #[must_use]
    pub fn status(&self) -> EntryStatus {
        match &self.verification {
            None => EntryStatus::Pending,
            Some(record) if record.verified_at < self.revision.revised_at => EntryStatus::Stale,
            Some(record) if record.success => EntryStatus::Verified,
            Some(_) => EntryStatus::Failed,
        }
    }
}

/// Verification status of a matrix entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Current passing verification
    Verified,
    /// Current failing verification
    Failed,
    /// No verification recorded
    Pending,
    /// Verification predates the latest contract revision
    Stale,
}

/// Deployability decision. Computed on demand, never persisted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityRecord {
    /// Participant being deployed
    pub participant_name: String,
    /// Version being deployed
    pub version: String,
    /// Target environment
    pub environment: String,
    /// Whether deployment is allowed
    pub deployable: bool,
    /// One reason per blocking contract; empty when deployable
    pub reasons: Vec<String>,
    /// Entries the decision was based on
    pub matrix: Vec<MatrixEntry>,
}

impl CompatibilityRecord {
    /// Decide from matrix entries. No entries means nothing blocks deployment.
    #[must_use]
    pub fn from_matrix(
        participant_name: impl Into<String>,
        version: impl Into<String>,
        environment: impl Into<String>,
        matrix: Vec<MatrixEntry>,
    ) -> Self {
        let reasons: Vec<String> = matrix
            .iter()
            .filter_map(|entry| match entry.status() {
                EntryStatus::Verified => None,
                EntryStatus::Failed => {
                    Some(format!("verification failed for {}", entry.revision.id))
                }
                EntryStatus::Pending | EntryStatus::Stale => {
                    Some(format!("pending verification for {}", entry.revision.id))
                }
            })
            .collect();

        Self {
            participant_name: participant_name.into(),
            version: version.into(),
            environment: environment.into(),
            deployable: reasons.is_empty(),
            reasons,
            matrix,
        }
    }

    /// Check if deployment is allowed.
    #[must_use]
    pub const fn can_deploy(&self) -> bool {
        self.deployable
    }

    /// One-line summary for logs.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.deployable {
            format!(
                "{} {} can be deployed to {} ({} contracts verified)",
                self.participant_name,
                self.version,
                self.environment,
                self.matrix.len()
            )
        } else {
            format!(
                "{} {} cannot be deployed to {}: {}",
                self.participant_name,
                self.version,
                self.environment,
                self.reasons.join("; ")
            )
        }
    }
}

/// Answers whether a participant version may be deployed to an environment.
#[derive(Clone)]
pub struct CompatibilityGate {
    ledger: Arc<dyn VerificationLedger>,
}

impl CompatibilityGate {
    /// Create a gate reading from `ledger`.
    #[must_use]
    pub fn new(ledger: Arc<dyn VerificationLedger>) -> Self {
        Self { ledger }
    }

    /// Decide whether `participant` at `version` may go to `environment`.
    ///
    /// # Errors
    ///
    /// Returns an error only when the ledger cannot be queried; missing or
    /// stale records produce a non-deployable record instead.
    #[instrument(skip(self))]
    pub async fn can_deploy(
        &self,
        participant: &str,
        version: &str,
        environment: &str,
    ) -> PactResult<CompatibilityRecord> {
        let matrix = self.ledger.matrix(participant, version, environment).await?;
        let record = CompatibilityRecord::from_matrix(participant, version, environment, matrix);
        info!(
            deployable = record.deployable,
            contracts = record.matrix.len(),
            "Compatibility decided"
        );
        Ok(record)
    }
}

impl std::fmt::Debug for CompatibilityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompatibilityGate").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::ContractId;
    use chrono::{Duration, TimeZone, Utc};

    fn entry(consumer: &str, verification: Option<(bool, i64)>) -> MatrixEntry {
        let revised_at = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let id = ContractId::new(consumer, "user-service", "1.0.0");
        let verification = verification.map(|(success, offset_minutes)| VerificationRecord {
            contract: id.clone(),
            provider_version: "v1".to_string(),
            provider_branch: "main".to_string(),
            success,
            verified_at: revised_at + Duration::minutes(offset_minutes),
        });
        MatrixEntry::new(ContractRevision { id, revised_at }, verification)
    }

    #[test]
    fn test_can_deploy_all_success() {
        let record = CompatibilityRecord::from_matrix(
            "user-service",
            "v1",
            "test",
            vec![entry("web-app", Some((true, 5))), entry("mobile", Some((true, 0)))],
        );
        assert!(record.can_deploy());
        assert!(record.reasons.is_empty());
    }

    #[test]
    fn test_can_deploy_with_failure() {
        let record = CompatibilityRecord::from_matrix(
            "user-service",
            "v1",
            "test",
            vec![entry("web-app", Some((true, 5))), entry("mobile", Some((false, 5)))],
        );
        assert!(!record.can_deploy());
        assert_eq!(
            record.reasons,
            vec!["verification failed for mobile (1.0.0) -> user-service"]
        );
    }

    #[test]
    fn test_missing_and_stale_are_pending() {
        let record = CompatibilityRecord::from_matrix(
            "user-service",
            "v1",
            "test",
            vec![entry("web-app", None), entry("mobile", Some((true, -1)))],
        );
        assert!(!record.can_deploy());
        assert_eq!(record.matrix[1].status(), EntryStatus::Stale);
        assert!(record.reasons.iter().all(|r| r.starts_with("pending verification for")));
        assert_eq!(record.reasons.len(), 2);
    }

    #[test]
    fn test_empty_matrix() {
        let record = CompatibilityRecord::from_matrix("user-service", "v1", "test", vec![]);
        assert!(record.can_deploy());
        assert!(record.summary().contains("can be deployed to test"));
    }
}
