//! Contract documents on disk and through a broker.

use crate::broker::{Broker, ConsumerVersionSelector, ContractId, FetchedContract};
use crate::contract::Contract;
use crate::error::{PactError, PactResult};
use crate::verification::VerificationReport;
use crate::version::ParticipantVersion;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const DOCUMENT_EXTENSION: &str = "json";

/// Serializes contracts and moves them between files and a broker.
#[derive(Clone)]
pub struct ContractStore {
    broker: Arc<dyn Broker>,
}

impl ContractStore {
    /// Create a store backed by `broker`.
    #[must_use]
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    /// Render a contract as a pretty-printed JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the contract is invalid.
    pub fn to_document(contract: &Contract) -> PactResult<String> {
        contract.validate()?;
        Ok(serde_json::to_string_pretty(contract)?)
    }

    /// Parse and validate a contract document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a valid contract.
    pub fn from_document(document: &str) -> PactResult<Contract> {
        let contract: Contract = serde_json::from_str(document)?;
        contract.validate()?;
        Ok(contract)
    }

    /// `<consumer>-<provider>.json`
    #[must_use]
    pub fn file_name(contract: &Contract) -> String {
        format!(
            "{}-{}.{DOCUMENT_EXTENSION}",
            contract.consumer.name, contract.provider.name
        )
    }

    /// Write `contract` into `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the contract is invalid or the file cannot be written.
    pub async fn write_file(dir: &Path, contract: &Contract) -> PactResult<PathBuf> {
        let document = Self::to_document(contract)?;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| PactError::io(dir, e))?;

        let path = dir.join(Self::file_name(contract));
        tokio::fs::write(&path, document)
            .await
            .map_err(|e| PactError::io(&path, e))?;
        debug!(path = %path.display(), "Wrote contract document");
        Ok(path)
    }

    /// Read every `*.json` document in `dir`, in file name order.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or any document is invalid.
    pub async fn load_dir(dir: &Path) -> PactResult<Vec<Contract>> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| PactError::io(dir, e))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PactError::io(dir, e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == DOCUMENT_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut contracts = Vec::with_capacity(paths.len());
        for path in paths {
            let document = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| PactError::io(&path, e))?;
            let contract = Self::from_document(&document).map_err(|e| {
                PactError::invalid_contract(format!("{}: {e}", path.display()))
            })?;
            contracts.push(contract);
        }
        Ok(contracts)
    }

    /// Publish one contract under the consumer identity `version`.
    ///
    /// # Errors
    ///
    /// Returns an error if the contract is invalid or the broker rejects it.
    #[instrument(skip_all, fields(contract = %contract.pair(), version = %version.version))]
    pub async fn publish(
        &self,
        contract: &Contract,
        version: &ParticipantVersion,
    ) -> PactResult<ContractId> {
        contract.validate()?;
        self.broker.publish_contract(contract, version).await
    }

    /// Publish every document in `dir`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `dir` holds no documents, otherwise
    /// the first load or publication failure.
    #[instrument(skip(self, version), fields(dir = %dir.display(), version = %version.version))]
    pub async fn publish_dir(
        &self,
        dir: &Path,
        version: &ParticipantVersion,
    ) -> PactResult<Vec<ContractId>> {
        let contracts = Self::load_dir(dir).await?;
        if contracts.is_empty() {
            return Err(PactError::configuration(format!(
                "no contract documents found in {}",
                dir.display()
            )));
        }

        let mut published = Vec::with_capacity(contracts.len());
        for contract in &contracts {
            published.push(self.publish(contract, version).await?);
        }
        info!(count = published.len(), "Published contracts");
        Ok(published)
    }

    /// Contracts a provider should verify.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker query fails.
    #[instrument(skip(self, selectors))]
    pub async fn resolve(
        &self,
        provider: &str,
        selectors: &[ConsumerVersionSelector],
    ) -> PactResult<Vec<FetchedContract>> {
        let fetched = self.broker.fetch_contracts(provider, selectors).await?;
        if fetched.is_empty() {
            warn!("No contracts matched the selectors");
        }
        Ok(fetched)
    }

    /// Report a verification result back to the broker.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker rejects the result.
    pub async fn report(
        &self,
        contract: &FetchedContract,
        report: &VerificationReport,
        provider: &ParticipantVersion,
    ) -> PactResult<()> {
        self.broker
            .publish_verification_result(contract, report, provider)
            .await
    }
}

impl std::fmt::Debug for ContractStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractStore").finish_non_exhaustive()
    }
}
