//! The three operations behind the subcommands.
//!
//! Each returns an [`Outcome`] for results the operator acts on and an error
//! for everything that stopped the run; only `main` turns them into exit codes.

use crate::config::{CanIDeployConfig, PublishConfig, VerifyConfig};
use cdct_pact::{
    Broker, CompatibilityGate, ContractStore, ErrorCategory, PactError, PactResult,
    ProviderClient, StateSetup, VerificationLedger, VerificationReport, Verifier,
    VersionResolver,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Exit status for configuration errors.
pub const EXIT_CONFIGURATION: u8 = 2;

/// Exit status for broker, provider and local I/O failures.
pub const EXIT_TRANSPORT: u8 = 3;

/// Result of a run that completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Published, verified, or deployable
    Success,
    /// Verification failed or deployment denied
    Rejected,
}

impl Outcome {
    /// Process exit status.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Rejected => 1,
        }
    }
}

/// Process exit status for a run that stopped with `err`.
#[must_use]
pub const fn error_exit_code(err: &PactError) -> u8 {
    match err.category() {
        ErrorCategory::Configuration | ErrorCategory::Contract => EXIT_CONFIGURATION,
        ErrorCategory::Transport | ErrorCategory::Internal => EXIT_TRANSPORT,
    }
}

/// Publish every document in the configured directory under one resolved
/// consumer identity.
///
/// # Errors
///
/// Returns a configuration error if the directory is empty or mixes
/// consumers, otherwise the first load or broker failure.
pub async fn publish(
    config: &PublishConfig,
    broker: Arc<dyn Broker>,
    resolver: &VersionResolver,
) -> PactResult<Outcome> {
    let contracts = ContractStore::load_dir(&config.pact_dir).await?;
    let Some(first) = contracts.first() else {
        return Err(PactError::configuration(format!(
            "no contract documents found in {}",
            config.pact_dir.display()
        )));
    };
    let consumer = first.consumer.name.clone();
    if let Some(other) = contracts.iter().find(|c| c.consumer.name != consumer) {
        return Err(PactError::configuration(format!(
            "{} holds contracts for more than one consumer ({consumer}, {})",
            config.pact_dir.display(),
            other.consumer.name
        )));
    }

    let version = resolver.resolve(&consumer, &config.overrides, &config.ci);
    info!(
        consumer = %consumer,
        version = %version.version,
        branch = %version.branch,
        tags = ?version.tags,
        contracts = contracts.len(),
        "Publishing contracts"
    );

    let store = ContractStore::new(broker);
    for contract in &contracts {
        let id = store.publish(contract, &version).await?;
        println!("Published {id}");
    }
    Ok(Outcome::Success)
}

/// Verify the provider against every selected contract and report results.
///
/// Failures of pending contracts are reported but do not reject the run.
///
/// # Errors
///
/// Returns a provider error if a non-pending contract could not be verified
/// because the provider or its state setup was unreachable, and a broker
/// error if contracts cannot be fetched or any result could not be published.
/// Every fetched contract is verified and reported before either is returned.
pub async fn verify(
    config: &VerifyConfig,
    broker: Arc<dyn Broker>,
    client: Arc<dyn ProviderClient>,
    state: Arc<dyn StateSetup>,
    resolver: &VersionResolver,
) -> PactResult<Outcome> {
    let provider = resolver.resolve(&config.provider_name, &config.overrides, &config.ci);
    info!(
        provider = %provider.name,
        provider_version = %provider.version,
        provider_branch = %provider.branch,
        provider_base_url = %config.provider_base_url,
        selectors = ?config.selectors,
        wip_since = ?config.include_wip_pacts_since,
        publish_results = config.publish_results,
        "Starting provider verification"
    );

    let store = ContractStore::new(broker);
    let contracts = store.resolve(&provider.name, &config.selectors).await?;
    let verifier = Verifier::new(config.verifier.clone());

    let mut reports: Vec<VerificationReport> = Vec::with_capacity(contracts.len());
    let mut rejected = 0usize;
    let mut unreachable = Vec::new();
    let mut unpublished = Vec::new();

    for fetched in &contracts {
        let report = verifier
            .verify_all(&fetched.contract, Arc::clone(&client), Arc::clone(&state))
            .await;
        if !config.json {
            println!("{}\n", report.summary());
        }
        if config.publish_results {
            if let Err(err) = store.report(fetched, &report, &provider).await {
                error!(contract = %fetched.id, error = %err, "Could not publish verification result");
                unpublished.push(format!("{} ({err})", fetched.id));
            }
        }

        if !report.passed() {
            if fetched.pending {
                warn!(contract = %fetched.id, "Pending contract failed verification, not blocking");
            } else if report.has_run_fatal() {
                unreachable.push(fetched.id.to_string());
            } else {
                error!(contract = %fetched.id, failures = report.failures().count(), "Verification failed");
                rejected += 1;
            }
        }
        reports.push(report);
    }

    if config.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    if !unreachable.is_empty() {
        return Err(PactError::provider_unreachable(format!(
            "could not complete verification of {}",
            unreachable.join(", ")
        )));
    }
    if !unpublished.is_empty() {
        return Err(PactError::BrokerUnavailable(format!(
            "verification results not published for {}",
            unpublished.join("; ")
        )));
    }
    if rejected > 0 {
        return Ok(Outcome::Rejected);
    }
    info!(contracts = contracts.len(), "Provider verification complete");
    Ok(Outcome::Success)
}

/// Ask the gate whether the participant version may be deployed.
///
/// # Errors
///
/// Returns an error only if the ledger cannot be queried.
pub async fn can_i_deploy(
    config: &CanIDeployConfig,
    ledger: Arc<dyn VerificationLedger>,
    resolver: &VersionResolver,
) -> PactResult<Outcome> {
    let version = resolver.resolve(&config.pacticipant, &config.overrides, &config.ci);
    let record = CompatibilityGate::new(ledger)
        .can_deploy(&config.pacticipant, &version.version, &config.environment)
        .await?;

    if config.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("{}", record.summary());
    }

    if record.deployable {
        Ok(Outcome::Success)
    } else {
        for reason in &record.reasons {
            warn!(%reason, "Deployment blocked");
        }
        Ok(Outcome::Rejected)
    }
}
