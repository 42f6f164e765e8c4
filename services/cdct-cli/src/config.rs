//! Conversion of parsed arguments into explicit run configuration.
//!
//! Everything is validated here, before any network call is made.

use crate::cli::{BrokerArgs, CanIDeployArgs, PublishArgs, VerifyArgs};
use cdct_pact::{
    BrokerConfig, CiContext, ConsumerVersionSelector, PactError, PactResult, VerifierConfig,
    VersionOverrides,
};
use cdct_pact::version::DEFAULT_BRANCH;
use secrecy::SecretString;
use chrono::NaiveDate;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Settings of a publish run.
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// Directory holding the documents
    pub pact_dir: PathBuf,
    /// Explicit consumer identity values
    pub overrides: VersionOverrides,
    /// CI identity
    pub ci: CiContext,
}

/// Settings of a verification run.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Provider participant name
    pub provider_name: String,
    /// Running provider
    pub provider_base_url: Url,
    /// Provider state endpoint
    pub state_change_url: Option<Url>,
    /// Explicit provider identity values
    pub overrides: VersionOverrides,
    /// CI identity
    pub ci: CiContext,
    /// Which consumer versions to verify
    pub selectors: Vec<ConsumerVersionSelector>,
    /// Verifier settings
    pub verifier: VerifierConfig,
    /// Work-in-progress contracts published since this date are verified as pending
    pub include_wip_pacts_since: Option<NaiveDate>,
    /// Send results to the broker
    pub publish_results: bool,
    /// Print reports as JSON
    pub json: bool,
}

/// Settings of a can-i-deploy run.
#[derive(Debug, Clone)]
pub struct CanIDeployConfig {
    /// Participant to deploy
    pub pacticipant: String,
    /// Explicit version
    pub overrides: VersionOverrides,
    /// CI identity
    pub ci: CiContext,
    /// Target environment
    pub environment: String,
    /// Print the decision as JSON
    pub json: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, name: &str) -> PactResult<String> {
    non_empty(value).ok_or_else(|| PactError::configuration(format!("{name} is required")))
}

/// Broker settings; URL and token are both required.
///
/// # Errors
///
/// Returns a configuration error when either is missing or the URL is unusable.
pub fn broker_config(args: BrokerArgs) -> PactResult<BrokerConfig> {
    let base_url = required(args.broker_base_url, "PACT_BROKER_BASE_URL")?;
    let token = required(args.broker_token, "PACT_BROKER_TOKEN")?;
    BrokerConfig::new(&base_url, SecretString::from(token))
}

/// `BRANCH` fills in when CI provides no branch.
fn with_branch_fallback(mut ci: CiContext, branch: Option<String>) -> CiContext {
    if ci.branch.is_none() {
        ci.branch = non_empty(branch);
    }
    ci
}

fn parse_url(value: &str, name: &str) -> PactResult<Url> {
    Url::parse(value.trim())
        .map_err(|e| PactError::configuration(format!("{name} is not a valid URL: {e}")))
}

/// Publish settings.
///
/// # Errors
///
/// Returns a configuration error when broker settings are missing.
pub fn publish_config(args: PublishArgs, ci: CiContext) -> PactResult<(BrokerConfig, PublishConfig)> {
    let broker = broker_config(args.broker)?;
    let config = PublishConfig {
        pact_dir: args.pact_dir,
        overrides: VersionOverrides {
            version: non_empty(args.consumer_version),
            branch: non_empty(args.consumer_branch),
            suffix: non_empty(args.version_suffix),
            tags: args.tags,
        },
        ci: with_branch_fallback(ci, args.branch),
    };
    Ok((broker, config))
}

/// Verification settings.
///
/// Contracts are selected from the latest version on the consumer branch
/// (explicit, then CI, then `BRANCH`, then `main`) plus any deployed
/// environments asked for.
///
/// # Errors
///
/// Returns a configuration error when broker settings or the provider name
/// are missing or a URL is malformed.
pub fn verify_config(args: VerifyArgs, ci: CiContext) -> PactResult<(BrokerConfig, VerifyConfig)> {
    let broker = broker_config(args.broker)?.with_wip_pacts_since(args.include_wip_since);
    let provider_name = required(args.provider_name, "PROVIDER_NAME")?;
    let provider_base_url = parse_url(&args.provider_base_url, "PROVIDER_BASE_URL")?;
    let state_change_url = non_empty(args.state_change_url)
        .map(|url| parse_url(&url, "PROVIDER_STATES_SETUP_URL"))
        .transpose()?;
    if args.timeout_secs == 0 {
        return Err(PactError::configuration("VERIFY_TIMEOUT_SECS must be at least 1"));
    }
    if args.max_concurrency == 0 {
        return Err(PactError::configuration("VERIFY_MAX_CONCURRENCY must be at least 1"));
    }

    let ci = with_branch_fallback(ci, args.branch);
    let consumer_branch = non_empty(args.consumer_branch)
        .or_else(|| ci.branch.clone())
        .unwrap_or_else(|| DEFAULT_BRANCH.to_string());

    let mut selectors = vec![ConsumerVersionSelector::branch(consumer_branch)];
    selectors.extend(
        args.consumer_environments
            .into_iter()
            .filter(|env| !env.trim().is_empty())
            .map(ConsumerVersionSelector::environment),
    );

    let config = VerifyConfig {
        provider_name,
        provider_base_url,
        state_change_url,
        overrides: VersionOverrides {
            version: non_empty(args.provider_version),
            branch: non_empty(args.provider_branch),
            suffix: non_empty(args.version_suffix),
            tags: Vec::new(),
        },
        ci,
        selectors,
        verifier: VerifierConfig::default()
            .with_timeout(Duration::from_secs(args.timeout_secs))
            .with_max_concurrency(args.max_concurrency),
        include_wip_pacts_since: args.include_wip_since,
        publish_results: !args.no_publish_results,
        json: args.json,
    };
    Ok((broker, config))
}

/// Can-i-deploy settings.
///
/// # Errors
///
/// Returns a configuration error when broker settings or the participant
/// are missing.
pub fn can_i_deploy_config(
    args: CanIDeployArgs,
    ci: CiContext,
) -> PactResult<(BrokerConfig, CanIDeployConfig)> {
    let broker = broker_config(args.broker)?;
    let config = CanIDeployConfig {
        pacticipant: required(args.pacticipant, "PACTICIPANT")?,
        overrides: VersionOverrides {
            version: non_empty(args.participant_version),
            ..VersionOverrides::default()
        },
        ci,
        environment: args.environment,
        json: args.json,
    };
    Ok((broker, config))
}
