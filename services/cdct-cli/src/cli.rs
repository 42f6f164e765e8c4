//! Command line definition.
//!
//! Every option falls back to the environment variable the CI pipeline sets.

use cdct_common::TracingConfig;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Consumer-driven contract testing.
#[derive(Parser, Debug)]
#[command(name = "cdct", version, about)]
pub struct Cli {
    /// Log level filter (`RUST_LOG` wins when set)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    pub log_json: bool,

    /// Operation to run
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Tracing settings from the global options.
    #[must_use]
    pub fn tracing_config(&self) -> TracingConfig {
        let config = TracingConfig::default().with_log_level(&self.log_level);
        if self.log_json {
            config.with_json_output()
        } else {
            config
        }
    }
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Publish the contract documents in a directory
    Publish(PublishArgs),
    /// Verify a provider against the contracts selected for it
    Verify(VerifyArgs),
    /// Decide whether a participant version may be deployed
    #[command(disable_version_flag = true)]
    CanIDeploy(CanIDeployArgs),
}

/// Broker connection options.
#[derive(Args, Debug, Clone, Default)]
pub struct BrokerArgs {
    /// Broker base URL
    #[arg(long, env = "PACT_BROKER_BASE_URL")]
    pub broker_base_url: Option<String>,

    /// Broker bearer token
    #[arg(long, env = "PACT_BROKER_TOKEN", hide_env_values = true)]
    pub broker_token: Option<String>,
}

/// Options of `cdct publish`.
#[derive(Args, Debug, Clone)]
pub struct PublishArgs {
    /// Broker connection
    #[command(flatten)]
    pub broker: BrokerArgs,

    /// Directory holding `<consumer>-<provider>.json` documents
    #[arg(long, env = "PACT_DIR", default_value = "./pacts")]
    pub pact_dir: PathBuf,

    /// Consumer version; `local` means derive it
    #[arg(long, env = "CONSUMER_VERSION")]
    pub consumer_version: Option<String>,

    /// Consumer branch, overriding CI
    #[arg(long, env = "CONSUMER_BRANCH")]
    pub consumer_branch: Option<String>,

    /// Branch used when CI provides none
    #[arg(long, env = "BRANCH")]
    pub branch: Option<String>,

    /// Appended to the resolved version
    #[arg(long, env = "VERSION_SUFFIX")]
    pub version_suffix: Option<String>,

    /// Extra version tags
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

/// Options of `cdct verify`.
#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    /// Broker connection
    #[command(flatten)]
    pub broker: BrokerArgs,

    /// Provider participant name
    #[arg(long, env = "PROVIDER_NAME")]
    pub provider_name: Option<String>,

    /// Where the running provider listens
    #[arg(long, env = "PROVIDER_BASE_URL", default_value = "http://127.0.0.1:9001")]
    pub provider_base_url: String,

    /// Endpoint that establishes provider states
    #[arg(long, env = "PROVIDER_STATES_SETUP_URL")]
    pub state_change_url: Option<String>,

    /// Provider version; `local` means derive it
    #[arg(long, env = "PROVIDER_VERSION")]
    pub provider_version: Option<String>,

    /// Provider branch, overriding CI
    #[arg(long, env = "PROVIDER_BRANCH")]
    pub provider_branch: Option<String>,

    /// Consumer branch whose latest contracts are verified
    #[arg(long, env = "CONSUMER_BRANCH")]
    pub consumer_branch: Option<String>,

    /// Branch used when CI provides none
    #[arg(long, env = "BRANCH")]
    pub branch: Option<String>,

    /// Appended to the resolved provider version
    #[arg(long, env = "VERSION_SUFFIX")]
    pub version_suffix: Option<String>,

    /// Also verify contracts of consumers deployed to this environment
    #[arg(long = "consumer-environment")]
    pub consumer_environments: Vec<String>,

    /// Per-call timeout in seconds
    #[arg(long, env = "VERIFY_TIMEOUT_SECS", default_value_t = 10)]
    pub timeout_secs: u64,

    /// Interactions verified at once
    #[arg(long, env = "VERIFY_MAX_CONCURRENCY", default_value_t = 4)]
    pub max_concurrency: usize,

    /// Also verify work-in-progress contracts published since this date (YYYY-MM-DD)
    #[arg(long = "include-wip-since", env = "INCLUDE_WIP_PACTS_SINCE")]
    pub include_wip_since: Option<NaiveDate>,

    /// Do not send results to the broker
    #[arg(long)]
    pub no_publish_results: bool,

    /// Print reports as JSON
    #[arg(long)]
    pub json: bool,
}

/// Options of `cdct can-i-deploy`.
#[derive(Args, Debug, Clone)]
pub struct CanIDeployArgs {
    /// Broker connection
    #[command(flatten)]
    pub broker: BrokerArgs,

    /// Participant to deploy
    #[arg(long, env = "PACTICIPANT")]
    pub pacticipant: Option<String>,

    /// Version to deploy; `local` means derive it
    #[arg(long = "version", env = "PROVIDER_VERSION")]
    pub participant_version: Option<String>,

    /// Target environment
    #[arg(long = "to-environment", env = "ENVIRONMENT", default_value = "test")]
    pub environment: String,

    /// Print the decision as JSON
    #[arg(long)]
    pub json: bool,
}
