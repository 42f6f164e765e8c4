//! Entry point of the `cdct` binary.

use anyhow::Context;
use cdct_cli::commands::{self, EXIT_CONFIGURATION, EXIT_TRANSPORT, Outcome};
use cdct_cli::{Cli, Command, config, error_exit_code};
use cdct_common::{HttpConfig, init_tracing};
use cdct_pact::{
    CiContext, HttpBroker, HttpProviderClient, HttpStateSetup, NoStateSetup, PactError,
    StateSetup, VersionResolver,
};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    if let Err(err) = init_tracing(&cli.tracing_config()) {
        eprintln!("cdct: {err}");
        return ExitCode::from(EXIT_CONFIGURATION);
    }

    match run(cli).await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(err) => {
            let code = err
                .downcast_ref::<PactError>()
                .map_or(EXIT_TRANSPORT, error_exit_code);
            error!(error = format!("{err:#}"), exit_code = code, "cdct failed");
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<Outcome> {
    let ci = CiContext::from_env();
    let resolver = VersionResolver::system();

    match cli.command {
        Command::Publish(args) => {
            let (broker, config) = config::publish_config(args, ci)?;
            info!(broker = %broker.base_url, has_token = true, "Publishing to broker");
            let broker = Arc::new(HttpBroker::new(broker)?);
            commands::publish(&config, broker, &resolver)
                .await
                .context("publishing contracts")
        }
        Command::Verify(args) => {
            let (broker, config) = config::verify_config(args, ci)?;
            info!(broker = %broker.base_url, has_token = true, "Verifying against broker");
            let broker = Arc::new(HttpBroker::new(broker)?);
            let http = HttpConfig::for_provider(config.verifier.timeout);
            let client = Arc::new(HttpProviderClient::new(
                config.provider_base_url.as_str(),
                &http,
            )?);
            let state: Arc<dyn StateSetup> = match &config.state_change_url {
                Some(url) => Arc::new(HttpStateSetup::new(url.as_str(), &http)?),
                None => Arc::new(NoStateSetup),
            };
            commands::verify(&config, broker, client, state, &resolver)
                .await
                .context("verifying provider")
        }
        Command::CanIDeploy(args) => {
            let (broker, config) = config::can_i_deploy_config(args, ci)?;
            let ledger = Arc::new(HttpBroker::new(broker)?);
            commands::can_i_deploy(&config, ledger, &resolver)
                .await
                .context("checking deployability")
        }
    }
}
