/*
 * nimbus - manage Nimbus platform environments from the command line
 * github.com/nimbus-cloud/nimbus-rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */
use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use nimbus::prelude::*;

pub mod environment;

/// date strftime-inspired format
/// Defined in <https://docs.rs/chrono/latest/chrono/format/strftime/index.html>
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Parser, Debug)]
#[command(name = "nimbus")]
#[command(author, version, about = "nimbus: manage Nimbus platform environments", long_about = None)]
pub struct Cli {
    /// API endpoint URL. Default: environment `NIMBUS_URL`, or derived from the project id
    #[arg(short = 'u', long, env = "NIMBUS_URL")]
    pub url: Option<String>,

    /// API token
    #[arg(long, env = "NIMBUS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Project id
    #[arg(short = 'p', long, env = "NIMBUS_PROJECT", global = true)]
    pub project: Option<String>,

    /// Environment id
    #[arg(short = 'e', long, env = "NIMBUS_ENVIRONMENT", global = true)]
    pub environment: Option<String>,

    /// Quiet mode - suppress progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (repeat for more: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Environment operations
    #[command(alias = "env")]
    Environment(EnvironmentArgs),
}

#[derive(Args, Debug)]
pub struct EnvironmentArgs {
    #[command(subcommand)]
    pub command: EnvironmentCommands,
}

#[derive(Subcommand, Debug)]
pub enum EnvironmentCommands {
    /// Restore an environment backup
    Restore {
        /// The name of the backup to restore. Defaults to the most recent one
        backup: Option<String>,

        /// Do not wait for the operation to complete
        #[arg(long)]
        no_wait: bool,

        /// Give up waiting after this many seconds (default: wait indefinitely)
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Seconds between status polls
        #[arg(long, value_name = "SECS", default_value = "2")]
        poll_interval: u64,

        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// List recent activities for the environment
    #[command(alias = "activity")]
    Activities {
        /// Filter by activity type (e.g. environment.backup)
        #[arg(long, value_name = "TYPE")]
        kind: Option<String>,

        /// Limit number of results
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

pub struct AppContext {
    pub client: NimbusClient,
    pub environment_id: String,
    pub quiet: bool,
}

pub async fn run(cli: Cli) -> Result<()> {
    let client = build_client(&cli)?;
    let environment_id = match cli.environment.clone() {
        Some(id) if !id.is_empty() => id,
        _ => bail!("no environment specified. Use --environment or set NIMBUS_ENVIRONMENT"),
    };

    let ctx = AppContext {
        client,
        environment_id,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Environment(args) => environment::handle(&ctx, args).await,
    }
}

fn build_client(cli: &Cli) -> Result<NimbusClient> {
    let base_url = match (&cli.url, &cli.project) {
        (Some(url), _) => url.clone(),
        // each project gets its own API host
        (None, Some(project)) => format!("https://{project}.api.nimbus.cloud"),
        (None, None) => {
            bail!("no project or endpoint specified. Use --project, --url, or set NIMBUS_URL")
        }
    };

    let config = ClientConfig::default()
        .base_url(base_url)
        .app_name(env!("CARGO_BIN_NAME"));
    let client = NimbusClient::with_config(config)?;

    if let Some(token) = &cli.token {
        client.set_token(SecretToken::new(token.clone()));
    }
    Ok(client)
}
