use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use gce_migrate::config::{
    DEFAULT_IMAGE_LOCATION, DEFAULT_LABEL_FILTER, DEFAULT_NAME_PREFIX, MigrationConfig,
};
use gce_migrate::gcp::gce::GceClient;
use gce_migrate::gcp::types::TokenSource;
use gce_migrate::migrate::{RateLimitPolicy, WaitPolicy};

#[derive(Parser, Debug)]
#[command(
    name = "gce-migrate",
    about = "Migrate Compute Engine VMs between projects via snapshots and shared images"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Service account key file used to mint access tokens
    #[arg(long, global = true, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    credentials: Option<PathBuf>,
    /// Pre-issued OAuth access token; takes precedence over --credentials
    #[arg(long, global = true, env = "GCE_MIGRATE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    #[arg(long, global = true, env = "GCE_MIGRATE_SOURCE_PROJECT")]
    source_project: Option<String>,
    #[arg(long, global = true, env = "GCE_MIGRATE_DESTINATION_PROJECT")]
    destination_project: Option<String>,
    /// Numeric id of the destination project
    #[arg(long, global = true, env = "GCE_MIGRATE_DESTINATION_PROJECT_NUMBER")]
    destination_project_number: Option<String>,
    #[arg(long, global = true, env = "GCE_MIGRATE_DESTINATION_ZONE")]
    destination_zone: Option<String>,
    #[arg(long, global = true, env = "GCE_MIGRATE_NETWORK")]
    network: Option<String>,
    #[arg(long, global = true, env = "GCE_MIGRATE_SUBNET")]
    subnet: Option<String>,
    #[arg(long, global = true, env = "GCE_MIGRATE_IMAGE_LOCATION", default_value = DEFAULT_IMAGE_LOCATION)]
    image_location: String,

    /// Seconds between operation polls
    #[arg(long, global = true, default_value_t = 3)]
    poll_interval: u64,
    /// Seconds to wait for a single operation before giving up
    #[arg(long, global = true, default_value_t = 1800)]
    operation_timeout: u64,
    /// Minimum pause between disks, in seconds
    #[arg(long, global = true, default_value_t = 10)]
    pause_floor: u64,
    /// Maximum pause after rate limiting, in seconds
    #[arg(long, global = true, default_value_t = 300)]
    pause_ceiling: u64,
    /// Retries of a rate-limited call
    #[arg(long, global = true, default_value_t = 5)]
    max_retries: u32,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Migrate a single VM
    Vm {
        #[arg(long)]
        zone: String,
        #[arg(name = "INSTANCE_NAME")]
        name: String,
        /// Name of the new VM
        #[arg(long)]
        target: String,
        /// Machine type of the new VM; copied from the source when omitted
        #[arg(long)]
        machine_type: Option<String>,
    },

    /// Migrate every VM matching a label filter, one at a time
    Batch {
        #[arg(long, env = "GCE_MIGRATE_LABEL_FILTER", default_value = DEFAULT_LABEL_FILTER)]
        filter: String,
        /// Prefix of the new VMs' names
        #[arg(long, default_value = DEFAULT_NAME_PREFIX)]
        prefix: String,
    },

    /// List the VMs a batch run would migrate
    Discover {
        #[arg(long, env = "GCE_MIGRATE_LABEL_FILTER", default_value = DEFAULT_LABEL_FILTER)]
        filter: String,
        #[arg(long, default_value = DEFAULT_NAME_PREFIX)]
        prefix: String,
    },
}

impl GlobalArgs {
    fn token_source(&self) -> Result<TokenSource> {
        match (&self.access_token, &self.credentials) {
            (Some(token), _) => Ok(TokenSource::Static(token.clone())),
            (None, Some(path)) => Ok(TokenSource::ServiceAccountFile(path.clone())),
            (None, None) => bail!(
                "No credentials: pass --credentials (or GOOGLE_APPLICATION_CREDENTIALS) or --access-token"
            ),
        }
    }

    /// Builds the run's configuration. Discovery only needs the source project.
    fn config(&self, destination_required: bool) -> Result<MigrationConfig> {
        let source_project = required(&self.source_project, "--source-project")?;
        let destination = |value: &Option<String>, flag: &str| -> Result<String> {
            if destination_required {
                required(value, flag)
            } else {
                Ok(value.clone().unwrap_or_default())
            }
        };
        let mut config = MigrationConfig::new(
            &source_project,
            &destination(&self.destination_project, "--destination-project")?,
            &destination(
                &self.destination_project_number,
                "--destination-project-number",
            )?,
            &destination(&self.destination_zone, "--destination-zone")?,
            &destination(&self.network, "--network")?,
            &destination(&self.subnet, "--subnet")?,
        );
        config.image_location = self.image_location.clone();
        config.wait = WaitPolicy {
            interval: Duration::from_secs(self.poll_interval),
            timeout: Duration::from_secs(self.operation_timeout),
        };
        config.rate_limit = RateLimitPolicy {
            floor: Duration::from_secs(self.pause_floor),
            ceiling: Duration::from_secs(self.pause_ceiling),
            max_retries: self.max_retries,
        };
        if destination_required {
            config.validate().context("Invalid configuration")?;
        }
        Ok(config)
    }
}

fn required(value: &Option<String>, flag: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.clone()),
        _ => bail!("{} is required", flag),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    gce_migrate::init_tracing(&cli.global.log);
    let cancel = gce_migrate::shutdown::install_cancel_handler()?;
    let compute = GceClient::new(cli.global.token_source()?);

    match cli.cmd {
        Commands::Vm {
            zone,
            name,
            target,
            machine_type,
        } => {
            let config = cli.global.config(true)?;
            let request = config.request(&zone, &name, &target, machine_type.as_deref());
            commands::vm::run(&compute, &config, &request, cancel).await
        }
        Commands::Batch { filter, prefix } => {
            let mut config = cli.global.config(true)?;
            config.label_filter = filter;
            config.name_prefix = prefix;
            commands::batch::run(&compute, &config, cancel).await
        }
        Commands::Discover { filter, prefix } => {
            let mut config = cli.global.config(false)?;
            config.label_filter = filter;
            config.name_prefix = prefix;
            commands::discover::run(&compute, &config).await
        }
    }
}

mod commands;
mod common;
