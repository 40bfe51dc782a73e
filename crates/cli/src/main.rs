//! Bakery CLI - run check profiles over a set of files.

mod profiles;
mod render;

use anyhow::Result;
use bakery_core::{Status, Value};
use bakery_execution::{Budget, Runner};
use bakery_profile::Configuration;
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bakery")]
#[command(about = "Quality checks for collections of files", long_about = None)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a profile over files
    Check {
        /// Profile name
        profile: String,
        /// Files to check
        files: Vec<String>,
        /// Configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Only run checks whose id contains one of these
        #[arg(short = 'c', long = "checkid")]
        checkid: Vec<String>,
        /// Skip checks whose id contains one of these
        #[arg(short = 'x', long = "exclude-checkid")]
        exclude_checkid: Vec<String>,
        /// Exit with 1 when the worst status reaches this level
        #[arg(long, default_value = "FAIL")]
        error_code_on: Status,
        /// Identities run in parallel
        #[arg(short, long, default_value = "1")]
        jobs: NonZeroUsize,
        /// Time budget per identity, in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List available profiles
    List,
    /// Show the checks of a profile
    Describe {
        /// Profile name
        profile: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let catalog = profiles::catalog();

    match cli.command {
        Commands::Check {
            profile,
            files,
            config,
            checkid,
            exclude_checkid,
            error_code_on,
            jobs,
            timeout,
            json,
        } => {
            let profile = catalog.load(&profile)?;
            let mut configuration = match config {
                Some(path) => Configuration::from_path(&path)?,
                None => Configuration::default(),
            };
            if !checkid.is_empty() {
                configuration.explicit_checks = Some(checkid);
            }
            if !exclude_checkid.is_empty() {
                configuration.exclude_checks = Some(exclude_checkid);
            }

            let mut budget = Budget::new().with_max_concurrent(jobs);
            if let Some(seconds) = timeout {
                budget = budget.with_time_per_identity(Duration::from_secs(seconds));
            }

            let values = HashMap::from([("files".to_string(), Value::from(files))]);
            let runner = Runner::new(profile, values, configuration)?.with_budget(budget);

            let stop = runner.stop_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, stopping run");
                    stop.stop();
                }
            });

            let report = runner.run().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report.get_data())?);
            } else {
                render::print_report(&report);
            }

            let code = report.exit_code(error_code_on);
            info!("Exit code {}", code);
            std::process::exit(code);
        }
        Commands::List => {
            println!("Profiles");
            for name in catalog.list() {
                println!("  {}", name);
            }
        }
        Commands::Describe { profile } => {
            let profile = catalog.load(&profile)?;
            render::print_profile(&profile);
        }
    }

    Ok(())
}
