//! Rate Mirror - fetch lending and borrowing datasets through the cache
//!
//! A diagnostic command-line front end to the fetch layer. Data goes to
//! stdout; provenance and logs go to stderr.

use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use ratemirror::cli::{Cli, Command};
use ratemirror::config::Config;
use ratemirror::data::DatasetClient;

/// Sets up stderr logging: 0 = warn, 1 = info, 2+ = debug. `RUST_LOG` wins if set.
fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("ratemirror=warn"),
        1 => EnvFilter::new("ratemirror=info"),
        _ => EnvFilter::new("ratemirror=debug"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    debug!(
        base_url = %config.origin.base_url,
        owner = %config.origin.owner,
        repo = %config.origin.repo,
        branch = %config.origin.branch,
        "loaded configuration"
    );
    let client = DatasetClient::from_config(&config)?;

    match cli.command {
        Command::Manifest { dataset } => {
            let result = client.get_manifest(dataset).await?;
            let mut out = io::stdout().lock();
            serde_json::to_writer_pretty(&mut out, &result.manifest)?;
            writeln!(out)?;
            eprintln!("provenance: {}", serde_json::to_string(&result.provenance)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Rows { dataset, dates } => {
            let outcome = client.get_rows_for_dates(dataset, &dates).await;
            let mut out = io::stdout().lock();
            let mut failed = false;

            for (date, result) in &outcome.results {
                match result {
                    Ok(daily) => {
                        for row in daily.rows.to_values()? {
                            serde_json::to_writer(&mut out, &row)?;
                            writeln!(out)?;
                        }
                    }
                    Err(err) => {
                        failed = true;
                        error!(%dataset, %date, error = %err, "failed to load rows");
                    }
                }
            }

            eprintln!("provenance: {}", serde_json::to_string(&outcome.summary)?);
            Ok(if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
