//! Command-line interface parsing for Rate Mirror
//!
//! This module handles parsing of CLI arguments using clap. The binary is a
//! diagnostic front end to the fetch layer: it fetches one manifest or a set
//! of daily row-sets and reports how each was obtained.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::data::{Dataset, DATE_FORMAT};

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified dataset name is not recognized
    #[error("Invalid dataset: '{0}'. Valid datasets: lending, borrowing")]
    InvalidDataset(String),

    /// The specified date is not in YYYY-MM-DD format
    #[error("Invalid date: '{0}'. Expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// Rate Mirror - fetch lending and borrowing datasets through the cache
#[derive(Parser, Debug)]
#[command(name = "ratemirror")]
#[command(about = "Fetch lending and borrowing rate datasets through a caching origin layer")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a dataset's manifest as JSON
    ///
    /// Examples:
    ///   ratemirror manifest lending
    ///   ratemirror manifest borrowing
    Manifest {
        /// Dataset name: lending or borrowing
        #[arg(value_parser = parse_dataset_arg)]
        dataset: Dataset,
    },

    /// Print a dataset's rows for one or more dates as NDJSON
    ///
    /// Examples:
    ///   ratemirror rows lending 2025-09-30
    ///   ratemirror rows borrowing 2025-09-29 2025-09-30
    Rows {
        /// Dataset name: lending or borrowing
        #[arg(value_parser = parse_dataset_arg)]
        dataset: Dataset,

        /// Dates in YYYY-MM-DD format
        #[arg(required = true, value_parser = parse_date_arg)]
        dates: Vec<NaiveDate>,
    },
}

/// Parses a dataset string argument into a Dataset.
///
/// # Arguments
/// * `s` - The dataset string from CLI
///
/// # Returns
/// * `Ok(Dataset)` if the string names a known dataset
/// * `Err(CliError::InvalidDataset)` otherwise
pub fn parse_dataset_arg(s: &str) -> Result<Dataset, CliError> {
    s.parse::<Dataset>()
        .map_err(|_| CliError::InvalidDataset(s.to_string()))
}

/// Parses a YYYY-MM-DD date argument.
pub fn parse_date_arg(s: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| CliError::InvalidDate(s.to_string()))
}
