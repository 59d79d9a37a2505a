//! Core data models for the lending and borrowing datasets
//!
//! This module contains the typed shapes of the files published by the
//! origin: one manifest per dataset and one row-set per dataset and date.

pub mod client;

pub use client::{DailyRows, DatasetClient, DatasetError, ManifestResult, RowsForDates};

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Date format used in logical paths and manifests
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One of the republished datasets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Lending,
    Borrowing,
}

impl Dataset {
    pub const ALL: [Dataset; 2] = [Dataset::Lending, Dataset::Borrowing];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::Lending => "lending",
            Dataset::Borrowing => "borrowing",
        }
    }

    /// Logical path of this dataset's manifest
    pub fn manifest_path(&self) -> String {
        format!("meta/{}_manifest.json", self.as_str())
    }

    /// Logical path of this dataset's rows for `date`
    pub fn daily_path(&self, date: NaiveDate) -> String {
        format!("data/{}/{}.json", self.as_str(), date.format(DATE_FORMAT))
    }

    /// Observability label for this dataset's manifest
    pub fn manifest_source(&self) -> String {
        format!("manifest:{}", self.as_str())
    }

    /// Observability label for this dataset's rows for `date`
    pub fn daily_source(&self, date: NaiveDate) -> String {
        format!("{}:{}", self.as_str(), date.format(DATE_FORMAT))
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dataset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lending" => Ok(Dataset::Lending),
            "borrowing" => Ok(Dataset::Borrowing),
            other => Err(format!(
                "Unknown dataset: '{}'. Valid datasets: lending, borrowing",
                other
            )),
        }
    }
}

/// Index of the dates available for one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Most recent date with data
    pub latest: NaiveDate,
    /// Every date with data, ascending
    pub dates: Vec<NaiveDate>,
    /// When the dataset was last published
    #[serde(alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(alias = "schemaVersion")]
    pub schema_version: u32,
}

impl Manifest {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.dates.binary_search(&date).is_ok()
    }

    /// Available dates within `from..=to`, ascending
    pub fn dates_between(&self, from: NaiveDate, to: NaiveDate) -> &[NaiveDate] {
        if from > to {
            return &[];
        }
        let start = self.dates.partition_point(|d| *d < from);
        let end = self.dates.partition_point(|d| *d <= to);
        &self.dates[start..end]
    }
}

/// Fields shared by every row of both datasets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowKey {
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_name: Option<String>,
}

/// One pool's supply-side figures for one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LendingRow {
    #[serde(flatten)]
    pub key: RowKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supply_apy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_supplied_usd: Option<f64>,
    /// Any other published columns, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One pool's borrow-side figures for one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowingRow {
    #[serde(flatten)]
    pub key: RowKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub borrow_apy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_borrowed_usd: Option<f64>,
    /// Any other published columns, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Ordered rows of one dataset for one date
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RowSet {
    Lending(Vec<LendingRow>),
    Borrowing(Vec<BorrowingRow>),
}

impl RowSet {
    /// Parses `bytes` as the row shape of `dataset`
    pub fn parse(dataset: Dataset, bytes: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(match dataset {
            Dataset::Lending => RowSet::Lending(serde_json::from_slice(bytes)?),
            Dataset::Borrowing => RowSet::Borrowing(serde_json::from_slice(bytes)?),
        })
    }

    pub fn dataset(&self) -> Dataset {
        match self {
            RowSet::Lending(_) => Dataset::Lending,
            RowSet::Borrowing(_) => Dataset::Borrowing,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RowSet::Lending(rows) => rows.len(),
            RowSet::Borrowing(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shared prefix of every row, in order
    pub fn keys(&self) -> Vec<&RowKey> {
        match self {
            RowSet::Lending(rows) => rows.iter().map(|r| &r.key).collect(),
            RowSet::Borrowing(rows) => rows.iter().map(|r| &r.key).collect(),
        }
    }

    /// Each row as one compact JSON value, in order
    pub fn to_values(&self) -> Result<Vec<Value>, serde_json::Error> {
        match self {
            RowSet::Lending(rows) => rows.iter().map(serde_json::to_value).collect(),
            RowSet::Borrowing(rows) => rows.iter().map(serde_json::to_value).collect(),
        }
    }
}
