use chrono::{DateTime, Datelike, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Status options for selections
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SelectionStatus {
    Draft,
    Completed,
}

impl Default for SelectionStatus {
    fn default() -> Self {
        SelectionStatus::Draft
    }
}

impl SelectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionStatus::Draft => "draft",
            SelectionStatus::Completed => "completed",
        }
    }
}

impl FromStr for SelectionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(SelectionStatus::Draft),
            "completed" => Ok(SelectionStatus::Completed),
            other => Err(format!("unknown selection status: {other}")),
        }
    }
}

impl fmt::Display for SelectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user's material selection for a product. `choices` maps module id to
/// the chosen material id, at most one entry per module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "productId")]
    pub product_id: String,
    #[serde(default)]
    pub status: SelectionStatus,
    pub choices: BTreeMap<String, String>,
    #[serde(rename = "downloadCount")]
    pub download_count: i64,
    #[serde(rename = "lastDownloadAt")]
    pub last_download_at: Option<DateTime<Utc>>,
    #[serde(rename = "completedAt")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// Input for setting one module choice on a draft selection
#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceInput {
    #[serde(rename = "moduleId")]
    pub module_id: String,
    #[serde(rename = "materialId")]
    pub material_id: String,
}

/// One row of a user's download history, joined with product info
#[derive(Debug, Clone, Serialize)]
pub struct DownloadHistoryEntry {
    #[serde(rename = "selectionId")]
    pub selection_id: String,
    #[serde(rename = "productId")]
    pub product_id: String,
    #[serde(rename = "productName")]
    pub product_name: String,
    #[serde(rename = "spuCode")]
    pub spu_code: String,
    #[serde(rename = "downloadCount")]
    pub download_count: i64,
    #[serde(rename = "lastDownloadAt")]
    pub last_download_at: DateTime<Utc>,
}

/// Aggregate download numbers over a time window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadStats {
    #[serde(rename = "totalDownloads")]
    pub total_downloads: i64,
    #[serde(rename = "uniqueProducts")]
    pub unique_products: i64,
}

/// Time window for download statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatsRange {
    Daily,
    Monthly,
}

impl StatsRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatsRange::Daily => "daily",
            StatsRange::Monthly => "monthly",
        }
    }

    /// Start of the window containing `now` (UTC midnight boundaries)
    pub fn period_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let date = match self {
            StatsRange::Daily => now.date_naive(),
            StatsRange::Monthly => now.date_naive().with_day(1).unwrap_or_else(|| now.date_naive()),
        };
        date.and_time(NaiveTime::MIN).and_utc()
    }
}

impl FromStr for StatsRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(StatsRange::Daily),
            "monthly" => Ok(StatsRange::Monthly),
            other => Err(format!("unknown stats range: {other}")),
        }
    }
}

impl fmt::Display for StatsRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
