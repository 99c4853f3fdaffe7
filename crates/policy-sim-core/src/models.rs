//! Record types owned by the hybrid result store.
//!
//! Records are serialized in two shapes:
//!
//! - **Local** (camelCase JSON): what the same-device key/value store holds.
//! - **Row** (snake_case columns): what the remote relational store holds.
//!   [`SimulationRow`] and [`AnalysisRow`] are the row shapes; conversions to
//!   and from the local shapes live here so the store never hand-maps fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Processing state of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    Parsed,
    Processing,
}

/// Metadata for a document the user uploaded.
///
/// Local-only: uploads have no remote counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    /// Millisecond timestamp at creation time.
    pub id: i64,
    /// Display name; uploads are de-duplicated on this.
    pub name: String,
    /// Where the bytes live (`s3://...`, a local path, or empty).
    #[serde(default)]
    pub source: String,
    /// Human-readable size, e.g. `"2.4 MB"`.
    pub size: String,
    pub status: UploadStatus,
}

/// Lifecycle state of a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationStatus {
    Draft,
    Completed,
    Deployed,
}

impl SimulationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimulationStatus::Draft => "Draft",
            SimulationStatus::Completed => "Completed",
            SimulationStatus::Deployed => "Deployed",
        }
    }
}

impl std::fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SimulationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(SimulationStatus::Draft),
            "completed" => Ok(SimulationStatus::Completed),
            "deployed" => Ok(SimulationStatus::Deployed),
            other => Err(format!(
                "invalid simulation status '{}': expected draft, completed, or deployed",
                other
            )),
        }
    }
}

/// A simulated outcome for one scenario of a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    /// Upsert key. Locally generated token or a backend-supplied value.
    pub id: String,
    /// Loose reference to the parent policy (timestamp-derived, not a foreign key).
    pub policy_id: i64,
    pub scenario_name: String,
    /// ISO-8601 creation time.
    pub created_at: String,
    pub status: SimulationStatus,
    /// Opaque payload produced by the LLM.
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// An extraction result for one uploaded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Source file name; the local cache key.
    pub file_name: String,
    #[serde(default)]
    pub data: Value,
    /// ISO-8601 time of the extraction.
    pub timestamp: String,
}

/// Row shape of the remote `simulations` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRow {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub policy_id: i64,
    pub scenario_name: String,
    pub status: SimulationStatus,
    #[serde(default)]
    pub data: Value,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl SimulationRow {
    /// Build the row written on a remote upsert, stamped with the owner and
    /// the update time.
    pub fn for_upsert(result: &SimulationResult, user_id: &str, updated_at: String) -> Self {
        Self {
            id: result.id.clone(),
            user_id: Some(user_id.to_string()),
            policy_id: result.policy_id,
            scenario_name: result.scenario_name.clone(),
            status: result.status,
            data: result.data.clone(),
            created_at: result.created_at.clone(),
            updated_at: Some(updated_at),
        }
    }
}

impl From<SimulationRow> for SimulationResult {
    fn from(row: SimulationRow) -> Self {
        Self {
            id: row.id,
            policy_id: row.policy_id,
            scenario_name: row.scenario_name,
            created_at: row.created_at,
            status: row.status,
            data: row.data,
            user_id: row.user_id,
        }
    }
}

/// Row shape of the remote, insert-only `analyses` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRow {
    pub user_id: String,
    pub file_name: String,
    #[serde(default)]
    pub data: Value,
    pub created_at: String,
}

impl AnalysisRow {
    pub fn for_insert(result: &AnalysisResult, user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            file_name: result.file_name.clone(),
            data: result.data.clone(),
            created_at: result.timestamp.clone(),
        }
    }
}

impl From<AnalysisRow> for AnalysisResult {
    fn from(row: AnalysisRow) -> Self {
        Self {
            file_name: row.file_name,
            data: row.data,
            timestamp: row.created_at,
        }
    }
}

/// Current UTC time formatted as ISO-8601 with millisecond precision.
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
