//! Scan request, result and run history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trigger parameters; both fall back to configured defaults when omitted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    #[serde(default)]
    pub spreadsheet_id: Option<String>,
    #[serde(default)]
    pub sheet_name: Option<String>,
}

impl ScanRequest {
    pub fn new(spreadsheet_id: Option<String>, sheet_name: Option<String>) -> Self {
        Self {
            spreadsheet_id,
            sheet_name,
        }
    }
}

/// Fully resolved spreadsheet/tab a run reads from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanTarget {
    pub spreadsheet_id: String,
    pub sheet_name: String,
}

/// Per-run row counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCounts {
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl ScanCounts {
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.skipped + self.failed
    }
}

/// Summary of one scan run
///
/// Serializes to the shape the trigger endpoint returns:
/// `{success, error?, inserted, updated, skipped, failed, reasons, warnings, runId?}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub counts: ScanCounts,
    /// Per-row rejection reasons, in sheet order
    pub reasons: Vec<String>,
    /// Per-row coercion warnings, in sheet order
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
}

impl ScanResult {
    pub fn completed(
        counts: ScanCounts,
        reasons: Vec<String>,
        warnings: Vec<String>,
        run_id: Option<Uuid>,
    ) -> Self {
        Self {
            success: true,
            error: None,
            counts,
            reasons,
            warnings,
            run_id,
        }
    }

    /// A run that hit a fatal error; counts are always zero
    pub fn failed(error: impl Into<String>, reasons: Vec<String>, run_id: Option<Uuid>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            counts: ScanCounts::default(),
            reasons,
            warnings: Vec::new(),
            run_id,
        }
    }

    /// Status code the trigger endpoint should answer with
    pub fn http_status(&self) -> u16 {
        if self.success {
            200
        } else {
            500
        }
    }
}

/// Lifecycle state of a recorded run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(ScanStatus::Running),
            "completed" => Some(ScanStatus::Completed),
            "failed" => Some(ScanStatus::Failed),
            _ => None,
        }
    }
}

/// A recorded scan run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRun {
    pub id: Uuid,
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub status: ScanStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub counts: ScanCounts,
    pub error_message: Option<String>,
}

impl ScanRun {
    pub fn start(target: &ScanTarget) -> Self {
        Self {
            id: Uuid::new_v4(),
            spreadsheet_id: target.spreadsheet_id.clone(),
            sheet_name: target.sheet_name.clone(),
            status: ScanStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            counts: ScanCounts::default(),
            error_message: None,
        }
    }
}
