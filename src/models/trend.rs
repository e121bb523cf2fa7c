use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::TrendError;

/// A single value read from a controller point. Controller tags are
/// heterogeneous (BOOL, DINT, REAL, STRING), so samples carry a small enum
/// rather than forcing everything through f64.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Bool(b) => write!(f, "{}", b),
            TagValue::Int(i) => write!(f, "{}", i),
            TagValue::Real(r) => write!(f, "{}", r),
            TagValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One collected row: a zero-based sequence index, the wall-clock timestamp
/// of the read, and one value per tag in the job's tag list (same order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub sequence_index: u64,
    pub timestamp: DateTime<Utc>,
    pub values: Vec<TagValue>,
}

/// A sample as exposed by the registry's live tap, tagged with its owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleEvent {
    pub job_id: Uuid,
    pub device_identifier: String,
    pub sample: Sample,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendState {
    Running,
    Completed,
    Stopped,
    Failed,
}

/// Parameters for starting a collection job. The address and tag list are
/// snapshotted here at start time; record-store edits never reach a running
/// job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendParams {
    pub device_identifier: String,
    pub description: String,
    pub address: String,
    pub tag_list: Vec<String>,
    pub cycle_count: u64,
    pub cycle_interval_ms: u64,
    pub buffer_threshold: usize,
}

impl TrendParams {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    /// The pair that prevents two concurrent runs against the same target
    /// for the same purpose.
    pub fn dedup_key(&self) -> (String, String) {
        (self.device_identifier.clone(), self.description.clone())
    }
}

/// Externally visible state of a job, active or terminal. Buffer contents
/// are never exposed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub device_identifier: String,
    pub description: String,
    pub state: TrendState,
    pub cycle_count: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure reason, present only when `state` is `failed`.
    pub failure: Option<String>,
    /// Log file path relative to the data directory.
    pub log_path: String,
}

/// Validate start parameters before any side effect.
pub fn validate_params(params: &TrendParams) -> Result<(), TrendError> {
    if params.device_identifier.trim().is_empty() {
        return Err(TrendError::Validation(
            "device_identifier cannot be empty".to_string(),
        ));
    }
    if params.description.trim().is_empty() {
        return Err(TrendError::Validation(
            "description cannot be empty".to_string(),
        ));
    }
    // Both strings become log path components.
    for (field, value) in [
        ("device_identifier", &params.device_identifier),
        ("description", &params.description),
    ] {
        if value.contains('/') || value.contains('\\') || value.contains("..") {
            return Err(TrendError::Validation(format!(
                "{} cannot contain path separators",
                field
            )));
        }
    }
    if params.address.trim().is_empty() {
        return Err(TrendError::Validation("address cannot be empty".to_string()));
    }
    if params.tag_list.is_empty() {
        return Err(TrendError::Validation(
            "tag_list cannot be empty".to_string(),
        ));
    }
    if params.tag_list.iter().any(|t| t.trim().is_empty()) {
        return Err(TrendError::Validation(
            "tag_list cannot contain empty tags".to_string(),
        ));
    }
    if params.cycle_count == 0 {
        return Err(TrendError::Validation(
            "cycle_count must be greater than 0".to_string(),
        ));
    }
    if params.buffer_threshold == 0 {
        return Err(TrendError::Validation(
            "buffer_threshold must be at least 1".to_string(),
        ));
    }
    Ok(())
}
