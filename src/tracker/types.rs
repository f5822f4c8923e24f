use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::FieldValue;
use crate::registry::ParameterCategory;
use crate::strategy::ChangeKind;
use crate::validation::ValidationStatus;

/// One audit-trail entry: a proposal and its decided outcome at one site.
///
/// Records are immutable once created. `sequence` is a logical timestamp
/// assigned by the tracker in record order; nothing in a record depends on
/// wall-clock time, so a seeded run serializes byte-identically every time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModificationRecord {
    pub sequence: u64,
    pub building_id: String,
    pub variant_id: String,
    pub category: ParameterCategory,
    pub strategy: String,
    pub object_type: String,
    pub object_name: String,
    pub field_name: String,
    pub original_value: FieldValue,
    pub proposed_value: FieldValue,
    /// Equals `original_value` when the proposal was rejected.
    pub accepted_value: FieldValue,
    pub units: Option<String>,
    pub change_type: ChangeKind,
    #[serde(rename = "validation_status")]
    pub status: ValidationStatus,
    pub reason: Option<String>,
    /// Percent change from original to accepted, absent when the original
    /// value is zero or not numeric.
    pub change_percentage: Option<f64>,
}

impl ModificationRecord {
    pub fn is_accepted(&self) -> bool {
        self.status != ValidationStatus::Rejected
    }
}

/// Aggregate view of one tracker's contents. Diagnostic only; the
/// timestamp here is the one place the engine touches the wall clock, and
/// summaries are never part of the exported record sequence.
#[derive(Debug, Clone, Serialize)]
pub struct TrackerSummary {
    pub records: usize,
    pub valid: usize,
    pub clamped: usize,
    pub rejected: usize,
    pub buildings: usize,
    pub variants: usize,
    pub generated_at: DateTime<Utc>,
}
