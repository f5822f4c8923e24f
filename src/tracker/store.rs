use std::collections::HashSet;

use chrono::Utc;
use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::TrackerError;
use crate::model::FieldValue;
use crate::registry::ParameterCategory;
use crate::strategy::ProposedChange;
use crate::tracker::types::{ModificationRecord, TrackerSummary};
use crate::validation::{Decision, ValidationStatus};

/// Append-only store of modification records for one run.
///
/// Records accumulate across variants; a variant is opened with
/// `begin_variant`, filled with `record` calls, and closed with
/// `finish_variant`. Export and the derived views are refused while a
/// variant is open, so no partial variant is ever externally visible.
#[derive(Debug, Default)]
pub struct ModificationTracker {
    records: Vec<ModificationRecord>,
    seen: HashSet<(String, String, String, String, String)>,
    open_variant: Option<(String, String)>,
    sequence: u64,
}

impl ModificationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a variant for recording. Exactly one variant may be open at a
    /// time; nesting is an orchestration bug.
    pub fn begin_variant(&mut self, building_id: &str, variant_id: &str) -> Result<(), TrackerError> {
        if let Some((_, open)) = &self.open_variant {
            return Err(TrackerError::VariantAlreadyOpen {
                variant: variant_id.to_string(),
                open: open.clone(),
            });
        }
        info!(building_id, variant_id, "variant opened");
        self.open_variant = Some((building_id.to_string(), variant_id.to_string()));
        Ok(())
    }

    /// Close the open variant, making its records exportable.
    pub fn finish_variant(&mut self) -> Result<(), TrackerError> {
        match self.open_variant.take() {
            Some((building_id, variant_id)) => {
                info!(
                    building_id = building_id.as_str(),
                    variant_id = variant_id.as_str(),
                    records = self.records.len(),
                    "variant closed"
                );
                Ok(())
            }
            None => Err(TrackerError::NoOpenVariant),
        }
    }

    /// Append one record for a decided proposal. Returns the record's
    /// logical sequence number.
    ///
    /// The ids must match the open variant, and a concrete field may be
    /// recorded at most once per variant; violations are caller bugs and
    /// abort the run rather than corrupting the trail.
    pub fn record(
        &mut self,
        building_id: &str,
        variant_id: &str,
        category: ParameterCategory,
        strategy: &str,
        change: &ProposedChange<'_>,
        decision: &Decision,
    ) -> Result<u64, TrackerError> {
        match &self.open_variant {
            Some((open_building, open_variant))
                if open_building == building_id && open_variant == variant_id => {}
            Some(_) => {
                return Err(TrackerError::VariantMismatch {
                    building: building_id.to_string(),
                    variant: variant_id.to_string(),
                })
            }
            None => return Err(TrackerError::NoOpenVariant),
        }

        let key = (
            building_id.to_string(),
            variant_id.to_string(),
            change.handle.object_type.to_ascii_uppercase(),
            change.handle.object_name.to_ascii_uppercase(),
            change.handle.field_key.to_ascii_uppercase(),
        );
        if !self.seen.insert(key) {
            return Err(TrackerError::DuplicateRecord {
                variant: variant_id.to_string(),
                object_type: change.handle.object_type.clone(),
                object_name: change.handle.object_name.clone(),
                field: change.handle.field_key.clone(),
            });
        }

        self.sequence += 1;
        let original = change.handle.current.clone();
        let accepted = decision
            .value()
            .cloned()
            .unwrap_or_else(|| original.clone());
        let record = ModificationRecord {
            sequence: self.sequence,
            building_id: building_id.to_string(),
            variant_id: variant_id.to_string(),
            category,
            strategy: strategy.to_string(),
            object_type: change.handle.object_type.clone(),
            object_name: change.handle.object_name.clone(),
            field_name: change.handle.field_key.clone(),
            change_percentage: percent_change(&original, &accepted),
            original_value: original,
            proposed_value: change.proposed.clone(),
            accepted_value: accepted,
            units: change.handle.definition.units.clone(),
            change_type: change.kind,
            status: decision.status(),
            reason: decision.reason().map(String::from),
        };

        debug!(
            sequence = record.sequence,
            object_name = record.object_name.as_str(),
            field = record.field_name.as_str(),
            status = %record.status,
            "recorded"
        );
        self.records.push(record);
        Ok(self.sequence)
    }

    /// The full record sequence. Idempotent: repeated calls return the same
    /// records until the next `record` call. Refused while a variant is
    /// open.
    pub fn export(&self) -> Result<&[ModificationRecord], TrackerError> {
        if self.open_variant.is_some() {
            return Err(TrackerError::ExportDuringVariant);
        }
        Ok(&self.records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Long view: one row per record, with exactly the export schema's
    /// columns. A pure projection of `export()`.
    pub fn long_view(&self) -> Result<Vec<Map<String, Value>>, TrackerError> {
        let records = self.export()?;
        Ok(records.iter().map(long_row).collect())
    }

    /// Wide view: one row per (building, variant) pair, one column per
    /// distinct `category:field` pair seen across the whole run, cells
    /// holding accepted values. Variants that never touched a column get a
    /// null cell; a column touched twice in one variant (two instances of
    /// one object type) keeps the later record's value.
    pub fn wide_view(&self) -> Result<Vec<Map<String, Value>>, TrackerError> {
        let records = self.export()?;

        let mut columns: IndexSet<String> = IndexSet::new();
        for record in records {
            columns.insert(column_key(record));
        }

        let mut cells: IndexMap<(String, String), IndexMap<String, Value>> = IndexMap::new();
        for record in records {
            cells
                .entry((record.building_id.clone(), record.variant_id.clone()))
                .or_default()
                .insert(column_key(record), value_json(&record.accepted_value));
        }

        let mut rows = Vec::with_capacity(cells.len());
        for ((building_id, variant_id), row_cells) in cells {
            let mut row = Map::new();
            row.insert("building_id".to_string(), Value::String(building_id));
            row.insert("variant_id".to_string(), Value::String(variant_id));
            for column in &columns {
                let cell = row_cells.get(column).cloned().unwrap_or(Value::Null);
                row.insert(column.clone(), cell);
            }
            rows.push(row);
        }
        Ok(rows)
    }

    /// Aggregate counts over everything recorded so far.
    pub fn summary(&self) -> TrackerSummary {
        let mut valid = 0;
        let mut clamped = 0;
        let mut rejected = 0;
        let mut buildings: HashSet<&str> = HashSet::new();
        let mut variants: HashSet<(&str, &str)> = HashSet::new();
        for record in &self.records {
            match record.status {
                ValidationStatus::Valid => valid += 1,
                ValidationStatus::Clamped => clamped += 1,
                ValidationStatus::Rejected => rejected += 1,
            }
            buildings.insert(&record.building_id);
            variants.insert((&record.building_id, &record.variant_id));
        }
        TrackerSummary {
            records: self.records.len(),
            valid,
            clamped,
            rejected,
            buildings: buildings.len(),
            variants: variants.len(),
            generated_at: Utc::now(),
        }
    }
}

fn column_key(record: &ModificationRecord) -> String {
    format!("{}:{}", record.category, record.field_name)
}

fn long_row(record: &ModificationRecord) -> Map<String, Value> {
    let mut row = Map::new();
    row.insert("building_id".to_string(), Value::String(record.building_id.clone()));
    row.insert("variant_id".to_string(), Value::String(record.variant_id.clone()));
    row.insert("category".to_string(), Value::String(record.category.to_string()));
    row.insert("object_type".to_string(), Value::String(record.object_type.clone()));
    row.insert("object_name".to_string(), Value::String(record.object_name.clone()));
    row.insert("field_name".to_string(), Value::String(record.field_name.clone()));
    row.insert("original_value".to_string(), value_json(&record.original_value));
    row.insert("proposed_value".to_string(), value_json(&record.proposed_value));
    row.insert("accepted_value".to_string(), value_json(&record.accepted_value));
    row.insert(
        "units".to_string(),
        record.units.clone().map(Value::String).unwrap_or(Value::Null),
    );
    row.insert(
        "validation_status".to_string(),
        Value::String(record.status.to_string()),
    );
    row.insert(
        "reason".to_string(),
        record.reason.clone().map(Value::String).unwrap_or(Value::Null),
    );
    row.insert(
        "change_type".to_string(),
        Value::String(record.change_type.to_string()),
    );
    row.insert(
        "change_percentage".to_string(),
        record
            .change_percentage
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
    );
    row
}

fn value_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Numeric(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        FieldValue::Text(s) => Value::String(s.clone()),
        FieldValue::Empty => Value::Null,
    }
}

fn percent_change(original: &FieldValue, accepted: &FieldValue) -> Option<f64> {
    let original = original.as_numeric()?;
    let accepted = accepted.as_numeric()?;
    if original == 0.0 {
        return None;
    }
    Some((accepted - original) / original * 100.0)
}
