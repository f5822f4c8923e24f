use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single field value inside a simulation-input object.
///
/// IDF field stores are loosely typed: numeric fields routinely arrive as
/// text (`"0.8"`) depending on which parser produced the graph, so numeric
/// extraction is lenient. Blank fields are common and meaningful (they fall
/// back to IDD defaults in the simulator), hence the explicit `Empty`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Numeric(f64),
    Text(String),
    Empty,
}

impl FieldValue {
    pub fn numeric(v: f64) -> Self {
        FieldValue::Numeric(v)
    }

    pub fn text(v: impl Into<String>) -> Self {
        FieldValue::Text(v.into())
    }

    /// Numeric content of this value, tolerating text-encoded numbers.
    /// Non-finite numbers are treated as absent.
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            FieldValue::Numeric(v) if v.is_finite() => Some(*v),
            FieldValue::Numeric(_) => None,
            FieldValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            FieldValue::Empty => None,
        }
    }

    /// Text content, if this value is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Empty)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Numeric(v) => write!(f, "{}", v),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Empty => Ok(()),
        }
    }
}

/// One simulation-input object instance: a named record of ordered fields.
///
/// Field order is preserved so positional access works for legacy object
/// stores that carry no field names. Field names and instance names are
/// matched case-insensitively everywhere, mirroring how the simulator treats
/// its input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdfObject {
    object_type: String,
    name: String,
    fields: IndexMap<String, FieldValue>,
}

impl IdfObject {
    pub fn new(object_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Build an instance from bare values, synthesizing positional field
    /// names (`Field 1`, `Field 2`, ...). This is how legacy stores without
    /// a field-name map enter the graph; such instances are only reachable
    /// through positional locators.
    pub fn from_values(
        object_type: impl Into<String>,
        name: impl Into<String>,
        values: Vec<FieldValue>,
    ) -> Self {
        let mut obj = Self::new(object_type, name);
        for (i, value) in values.into_iter().enumerate() {
            obj.fields.insert(format!("Field {}", i + 1), value);
        }
        obj
    }

    /// Builder-style field insertion for graph construction.
    pub fn with_field(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    // --- Accessors ---

    /// Look up a field by name, case-insensitively. Returns the stored key
    /// alongside the value so callers can address the field exactly.
    pub fn field_entry(&self, field: &str) -> Option<(&str, &FieldValue)> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(field))
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Field value by name, case-insensitive.
    pub fn field(&self, field: &str) -> Option<&FieldValue> {
        self.field_entry(field).map(|(_, v)| v)
    }

    /// Field key and value by zero-based position.
    pub fn field_at(&self, index: usize) -> Option<(&str, &FieldValue)> {
        self.fields
            .get_index(index)
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Lenient numeric read of a named field.
    pub fn numeric(&self, field: &str) -> Option<f64> {
        self.field(field).and_then(FieldValue::as_numeric)
    }

    pub fn field_keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    // --- Mutators ---

    /// Insert or replace a field, appending it if new.
    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        self.fields.insert(field.into(), value);
    }

    /// Overwrite an existing field, matched case-insensitively. Returns
    /// false if the instance has no such field.
    pub fn set_existing(&mut self, field: &str, value: FieldValue) -> bool {
        let idx = self
            .fields
            .keys()
            .position(|k| k.eq_ignore_ascii_case(field));
        match idx {
            Some(i) => {
                if let Some((_, slot)) = self.fields.get_index_mut(i) {
                    *slot = value;
                }
                true
            }
            None => false,
        }
    }
}
