use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::IdfObject;

/// Subsystem a parameter belongs to. Resolution and strategy runs are scoped
/// by category, so these double as the selection vocabulary of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterCategory {
    Hvac,
    Envelope,
    Lighting,
    Equipment,
    Dhw,
    Ventilation,
    Infiltration,
}

impl ParameterCategory {
    pub const ALL: [ParameterCategory; 7] = [
        ParameterCategory::Hvac,
        ParameterCategory::Envelope,
        ParameterCategory::Lighting,
        ParameterCategory::Equipment,
        ParameterCategory::Dhw,
        ParameterCategory::Ventilation,
        ParameterCategory::Infiltration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterCategory::Hvac => "hvac",
            ParameterCategory::Envelope => "envelope",
            ParameterCategory::Lighting => "lighting",
            ParameterCategory::Equipment => "equipment",
            ParameterCategory::Dhw => "dhw",
            ParameterCategory::Ventilation => "ventilation",
            ParameterCategory::Infiltration => "infiltration",
        }
    }
}

impl fmt::Display for ParameterCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value discipline of a parameter. `Float` carries bounds, `Enum` carries an
/// allowed-value list, `String` is free text (typically a schedule reference).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    #[default]
    Float,
    String,
    Enum,
}

/// Precompiled field locator: the canonical field name and its declared
/// synonyms, uppercased once at catalog load so per-instance resolution is a
/// straight comparison. `position` is a zero-based fallback for legacy
/// object stores without field names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMatcher {
    names_upper: Vec<String>,
    position: Option<usize>,
}

impl FieldMatcher {
    pub fn compile(field: &str, synonyms: &[String], position: Option<usize>) -> Self {
        let mut names_upper = Vec::with_capacity(1 + synonyms.len());
        names_upper.push(field.to_ascii_uppercase());
        for s in synonyms {
            let up = s.to_ascii_uppercase();
            if !names_upper.contains(&up) {
                names_upper.push(up);
            }
        }
        Self { names_upper, position }
    }

    /// Find the field this matcher addresses on one instance, returning the
    /// field key exactly as the instance stores it. Name matches win over
    /// the positional fallback.
    pub fn resolve<'a>(&self, object: &'a IdfObject) -> Option<&'a str> {
        for (key, _) in object.fields() {
            let key_upper = key.to_ascii_uppercase();
            if self.names_upper.iter().any(|n| *n == key_upper) {
                return Some(key);
            }
        }
        self.position
            .and_then(|idx| object.field_at(idx))
            .map(|(key, _)| key)
    }
}

/// One catalog entry: a logical parameter name bound to a concrete field on
/// an object type, with its type discipline, bounds, and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    pub category: ParameterCategory,
    pub object_type: String,
    pub field: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub position: Option<usize>,
    #[serde(default)]
    pub kind: ParameterKind,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub max_value: Option<f64>,
    #[serde(default)]
    pub allowed_values: Vec<String>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub performance_impact: Vec<String>,
    #[serde(skip)]
    pub(crate) matcher: FieldMatcher,
}

impl ParameterDefinition {
    /// Both bounds, when the definition declares a full range.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match (self.min_value, self.max_value) {
            (Some(lo), Some(hi)) => Some((lo, hi)),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.kind == ParameterKind::Float
    }

    /// Whether `value` names a member of the allowed-value list,
    /// case-insensitively.
    pub fn allows(&self, value: &str) -> bool {
        self.allowed_values
            .iter()
            .any(|v| v.eq_ignore_ascii_case(value))
    }

    /// Locate this parameter's field on one instance.
    pub fn locate<'a>(&self, object: &'a IdfObject) -> Option<&'a str> {
        self.matcher.resolve(object)
    }
}

/// Tolerance on fraction-group sums. Sums up to `1.0 + FRACTION_SUM_EPSILON`
/// pass, absorbing float noise from repeated rescaling.
pub const FRACTION_SUM_EPSILON: f64 = 1e-6;

/// A set of sibling fields on one object type whose values must sum to at
/// most 1. The rules engine checks the live sum after every substitution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FractionGroup {
    pub object_type: String,
    pub fields: Vec<String>,
}

impl FractionGroup {
    pub fn contains_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f.eq_ignore_ascii_case(field))
    }

    /// The other members of the group, excluding `field`.
    pub fn siblings_of<'a>(&'a self, field: &str) -> impl Iterator<Item = &'a str> {
        let field = field.to_ascii_uppercase();
        self.fields
            .iter()
            .map(String::as_str)
            .filter(move |f| f.to_ascii_uppercase() != field)
    }
}

/// An ordering constraint between two numeric fields of the same instance:
/// `field` must stay at least `margin` above `must_exceed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRule {
    pub object_type: String,
    pub field: String,
    pub must_exceed: String,
    #[serde(default)]
    pub margin: f64,
}

impl DependencyRule {
    /// Whether this rule constrains `field` on `object_type`, from either
    /// side of the inequality.
    pub fn touches(&self, object_type: &str, field: &str) -> bool {
        self.object_type.eq_ignore_ascii_case(object_type)
            && (self.field.eq_ignore_ascii_case(field)
                || self.must_exceed.eq_ignore_ascii_case(field))
    }
}
