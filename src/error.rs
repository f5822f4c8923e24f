//! Error types for the modification engine.
//!
//! Only catalog loading and tracker misuse are hard errors; everything the
//! engine expects to encounter in real models (unresolvable parameters,
//! unusable current values, out-of-range proposals) is represented as data
//! and recorded, not raised.

use thiserror::Error;

/// Fatal problems in a parameter catalog, raised at load time so an invalid
/// definition can never reach the resolver.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("parameter '{name}': min_value {min} is greater than max_value {max}")]
    InvertedBounds { name: String, min: f64, max: f64 },

    #[error("parameter '{name}': numeric bounds are only valid for float parameters")]
    BoundsOnNonNumeric { name: String },

    #[error("parameter '{name}': allowed_values are only valid for non-float parameters")]
    AllowedValuesOnNumeric { name: String },

    #[error("parameter '{name}': enum parameters must declare a non-empty allowed_values list")]
    MissingAllowedValues { name: String },

    #[error("parameter '{name}': no field name and no position fallback declared")]
    MissingLocator { name: String },

    #[error("duplicate parameter name '{name}'")]
    DuplicateParameter { name: String },

    #[error("dependency on {object_type}: field '{field}' cannot depend on itself")]
    SelfDependency { object_type: String, field: String },

    #[error("dependency on {object_type}: margin {margin} is negative")]
    NegativeMargin { object_type: String, margin: f64 },

    #[error("fraction group on {object_type} needs at least two fields, got {count}")]
    UndersizedFractionGroup { object_type: String, count: usize },

    #[error("fraction group on {object_type}: field '{field}' has no float parameter definition")]
    UnknownFractionField { object_type: String, field: String },

    #[error("failed to parse parameter catalog: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Fatal problems in a strategy catalog, raised at load time.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("no strategy named '{0}'")]
    UnknownStrategy(String),

    #[error("duplicate strategy name '{0}'")]
    DuplicateStrategy(String),

    #[error("strategy '{strategy}' rule {rule}: exactly one of parameter/field/field_contains must be set")]
    AmbiguousTarget { strategy: String, rule: usize },

    #[error("strategy '{strategy}' rule {rule}: range [{lo}, {hi}] is inverted")]
    InvertedRange {
        strategy: String,
        rule: usize,
        lo: f64,
        hi: f64,
    },

    #[error("failed to parse strategy catalog: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Addressing failures when applying values to an object graph. These
/// indicate inconsistent records or caller bugs, not bad model data: every
/// value the engine itself applies came from a handle resolved against the
/// same graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("no {object_type} object named '{name}'")]
    UnknownObject { object_type: String, name: String },

    #[error("{object_type} '{name}' has no field '{field}'")]
    UnknownField {
        object_type: String,
        name: String,
        field: String,
    },
}

/// Misuse of the modification tracker. All of these are orchestration bugs:
/// the tracker itself never produces them under the documented call order.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("variant '{variant}' opened while '{open}' is still open")]
    VariantAlreadyOpen { variant: String, open: String },

    #[error("no variant is open")]
    NoOpenVariant,

    #[error("record for building '{building}' variant '{variant}' does not match the open variant")]
    VariantMismatch { building: String, variant: String },

    #[error("duplicate record for {object_type} '{object_name}' field '{field}' in variant '{variant}'")]
    DuplicateRecord {
        variant: String,
        object_type: String,
        object_name: String,
        field: String,
    },

    #[error("export is not available while a variant is being applied")]
    ExportDuringVariant,
}
