use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::FieldValue;
use crate::resolver::ParameterHandle;

/// How a proposal relates to the value it replaces. Carried into the
/// modification record so an exported run distinguishes scaled, shifted,
/// assigned, and rebalanced changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Multiplicative,
    Additive,
    Absolute,
    Rebalance,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Multiplicative => "multiplicative",
            ChangeKind::Additive => "additive",
            ChangeKind::Absolute => "absolute",
            ChangeKind::Rebalance => "rebalance",
        };
        f.write_str(s)
    }
}

/// A strategy's output: one proposed substitution at one resolved site.
/// Proposals are inert until the rules engine decides them.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedChange<'a> {
    pub handle: ParameterHandle<'a>,
    pub proposed: FieldValue,
    pub kind: ChangeKind,
}

/// A scalar that is either fixed or drawn uniformly from an inclusive
/// range. Ranges are written `[lo, hi]` in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueDraw {
    Fixed(f64),
    Uniform([f64; 2]),
}

impl ValueDraw {
    /// Produce the scalar, consuming RNG state only for ranged draws.
    pub fn draw<R: Rng>(&self, rng: &mut R) -> f64 {
        match self {
            ValueDraw::Fixed(v) => *v,
            ValueDraw::Uniform([lo, hi]) => rng.random_range(*lo..=*hi),
        }
    }

    /// The uniform range, if this draw has one.
    pub fn range(&self) -> Option<(f64, f64)> {
        match self {
            ValueDraw::Fixed(_) => None,
            ValueDraw::Uniform([lo, hi]) => Some((*lo, *hi)),
        }
    }
}

/// An assignment payload: numeric (fixed or drawn) or literal text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssignValue {
    Fixed(f64),
    Uniform([f64; 2]),
    Text(String),
}

impl AssignValue {
    pub fn range(&self) -> Option<(f64, f64)> {
        match self {
            AssignValue::Uniform([lo, hi]) => Some((*lo, *hi)),
            _ => None,
        }
    }
}

/// What a rule selects. Exactly one selector must be set: a registry
/// parameter name, an exact canonical field name, or a case-insensitive
/// substring of the canonical field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    #[serde(default)]
    pub parameter: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub field_contains: Option<String>,
}

impl TargetSpec {
    pub fn selector_count(&self) -> usize {
        [
            self.parameter.is_some(),
            self.field.is_some(),
            self.field_contains.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    /// Whether this target selects `handle`. Field selectors compare
    /// against the definition's canonical field name, so a site resolved
    /// through a synonym still matches.
    pub fn matches(&self, handle: &ParameterHandle<'_>) -> bool {
        if let Some(name) = &self.parameter {
            return handle.definition.name == *name;
        }
        if let Some(field) = &self.field {
            return handle.definition.field.eq_ignore_ascii_case(field);
        }
        if let Some(needle) = &self.field_contains {
            return handle
                .definition
                .field
                .to_ascii_uppercase()
                .contains(&needle.to_ascii_uppercase());
        }
        false
    }
}

/// The substitution a rule performs on a matched site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformSpec {
    /// Scale the current value by a drawn factor.
    Multiply {
        factor: ValueDraw,
        #[serde(default)]
        bounds: Option<[f64; 2]>,
    },
    /// Shift the current value by a drawn delta.
    Offset {
        delta: ValueDraw,
        #[serde(default)]
        bounds: Option<[f64; 2]>,
    },
    /// Replace the current value outright.
    Assign { value: AssignValue },
    /// Scale one fraction-group member and rescale its siblings so the
    /// group sum stays legal.
    RebalanceFractions { factor: ValueDraw },
}

/// One named mutation strategy: an ordered rule list. The first rule whose
/// target matches a handle claims it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rules: Vec<StrategyRule>,
}

/// One rule: an optional object-type scope, a target, and a transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRule {
    #[serde(default)]
    pub object_type: Option<String>,
    pub target: TargetSpec,
    pub transform: TransformSpec,
}

impl StrategyRule {
    /// Whether this rule claims `handle`: the object-type scope (if any)
    /// and the target both have to agree.
    pub fn applies_to(&self, handle: &ParameterHandle<'_>) -> bool {
        if let Some(scope) = &self.object_type {
            if !handle.definition.object_type.eq_ignore_ascii_case(scope) {
                return false;
            }
        }
        self.target.matches(handle)
    }
}
