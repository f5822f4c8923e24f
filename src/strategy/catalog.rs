//! Strategy catalog loading.
//!
//! Provides two loading methods:
//! - `StrategyCatalog::builtin()` - Loads the embedded strategies compiled into the binary
//! - `StrategyCatalog::load(path)` - Loads custom strategies from a file path
//!
//! Catalogs are validated on load: every rule must carry exactly one target
//! selector and every drawn range must be ordered, so the engine never has
//! to re-check a rule it is about to apply.

use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::error::StrategyError;
use crate::strategy::types::{Strategy, TransformSpec};

/// Default strategies embedded in the binary at compile time.
/// Loaded from `config/strategies.toml`.
const DEFAULT_STRATEGIES: &str = include_str!("../../config/strategies.toml");

#[derive(Debug, Default, Deserialize)]
struct StrategyFile {
    #[serde(default)]
    strategies: Vec<Strategy>,
}

/// Validated, name-indexed strategy catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyCatalog {
    strategies: IndexMap<String, Strategy>,
}

impl StrategyCatalog {
    /// The default strategies embedded in the binary.
    ///
    /// # Panics
    /// Panics if the embedded TOML is invalid (this would be a compile-time bug).
    pub fn builtin() -> Self {
        Self::from_toml_str(DEFAULT_STRATEGIES)
            .expect("embedded strategies.toml must be a valid catalog")
    }

    /// Load strategies from a TOML file at the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read strategy catalog {}", path.display()))?;
        let catalog = Self::from_toml_str(&content)
            .with_context(|| format!("invalid strategy catalog {}", path.display()))?;
        Ok(catalog)
    }

    /// Parse and validate strategies from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, StrategyError> {
        let file: StrategyFile = toml::from_str(content)?;
        Self::from_strategies(file.strategies)
    }

    pub fn from_strategies(strategies: Vec<Strategy>) -> Result<Self, StrategyError> {
        let mut indexed: IndexMap<String, Strategy> = IndexMap::with_capacity(strategies.len());

        for strategy in strategies {
            validate_strategy(&strategy)?;
            let name = strategy.name.clone();
            if indexed.insert(name.clone(), strategy).is_some() {
                return Err(StrategyError::DuplicateStrategy(name));
            }
        }

        debug!(strategies = indexed.len(), "strategy catalog loaded");
        Ok(Self { strategies: indexed })
    }

    pub fn get(&self, name: &str) -> Option<&Strategy> {
        self.strategies.get(name)
    }

    /// Strategy names in catalog order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }

    pub fn all(&self) -> impl Iterator<Item = &Strategy> {
        self.strategies.values()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

fn validate_strategy(strategy: &Strategy) -> Result<(), StrategyError> {
    for (idx, rule) in strategy.rules.iter().enumerate() {
        if rule.target.selector_count() != 1 {
            return Err(StrategyError::AmbiguousTarget {
                strategy: strategy.name.clone(),
                rule: idx,
            });
        }

        let mut check_range = |range: Option<(f64, f64)>| -> Result<(), StrategyError> {
            if let Some((lo, hi)) = range {
                if lo > hi {
                    return Err(StrategyError::InvertedRange {
                        strategy: strategy.name.clone(),
                        rule: idx,
                        lo,
                        hi,
                    });
                }
            }
            Ok(())
        };

        match &rule.transform {
            TransformSpec::Multiply { factor, bounds } => {
                check_range(factor.range())?;
                check_range(bounds.map(|[lo, hi]| (lo, hi)))?;
            }
            TransformSpec::Offset { delta, bounds } => {
                check_range(delta.range())?;
                check_range(bounds.map(|[lo, hi]| (lo, hi)))?;
            }
            TransformSpec::Assign { value } => {
                check_range(value.range())?;
            }
            TransformSpec::RebalanceFractions { factor } => {
                check_range(factor.range())?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_strategies_load() {
        let catalog = StrategyCatalog::builtin();
        assert!(!catalog.is_empty(), "Should have strategies");

        for expected in [
            "hvac_efficiency_boost",
            "lighting_retrofit",
            "plug_load_reduction",
            "infiltration_tightening",
            "envelope_upgrade",
            "ventilation_reset",
            "heat_gain_rebalance",
            "setpoint_optimization",
        ] {
            assert!(catalog.get(expected).is_some(), "Missing strategy {}", expected);
        }
    }

    #[test]
    fn test_ruleless_strategy_is_valid() {
        let catalog = StrategyCatalog::builtin();
        let setpoints = catalog.get("setpoint_optimization").unwrap();
        assert!(
            setpoints.rules.is_empty(),
            "setpoint_optimization deliberately proposes nothing"
        );
    }

    #[test]
    fn test_rejects_rule_with_two_selectors() {
        let toml = r#"
            [[strategies]]
            name = "bad"

            [[strategies.rules]]
            target = { parameter = "lighting_power_density", field_contains = "Watts" }
            transform = { kind = "multiply", factor = 0.8 }
        "#;
        let err = StrategyCatalog::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, StrategyError::AmbiguousTarget { rule: 0, .. }));
    }

    #[test]
    fn test_rejects_rule_with_no_selector() {
        let toml = r#"
            [[strategies]]
            name = "bad"

            [[strategies.rules]]
            target = {}
            transform = { kind = "multiply", factor = 0.8 }
        "#;
        let err = StrategyCatalog::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, StrategyError::AmbiguousTarget { .. }));
    }

    #[test]
    fn test_rejects_inverted_draw_range() {
        let toml = r#"
            [[strategies]]
            name = "bad"

            [[strategies.rules]]
            target = { parameter = "lighting_power_density" }
            transform = { kind = "multiply", factor = [1.4, 1.1] }
        "#;
        let err = StrategyCatalog::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, StrategyError::InvertedRange { .. }));
    }

    #[test]
    fn test_rejects_duplicate_strategy_names() {
        let toml = r#"
            [[strategies]]
            name = "twice"
            rules = []

            [[strategies]]
            name = "twice"
            rules = []
        "#;
        let err = StrategyCatalog::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, StrategyError::DuplicateStrategy(_)));
    }
}
