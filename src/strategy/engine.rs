//! Strategy application.
//!
//! The `StrategyEngine` takes a named strategy and a set of resolved
//! handles, then produces proposed changes. Proposals are not applied here;
//! the rules engine decides every proposal and the caller applies the
//! decided values to the graph.

use std::collections::HashSet;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::StrategyError;
use crate::model::{FieldValue, ObjectGraph};
use crate::registry::{ParameterDefinition, ParameterRegistry, FRACTION_SUM_EPSILON};
use crate::resolver::ParameterHandle;
use crate::strategy::catalog::StrategyCatalog;
use crate::strategy::types::{
    AssignValue, ChangeKind, ProposedChange, TransformSpec,
};

/// The strategy application engine.
///
/// Walks handles in resolution order; for each handle the first rule whose
/// target matches claims it, and each concrete field is proposed at most
/// once per run. With a fixed seed the proposal list is fully determined by
/// the handle order, which itself is determined by catalog and graph order.
pub struct StrategyEngine {
    catalog: StrategyCatalog,
}

impl StrategyEngine {
    /// Create a new engine over a validated catalog (typically
    /// `StrategyCatalog::builtin()` or `StrategyCatalog::load()`).
    pub fn new(catalog: StrategyCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &StrategyCatalog {
        &self.catalog
    }

    /// Apply one named strategy to a set of resolved handles.
    ///
    /// Numeric transforms skip handles whose current value is not numeric;
    /// those sites produce no proposal and no record. A ruleless strategy
    /// legitimately returns an empty list.
    pub fn apply<'a, R: Rng>(
        &self,
        strategy_name: &str,
        handles: &[ParameterHandle<'a>],
        graph: &ObjectGraph,
        registry: &'a ParameterRegistry,
        rng: &mut R,
    ) -> Result<Vec<ProposedChange<'a>>, StrategyError> {
        let strategy = self
            .catalog
            .get(strategy_name)
            .ok_or_else(|| StrategyError::UnknownStrategy(strategy_name.to_string()))?;

        let mut proposals: Vec<ProposedChange<'a>> = Vec::new();
        // Concrete fields already claimed this run, by uppercased
        // (type, name, field key).
        let mut claimed: HashSet<(String, String, String)> = HashSet::new();

        for handle in handles {
            if claimed.contains(&claim_key(handle)) {
                debug!(
                    object_name = handle.object_name.as_str(),
                    field = handle.field_key.as_str(),
                    "field already claimed this run, skipping"
                );
                continue;
            }

            let Some(rule) = strategy.rules.iter().find(|r| r.applies_to(handle)) else {
                continue;
            };

            match &rule.transform {
                TransformSpec::Multiply { factor, bounds } => {
                    let Some(current) = handle.current_numeric() else {
                        skip_non_numeric(handle);
                        continue;
                    };
                    let proposed = apply_bounds(current * factor.draw(rng), *bounds);
                    claimed.insert(claim_key(handle));
                    proposals.push(ProposedChange {
                        handle: handle.clone(),
                        proposed: FieldValue::Numeric(proposed),
                        kind: ChangeKind::Multiplicative,
                    });
                }
                TransformSpec::Offset { delta, bounds } => {
                    let Some(current) = handle.current_numeric() else {
                        skip_non_numeric(handle);
                        continue;
                    };
                    let proposed = apply_bounds(current + delta.draw(rng), *bounds);
                    claimed.insert(claim_key(handle));
                    proposals.push(ProposedChange {
                        handle: handle.clone(),
                        proposed: FieldValue::Numeric(proposed),
                        kind: ChangeKind::Additive,
                    });
                }
                TransformSpec::Assign { value } => {
                    let proposed = match value {
                        AssignValue::Fixed(v) => FieldValue::Numeric(*v),
                        AssignValue::Uniform([lo, hi]) => {
                            FieldValue::Numeric(rng.random_range(*lo..=*hi))
                        }
                        AssignValue::Text(s) => FieldValue::Text(s.clone()),
                    };
                    claimed.insert(claim_key(handle));
                    proposals.push(ProposedChange {
                        handle: handle.clone(),
                        proposed,
                        kind: ChangeKind::Absolute,
                    });
                }
                TransformSpec::RebalanceFractions { factor } => {
                    self.rebalance(handle, factor.draw(rng), graph, registry, &mut claimed, &mut proposals);
                }
            }
        }

        debug!(
            strategy = strategy_name,
            handles = handles.len(),
            proposals = proposals.len(),
            "strategy applied"
        );
        Ok(proposals)
    }

    /// Scale one fraction-group member and propose compensating rescales of
    /// its siblings when the new group sum would exceed 1.
    ///
    /// Sibling proposals come from the live graph, not from handles, so the
    /// group stays consistent even when the caller resolved only the target.
    fn rebalance<'a>(
        &self,
        handle: &ParameterHandle<'a>,
        factor: f64,
        graph: &ObjectGraph,
        registry: &'a ParameterRegistry,
        claimed: &mut HashSet<(String, String, String)>,
        proposals: &mut Vec<ProposedChange<'a>>,
    ) {
        let definition = handle.definition;
        let Some(group) = registry.group_for(&definition.object_type, &definition.field) else {
            warn!(
                parameter = definition.name.as_str(),
                "rebalance target is not in any fraction group, skipping"
            );
            return;
        };
        let Some(current) = handle.current_numeric() else {
            skip_non_numeric(handle);
            return;
        };
        let Some(object) = graph.object(&handle.object_type, &handle.object_name) else {
            warn!(
                object_type = handle.object_type.as_str(),
                object_name = handle.object_name.as_str(),
                "rebalance target instance not in graph, skipping"
            );
            return;
        };

        let new_target = current * factor;

        // Collect the siblings' concrete keys and numeric values. Fields
        // the instance does not carry (or holds as text) stay untouched.
        let mut siblings: Vec<(&'a ParameterDefinition, String, f64)> = Vec::new();
        for sibling_field in group.siblings_of(&definition.field) {
            let Some(sibling_def) = registry.find_by_field(&group.object_type, sibling_field)
            else {
                continue;
            };
            let Some(key) = sibling_def.locate(object) else {
                continue;
            };
            let Some(value) = object.field(key).and_then(FieldValue::as_numeric) else {
                continue;
            };
            siblings.push((sibling_def, key.to_string(), value));
        }

        let sibling_sum: f64 = siblings.iter().map(|(_, _, v)| v).sum();

        claimed.insert(claim_key(handle));
        proposals.push(ProposedChange {
            handle: handle.clone(),
            proposed: FieldValue::Numeric(new_target),
            kind: ChangeKind::Multiplicative,
        });

        if new_target + sibling_sum <= 1.0 + FRACTION_SUM_EPSILON || sibling_sum <= 0.0 {
            return;
        }

        // Shrink the siblings proportionally into the room the new target
        // leaves. A target at or above 1 leaves none.
        let scale = (1.0 - new_target).max(0.0) / sibling_sum;
        for (sibling_def, key, value) in siblings {
            let sibling_handle = ParameterHandle {
                definition: sibling_def,
                object_type: handle.object_type.clone(),
                object_name: handle.object_name.clone(),
                field_key: key,
                current: FieldValue::Numeric(value),
            };
            if !claimed.insert(claim_key(&sibling_handle)) {
                continue;
            }
            proposals.push(ProposedChange {
                handle: sibling_handle,
                proposed: FieldValue::Numeric(value * scale),
                kind: ChangeKind::Rebalance,
            });
        }
    }
}

fn claim_key(handle: &ParameterHandle<'_>) -> (String, String, String) {
    (
        handle.object_type.to_ascii_uppercase(),
        handle.object_name.to_ascii_uppercase(),
        handle.field_key.to_ascii_uppercase(),
    )
}

fn skip_non_numeric(handle: &ParameterHandle<'_>) {
    debug!(
        parameter = handle.definition.name.as_str(),
        object_name = handle.object_name.as_str(),
        current = %handle.current,
        "current value is not numeric, skipping"
    );
}

fn apply_bounds(value: f64, bounds: Option<[f64; 2]>) -> f64 {
    match bounds {
        Some([lo, hi]) => value.clamp(lo, hi),
        None => value,
    }
}
