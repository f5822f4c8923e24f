//! Proposal validation.
//!
//! The `RuleEngine` checks each proposed change against the registry's
//! constraints and the live object graph, then returns a decision: accept,
//! clamp to the nearest legal value, or reject. It never mutates the graph;
//! callers apply accepted values.
//!
//! Rule classes run in a fixed order: type and range, intra-object
//! dependency, cross-object reference, fraction-group sum. The first rule
//! that alters or rejects the proposal fixes the outcome; remaining rules
//! still evaluate the adjusted value and log further complaints. The one
//! escalation is the group-sum rule, which rejects outright when even the
//! adjusted value would push its fraction group past 1, since that sum is a
//! hard invariant of the output.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{FieldValue, IdfObject, ObjectGraph};
use crate::registry::{
    ParameterKind, ParameterRegistry, FRACTION_SUM_EPSILON,
};
use crate::strategy::ProposedChange;

/// Outcome class of a validation decision, as recorded and exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Valid,
    Clamped,
    Rejected,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationStatus::Valid => "valid",
            ValidationStatus::Clamped => "clamped",
            ValidationStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// A decided proposal. `Accept` and `Clamp` carry the value to apply;
/// `Reject` means the original value stands.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Accept(FieldValue),
    Clamp { value: FieldValue, reason: String },
    Reject { reason: String },
}

impl Decision {
    pub fn status(&self) -> ValidationStatus {
        match self {
            Decision::Accept(_) => ValidationStatus::Valid,
            Decision::Clamp { .. } => ValidationStatus::Clamped,
            Decision::Reject { .. } => ValidationStatus::Rejected,
        }
    }

    /// The value to write into the graph, absent for rejections.
    pub fn value(&self) -> Option<&FieldValue> {
        match self {
            Decision::Accept(v) => Some(v),
            Decision::Clamp { value, .. } => Some(value),
            Decision::Reject { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Accept(_) => None,
            Decision::Clamp { reason, .. } | Decision::Reject { reason } => Some(reason),
        }
    }
}

/// The validation rules engine. Stateless between calls; every decision is
/// a pure function of the proposal, the registry, and the graph snapshot it
/// is given.
pub struct RuleEngine<'r> {
    registry: &'r ParameterRegistry,
}

impl<'r> RuleEngine<'r> {
    pub fn new(registry: &'r ParameterRegistry) -> Self {
        Self { registry }
    }

    /// Decide one proposed change against the live graph.
    pub fn validate(&self, change: &ProposedChange<'_>, graph: &ObjectGraph) -> Decision {
        let definition = change.handle.definition;

        match definition.kind {
            ParameterKind::Float => self.validate_numeric(change, graph),
            ParameterKind::String => self.validate_text(change, graph, false),
            ParameterKind::Enum => self.validate_text(change, graph, true),
        }
    }

    fn validate_numeric(&self, change: &ProposedChange<'_>, graph: &ObjectGraph) -> Decision {
        let definition = change.handle.definition;

        // Rule 1: type and range. Rejection is reserved for values that are
        // not numbers at all; out-of-range numbers clamp to the near bound.
        let Some(proposed) = change.proposed.as_numeric() else {
            return Decision::Reject {
                reason: format!(
                    "type: expected a numeric value for '{}', got '{}'",
                    definition.name, change.proposed
                ),
            };
        };

        let mut candidate = proposed;
        let mut clamp_reason: Option<String> = None;

        if let Some(lo) = definition.min_value {
            if candidate < lo {
                clamp_reason = Some(format!("range: {} below minimum {}", candidate, lo));
                candidate = lo;
            }
        }
        if let Some(hi) = definition.max_value {
            if candidate > hi {
                clamp_reason = Some(format!("range: {} above maximum {}", candidate, hi));
                candidate = hi;
            }
        }

        // Rule 2: intra-object dependency. A violation clamps the value
        // being validated toward the nearest value restoring the invariant,
        // read against the other field's live value. If an earlier rule
        // already altered the proposal, the violation is only logged.
        let object = graph.object(&change.handle.object_type, &change.handle.object_name);
        if let Some(object) = object {
            for dep in self.registry.dependencies_for(&definition.object_type) {
                let (floor, ceiling) =
                    if dep.field.eq_ignore_ascii_case(&definition.field) {
                        // This field must exceed the other by the margin.
                        let other = self.live_numeric(object, &definition.object_type, &dep.must_exceed);
                        (other.map(|v| v + dep.margin), None)
                    } else if dep.must_exceed.eq_ignore_ascii_case(&definition.field) {
                        // The other field must exceed this one.
                        let other = self.live_numeric(object, &definition.object_type, &dep.field);
                        (None, other.map(|v| v - dep.margin))
                    } else {
                        continue;
                    };

                if let Some(floor) = floor {
                    if candidate < floor {
                        let reason = format!(
                            "dependency: raised to {} to stay {} above {}",
                            floor, dep.margin, dep.must_exceed
                        );
                        if clamp_reason.is_none() {
                            candidate = floor;
                            clamp_reason = Some(reason);
                        } else {
                            warn!(
                                parameter = definition.name.as_str(),
                                object_name = change.handle.object_name.as_str(),
                                "dependency still violated after earlier clamp: {}", reason
                            );
                        }
                    }
                }
                if let Some(ceiling) = ceiling {
                    if candidate > ceiling {
                        let reason = format!(
                            "dependency: lowered to {} to stay {} below {}",
                            ceiling, dep.margin, dep.field
                        );
                        if clamp_reason.is_none() {
                            candidate = ceiling;
                            clamp_reason = Some(reason);
                        } else {
                            warn!(
                                parameter = definition.name.as_str(),
                                object_name = change.handle.object_name.as_str(),
                                "dependency still violated after earlier clamp: {}", reason
                            );
                        }
                    }
                }
            }

            // Rule 4: fraction-group sum. The strategy engine rebalances
            // groups before proposing, so a violation here means no legal
            // rescale existed; the proposal is refused rather than applied.
            if let Some(group) = self
                .registry
                .group_for(&definition.object_type, &definition.field)
            {
                let mut sum = candidate;
                for group_field in &group.fields {
                    let member = self
                        .registry
                        .find_by_field(&group.object_type, group_field);
                    let Some(member) = member else { continue };
                    if member.name == definition.name {
                        continue;
                    }
                    if let Some(value) = member
                        .locate(object)
                        .and_then(|key| object.field(key))
                        .and_then(FieldValue::as_numeric)
                    {
                        sum += value;
                    }
                }
                if sum > 1.0 + FRACTION_SUM_EPSILON {
                    return Decision::Reject {
                        reason: format!(
                            "fraction_sum: group sum {:.6} on {} '{}' exceeds 1",
                            sum, definition.object_type, change.handle.object_name
                        ),
                    };
                }
            }
        } else {
            debug!(
                object_type = change.handle.object_type.as_str(),
                object_name = change.handle.object_name.as_str(),
                "instance not found in graph, dependency and group rules skipped"
            );
        }

        match clamp_reason {
            Some(reason) => Decision::Clamp {
                value: FieldValue::Numeric(candidate),
                reason,
            },
            None => Decision::Accept(FieldValue::Numeric(candidate)),
        }
    }

    fn validate_text(
        &self,
        change: &ProposedChange<'_>,
        graph: &ObjectGraph,
        enumerated: bool,
    ) -> Decision {
        let definition = change.handle.definition;

        // Rule 1: type. Text parameters take text; anything else is a
        // caller mixing up parameter kinds.
        let Some(proposed) = change.proposed.as_text() else {
            return Decision::Reject {
                reason: format!(
                    "type: expected a text value for '{}', got '{}'",
                    definition.name, change.proposed
                ),
            };
        };

        if enumerated && !definition.allows(proposed) {
            return Decision::Reject {
                reason: format!(
                    "type: '{}' is not an allowed value for '{}'",
                    proposed, definition.name
                ),
            };
        }

        // Rule 3: cross-object reference integrity. A reference field must
        // name an object that exists under one of the declared types.
        if !definition.references.is_empty() {
            let exists = definition
                .references
                .iter()
                .any(|object_type| graph.contains_object(object_type, proposed));
            if !exists {
                return Decision::Reject {
                    reason: format!(
                        "reference: no {} object named '{}'",
                        definition.references.join(" or "),
                        proposed
                    ),
                };
            }
        }

        Decision::Accept(FieldValue::text(proposed))
    }

    /// Numeric value of a named field on a live instance, located directly
    /// or through the registry's matcher for that field.
    fn live_numeric(&self, object: &IdfObject, object_type: &str, field: &str) -> Option<f64> {
        if let Some(v) = object.field(field).and_then(FieldValue::as_numeric) {
            return Some(v);
        }
        self.registry
            .find_by_field(object_type, field)
            .and_then(|d| d.locate(object))
            .and_then(|key| object.field(key))
            .and_then(FieldValue::as_numeric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IdfObject;
    use crate::registry::ParameterRegistry;
    use crate::resolver::ParameterHandle;
    use crate::strategy::ChangeKind;

    fn change<'a>(
        registry: &'a ParameterRegistry,
        parameter: &str,
        object_type: &str,
        object_name: &str,
        field_key: &str,
        current: FieldValue,
        proposed: FieldValue,
    ) -> ProposedChange<'a> {
        let definition = registry.get(parameter).expect("parameter should exist");
        ProposedChange {
            handle: ParameterHandle {
                definition,
                object_type: object_type.to_string(),
                object_name: object_name.to_string(),
                field_key: field_key.to_string(),
                current,
            },
            proposed,
            kind: ChangeKind::Multiplicative,
        }
    }

    fn water_heater_graph() -> ObjectGraph {
        let mut graph = ObjectGraph::new();
        graph.insert(
            IdfObject::new("WaterHeater:Mixed", "SWHSys1 Water Heater")
                .with_field("Heater Thermal Efficiency", FieldValue::numeric(0.8)),
        );
        graph
    }

    #[test]
    fn test_accepts_in_range_value() {
        let registry = ParameterRegistry::builtin();
        let graph = water_heater_graph();
        let engine = RuleEngine::new(&registry);

        let change = change(
            &registry,
            "water_heater_efficiency",
            "WaterHeater:Mixed",
            "SWHSys1 Water Heater",
            "Heater Thermal Efficiency",
            FieldValue::numeric(0.8),
            FieldValue::numeric(0.88),
        );
        let decision = engine.validate(&change, &graph);

        assert_eq!(decision, Decision::Accept(FieldValue::numeric(0.88)));
        assert_eq!(decision.status(), ValidationStatus::Valid);
    }

    #[test]
    fn test_clamps_above_maximum() {
        let registry = ParameterRegistry::builtin();
        let graph = water_heater_graph();
        let engine = RuleEngine::new(&registry);

        // 0.80 * 1.3 proposes 1.04 against bounds [0.5, 0.99].
        let change = change(
            &registry,
            "water_heater_efficiency",
            "WaterHeater:Mixed",
            "SWHSys1 Water Heater",
            "Heater Thermal Efficiency",
            FieldValue::numeric(0.8),
            FieldValue::numeric(1.04),
        );
        let decision = engine.validate(&change, &graph);

        assert_eq!(decision.status(), ValidationStatus::Clamped);
        assert_eq!(decision.value(), Some(&FieldValue::numeric(0.99)));
        assert!(
            decision.reason().unwrap().starts_with("range:"),
            "Reason should name the range rule, got {:?}",
            decision.reason()
        );
    }

    #[test]
    fn test_clamps_below_minimum() {
        let registry = ParameterRegistry::builtin();
        let graph = water_heater_graph();
        let engine = RuleEngine::new(&registry);

        let change = change(
            &registry,
            "water_heater_efficiency",
            "WaterHeater:Mixed",
            "SWHSys1 Water Heater",
            "Heater Thermal Efficiency",
            FieldValue::numeric(0.8),
            FieldValue::numeric(0.2),
        );
        let decision = engine.validate(&change, &graph);

        assert_eq!(decision.status(), ValidationStatus::Clamped);
        assert_eq!(decision.value(), Some(&FieldValue::numeric(0.5)));
    }

    #[test]
    fn test_rejects_non_numeric_proposal() {
        let registry = ParameterRegistry::builtin();
        let graph = water_heater_graph();
        let engine = RuleEngine::new(&registry);

        let change = change(
            &registry,
            "water_heater_efficiency",
            "WaterHeater:Mixed",
            "SWHSys1 Water Heater",
            "Heater Thermal Efficiency",
            FieldValue::numeric(0.8),
            FieldValue::text("autosize"),
        );
        let decision = engine.validate(&change, &graph);

        assert_eq!(decision.status(), ValidationStatus::Rejected);
        assert_eq!(decision.value(), None, "Rejected proposals carry no value");
        assert!(decision.reason().unwrap().starts_with("type:"));
    }

    #[test]
    fn test_rejects_non_finite_proposal() {
        let registry = ParameterRegistry::builtin();
        let graph = water_heater_graph();
        let engine = RuleEngine::new(&registry);

        let change = change(
            &registry,
            "water_heater_efficiency",
            "WaterHeater:Mixed",
            "SWHSys1 Water Heater",
            "Heater Thermal Efficiency",
            FieldValue::numeric(0.8),
            FieldValue::Numeric(f64::NAN),
        );
        let decision = engine.validate(&change, &graph);
        assert_eq!(decision.status(), ValidationStatus::Rejected);
    }

    #[test]
    fn test_enum_membership_is_case_insensitive() {
        let registry = ParameterRegistry::builtin();
        let mut graph = ObjectGraph::new();
        graph.insert(IdfObject::new("ZoneInfiltration:DesignFlowRate", "Infil").with_field(
            "Design Flow Rate Calculation Method",
            FieldValue::text("Flow/Zone"),
        ));
        let engine = RuleEngine::new(&registry);

        let accepted = change(
            &registry,
            "infiltration_calc_method",
            "ZoneInfiltration:DesignFlowRate",
            "Infil",
            "Design Flow Rate Calculation Method",
            FieldValue::text("Flow/Zone"),
            FieldValue::text("airchanges/hour"),
        );
        assert_eq!(
            engine.validate(&accepted, &graph).status(),
            ValidationStatus::Valid
        );

        let rejected = change(
            &registry,
            "infiltration_calc_method",
            "ZoneInfiltration:DesignFlowRate",
            "Infil",
            "Design Flow Rate Calculation Method",
            FieldValue::text("Flow/Zone"),
            FieldValue::text("Flow/Unknown"),
        );
        let decision = engine.validate(&rejected, &graph);
        assert_eq!(decision.status(), ValidationStatus::Rejected);
        assert!(decision.reason().unwrap().starts_with("type:"));
    }

    #[test]
    fn test_dependency_raises_heating_limit_above_cooling() {
        let registry = ParameterRegistry::builtin();
        let mut graph = ObjectGraph::new();
        graph.insert(
            IdfObject::new("ZoneHVAC:IdealLoadsAirSystem", "Zone1 Ideal Loads")
                .with_field("Maximum Heating Supply Air Temperature", FieldValue::numeric(50.0))
                .with_field("Minimum Cooling Supply Air Temperature", FieldValue::numeric(13.0)),
        );
        let engine = RuleEngine::new(&registry);

        // 31 passes the [30, 60] range and clears cooling + margin = 15.
        let change = change(
            &registry,
            "heating_supply_air_temp",
            "ZoneHVAC:IdealLoadsAirSystem",
            "Zone1 Ideal Loads",
            "Maximum Heating Supply Air Temperature",
            FieldValue::numeric(50.0),
            FieldValue::numeric(31.0),
        );
        let decision = engine.validate(&change, &graph);

        assert_eq!(decision.status(), ValidationStatus::Valid, "31 clears 13 + 2");

        // Same proposal against a graph whose cooling limit sits at 30:
        // 31 is inside the range but under cooling + margin = 32.
        let mut graph2 = ObjectGraph::new();
        graph2.insert(
            IdfObject::new("ZoneHVAC:IdealLoadsAirSystem", "Zone1 Ideal Loads")
                .with_field("Maximum Heating Supply Air Temperature", FieldValue::numeric(50.0))
                .with_field("Minimum Cooling Supply Air Temperature", FieldValue::numeric(30.0)),
        );
        let violating = engine.validate(&change, &graph2);
        assert_eq!(violating.status(), ValidationStatus::Clamped);
        assert_eq!(
            violating.value(),
            Some(&FieldValue::numeric(32.0)),
            "Should raise to cooling limit plus margin"
        );
        assert!(violating.reason().unwrap().starts_with("dependency:"));
    }

    #[test]
    fn test_dependency_lowers_cooling_limit_below_heating() {
        let registry = ParameterRegistry::builtin();
        let mut graph = ObjectGraph::new();
        graph.insert(
            IdfObject::new("ZoneHVAC:IdealLoadsAirSystem", "Zone1 Ideal Loads")
                .with_field("Maximum Heating Supply Air Temperature", FieldValue::numeric(18.0))
                .with_field("Minimum Cooling Supply Air Temperature", FieldValue::numeric(13.0)),
        );
        let engine = RuleEngine::new(&registry);

        let change = change(
            &registry,
            "cooling_supply_air_temp",
            "ZoneHVAC:IdealLoadsAirSystem",
            "Zone1 Ideal Loads",
            "Minimum Cooling Supply Air Temperature",
            FieldValue::numeric(13.0),
            FieldValue::numeric(17.0),
        );
        let decision = engine.validate(&change, &graph);

        assert_eq!(decision.status(), ValidationStatus::Clamped);
        assert_eq!(
            decision.value(),
            Some(&FieldValue::numeric(16.0)),
            "Should lower to heating limit minus margin"
        );
    }

    #[test]
    fn test_range_clamp_wins_over_dependency() {
        let registry = ParameterRegistry::builtin();
        let mut graph = ObjectGraph::new();
        graph.insert(
            IdfObject::new("ZoneHVAC:IdealLoadsAirSystem", "Zone1 Ideal Loads")
                .with_field("Maximum Heating Supply Air Temperature", FieldValue::numeric(50.0))
                .with_field("Minimum Cooling Supply Air Temperature", FieldValue::numeric(45.0)),
        );
        let engine = RuleEngine::new(&registry);

        // 20 is below the 30 range floor and below cooling + margin = 47.
        // The range rule fires first and fixes the outcome.
        let change = change(
            &registry,
            "heating_supply_air_temp",
            "ZoneHVAC:IdealLoadsAirSystem",
            "Zone1 Ideal Loads",
            "Maximum Heating Supply Air Temperature",
            FieldValue::numeric(50.0),
            FieldValue::numeric(20.0),
        );
        let decision = engine.validate(&change, &graph);

        assert_eq!(decision.status(), ValidationStatus::Clamped);
        assert_eq!(decision.value(), Some(&FieldValue::numeric(30.0)));
        assert!(
            decision.reason().unwrap().starts_with("range:"),
            "First altering rule fixes the reason"
        );
    }

    #[test]
    fn test_missing_reference_rejects_and_keeps_original() {
        let registry = ParameterRegistry::builtin();
        let mut graph = ObjectGraph::new();
        graph.insert(
            IdfObject::new("Lights", "L")
                .with_field("Schedule Name", FieldValue::text("OFFICE LIGHTING")),
        );
        let engine = RuleEngine::new(&registry);

        let change = change(
            &registry,
            "lighting_schedule",
            "Lights",
            "L",
            "Schedule Name",
            FieldValue::text("OFFICE LIGHTING"),
            FieldValue::text("SCHED_X"),
        );
        let decision = engine.validate(&change, &graph);

        assert_eq!(decision.status(), ValidationStatus::Rejected);
        assert!(decision.reason().unwrap().starts_with("reference:"));
    }

    #[test]
    fn test_reference_accepts_existing_schedule_case_insensitively() {
        let registry = ParameterRegistry::builtin();
        let mut graph = ObjectGraph::new();
        graph.insert(IdfObject::new("Schedule:Compact", "Always On"));
        graph.insert(
            IdfObject::new("Lights", "L")
                .with_field("Schedule Name", FieldValue::text("OFFICE LIGHTING")),
        );
        let engine = RuleEngine::new(&registry);

        let change = change(
            &registry,
            "lighting_schedule",
            "Lights",
            "L",
            "Schedule Name",
            FieldValue::text("OFFICE LIGHTING"),
            FieldValue::text("ALWAYS ON"),
        );
        let decision = engine.validate(&change, &graph);

        assert_eq!(decision.status(), ValidationStatus::Valid);
        assert_eq!(decision.value(), Some(&FieldValue::text("ALWAYS ON")));
    }

    #[test]
    fn test_fraction_sum_accepts_exactly_one() {
        let registry = ParameterRegistry::builtin();
        let mut graph = ObjectGraph::new();
        graph.insert(
            IdfObject::new("Lights", "L")
                .with_field("Return Air Fraction", FieldValue::numeric(0.2))
                .with_field("Fraction Radiant", FieldValue::numeric(0.3))
                .with_field("Fraction Visible", FieldValue::numeric(0.2)),
        );
        let engine = RuleEngine::new(&registry);

        let change = change(
            &registry,
            "lighting_fraction_radiant",
            "Lights",
            "L",
            "Fraction Radiant",
            FieldValue::numeric(0.3),
            FieldValue::numeric(0.6),
        );
        let decision = engine.validate(&change, &graph);

        assert_eq!(
            decision,
            Decision::Accept(FieldValue::numeric(0.6)),
            "A sum of exactly 1.0 is legal"
        );
    }

    #[test]
    fn test_fraction_sum_rejects_when_group_overflows() {
        let registry = ParameterRegistry::builtin();
        let mut graph = ObjectGraph::new();
        graph.insert(
            IdfObject::new("Lights", "L")
                .with_field("Return Air Fraction", FieldValue::numeric(0.05))
                .with_field("Fraction Radiant", FieldValue::numeric(0.3))
                .with_field("Fraction Visible", FieldValue::numeric(0.2)),
        );
        let engine = RuleEngine::new(&registry);

        let change = change(
            &registry,
            "lighting_fraction_radiant",
            "Lights",
            "L",
            "Fraction Radiant",
            FieldValue::numeric(0.3),
            FieldValue::numeric(0.9),
        );
        let decision = engine.validate(&change, &graph);

        assert_eq!(decision.status(), ValidationStatus::Rejected);
        assert!(decision.reason().unwrap().starts_with("fraction_sum:"));
    }

    #[test]
    fn test_range_clamped_fraction_still_rejected_on_group_overflow() {
        let registry = ParameterRegistry::builtin();
        let mut graph = ObjectGraph::new();
        graph.insert(
            IdfObject::new("Lights", "L")
                .with_field("Return Air Fraction", FieldValue::numeric(0.2))
                .with_field("Fraction Radiant", FieldValue::numeric(0.5))
                .with_field("Fraction Visible", FieldValue::numeric(0.15)),
        );
        let engine = RuleEngine::new(&registry);

        // 1.3 clamps to the 1.0 range ceiling, but 1.0 + 0.35 still breaks
        // the group sum, so the proposal must fall back to rejection.
        let change = change(
            &registry,
            "lighting_fraction_radiant",
            "Lights",
            "L",
            "Fraction Radiant",
            FieldValue::numeric(0.5),
            FieldValue::numeric(1.3),
        );
        let decision = engine.validate(&change, &graph);

        assert_eq!(decision.status(), ValidationStatus::Rejected);
        assert!(decision.reason().unwrap().starts_with("fraction_sum:"));
    }

    #[test]
    fn test_no_op_proposal_is_valid() {
        let registry = ParameterRegistry::builtin();
        let graph = water_heater_graph();
        let engine = RuleEngine::new(&registry);

        let change = change(
            &registry,
            "water_heater_efficiency",
            "WaterHeater:Mixed",
            "SWHSys1 Water Heater",
            "Heater Thermal Efficiency",
            FieldValue::numeric(0.8),
            FieldValue::numeric(0.8),
        );
        assert_eq!(
            engine.validate(&change, &graph).status(),
            ValidationStatus::Valid
        );
    }
}
