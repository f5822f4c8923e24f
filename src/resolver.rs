//! Parameter resolution against a concrete building model.
//!
//! Resolution crosses the catalog with the object graph: every definition in
//! the selected categories is located on every instance of its object type,
//! yielding one [`ParameterHandle`] per hit. Handles snapshot the current
//! value and own their addressing strings, so the graph stays free to mutate
//! while handles are alive.

use serde::Serialize;
use tracing::debug;

use crate::model::{FieldValue, ObjectGraph};
use crate::registry::{ParameterCategory, ParameterDefinition, ParameterRegistry};

/// A resolved modification site: one parameter on one object instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterHandle<'a> {
    pub definition: &'a ParameterDefinition,
    /// Object type as the instance spells it.
    pub object_type: String,
    pub object_name: String,
    /// Field key exactly as the instance stores it.
    pub field_key: String,
    /// Value at resolution time.
    pub current: FieldValue,
}

impl ParameterHandle<'_> {
    /// Lenient numeric read of the snapshotted value.
    pub fn current_numeric(&self) -> Option<f64> {
        self.current.as_numeric()
    }
}

/// A definition that resolved to no instance at all. Gaps are ordinary
/// outcomes (most models only contain a subset of the catalog's object
/// types) and are reported rather than raised.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionGap {
    pub parameter: String,
    pub category: ParameterCategory,
    pub object_type: String,
}

/// Outcome of one resolution pass: the handles found plus the definitions
/// that found nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution<'a> {
    pub handles: Vec<ParameterHandle<'a>>,
    pub gaps: Vec<ResolutionGap>,
}

impl Resolution<'_> {
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }
}

/// Resolve every definition in `categories` against `graph`.
///
/// Handles come out in a deterministic order: categories as selected,
/// definitions in catalog order within each category, instances in graph
/// insertion order within each definition. Instances of the right type on
/// which the field cannot be located are skipped; a definition that matches
/// no instance contributes a [`ResolutionGap`].
pub fn resolve<'a>(
    graph: &ObjectGraph,
    registry: &'a ParameterRegistry,
    categories: &[ParameterCategory],
) -> Resolution<'a> {
    let mut resolution = Resolution::default();
    let mut seen: Vec<ParameterCategory> = Vec::with_capacity(categories.len());

    for &category in categories {
        if seen.contains(&category) {
            continue;
        }
        seen.push(category);

        for definition in registry.lookup(category) {
            let mut matched = false;
            for object in graph.objects_of_type(&definition.object_type) {
                match definition.locate(object) {
                    Some(field_key) => {
                        let current = object
                            .field(field_key)
                            .cloned()
                            .unwrap_or(FieldValue::Empty);
                        resolution.handles.push(ParameterHandle {
                            definition,
                            object_type: object.object_type().to_string(),
                            object_name: object.name().to_string(),
                            field_key: field_key.to_string(),
                            current,
                        });
                        matched = true;
                    }
                    None => {
                        debug!(
                            parameter = definition.name.as_str(),
                            object_type = object.object_type(),
                            object_name = object.name(),
                            "field not present on instance, skipping"
                        );
                    }
                }
            }
            if !matched {
                resolution.gaps.push(ResolutionGap {
                    parameter: definition.name.clone(),
                    category,
                    object_type: definition.object_type.clone(),
                });
            }
        }
    }

    debug!(
        handles = resolution.handles.len(),
        gaps = resolution.gaps.len(),
        "resolution complete"
    );
    resolution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IdfObject;

    fn office_graph() -> ObjectGraph {
        let mut graph = ObjectGraph::new();
        graph.insert(
            IdfObject::new("Lights", "Office Lights")
                .with_field("Schedule Name", FieldValue::text("OFFICE LIGHTING"))
                .with_field("Watts per Zone Floor Area", FieldValue::numeric(10.0))
                .with_field("Return Air Fraction", FieldValue::numeric(0.0))
                .with_field("Fraction Radiant", FieldValue::numeric(0.37))
                .with_field("Fraction Visible", FieldValue::numeric(0.18)),
        );
        graph.insert(
            IdfObject::new("Lights", "Corridor Lights")
                .with_field("Schedule Name", FieldValue::text("CORRIDOR LIGHTING"))
                .with_field("Watts per Floor Area", FieldValue::numeric(6.0)),
        );
        graph.insert(
            IdfObject::new("WaterHeater:Mixed", "SWHSys1 Water Heater")
                .with_field("Heater Thermal Efficiency", FieldValue::numeric(0.8)),
        );
        graph
    }

    #[test]
    fn test_resolves_definitions_across_instances() {
        let registry = ParameterRegistry::builtin();
        let graph = office_graph();

        let resolution = resolve(&graph, &registry, &[ParameterCategory::Lighting]);

        let lpd: Vec<_> = resolution
            .handles
            .iter()
            .filter(|h| h.definition.name == "lighting_power_density")
            .collect();
        assert_eq!(lpd.len(), 2, "Both Lights instances should resolve");
        assert_eq!(lpd[0].object_name, "Office Lights");
        assert_eq!(lpd[0].field_key, "Watts per Zone Floor Area");
        assert_eq!(lpd[1].field_key, "Watts per Floor Area", "Synonym key kept verbatim");
        assert_eq!(lpd[1].current_numeric(), Some(6.0));
    }

    #[test]
    fn test_missing_field_skips_instance_without_gap() {
        let registry = ParameterRegistry::builtin();
        let graph = office_graph();

        let resolution = resolve(&graph, &registry, &[ParameterCategory::Lighting]);

        // Corridor Lights has no fraction fields, so only the office
        // instance resolves; the definition still matched, so no gap.
        let radiant: Vec<_> = resolution
            .handles
            .iter()
            .filter(|h| h.definition.name == "lighting_fraction_radiant")
            .collect();
        assert_eq!(radiant.len(), 1);
        assert!(
            !resolution.gaps.iter().any(|g| g.parameter == "lighting_fraction_radiant"),
            "A partially resolved definition is not a gap"
        );
    }

    #[test]
    fn test_absent_object_type_reports_gap() {
        let registry = ParameterRegistry::builtin();
        let graph = office_graph();

        let resolution = resolve(&graph, &registry, &[ParameterCategory::Hvac]);

        assert!(resolution.is_empty(), "No HVAC objects in this graph");
        assert!(
            resolution.gaps.iter().any(|g| g.parameter == "boiler_efficiency"),
            "Unmatched definitions should surface as gaps"
        );
    }

    #[test]
    fn test_positional_fallback_resolves_legacy_instances() {
        let registry = ParameterRegistry::builtin();
        let mut graph = ObjectGraph::new();
        graph.insert(IdfObject::from_values(
            "ZoneInfiltration:DesignFlowRate",
            "Infil 1",
            vec![
                FieldValue::text("Zone 1"),
                FieldValue::text("ALWAYS ON"),
                FieldValue::text("AirChanges/Hour"),
                FieldValue::Empty,
                FieldValue::Empty,
                FieldValue::Empty,
                FieldValue::Empty,
                FieldValue::numeric(0.6),
            ],
        ));

        let resolution = resolve(&graph, &registry, &[ParameterCategory::Infiltration]);

        let ach = resolution
            .handles
            .iter()
            .find(|h| h.definition.name == "infiltration_ach")
            .expect("positional fallback should resolve");
        assert_eq!(ach.field_key, "Field 8");
        assert_eq!(ach.current_numeric(), Some(0.6));
    }

    #[test]
    fn test_duplicate_category_selection_resolves_once() {
        let registry = ParameterRegistry::builtin();
        let graph = office_graph();

        let once = resolve(&graph, &registry, &[ParameterCategory::Dhw]);
        let twice = resolve(
            &graph,
            &registry,
            &[ParameterCategory::Dhw, ParameterCategory::Dhw],
        );

        assert_eq!(once.handles.len(), twice.handles.len());
    }
}
