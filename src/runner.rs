//! Variant and portfolio orchestration.
//!
//! `run_variant` drives one resolve → propose → validate → apply → record
//! pass over one building's graph. `run_portfolio` fans buildings out over
//! a worker pool; each building owns its graph copies, its tracker, and its
//! own RNG stream seeded from the base seed and the building's index, so
//! results do not depend on scheduling order.

use anyhow::{Context, Result};
use indexmap::IndexMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::ObjectGraph;
use crate::registry::{ParameterCategory, ParameterRegistry};
use crate::resolver::resolve;
use crate::strategy::{ChangeKind, ProposedChange, StrategyEngine};
use crate::tracker::{ModificationRecord, ModificationTracker};
use crate::validation::{RuleEngine, ValidationStatus};

/// Declarative description of one variant: which strategy to run over
/// which parameter categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantPlan {
    pub variant_id: String,
    pub strategy: String,
    pub categories: Vec<ParameterCategory>,
}

/// Counts from one variant run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantOutcome {
    pub variant_id: String,
    pub proposals: usize,
    pub valid: usize,
    pub clamped: usize,
    pub rejected: usize,
    pub gaps: usize,
}

/// One building's completed run: the mutated graph per variant plus the
/// tracker holding every record.
#[derive(Debug)]
pub struct BuildingRun {
    pub building_id: String,
    pub variants: Vec<(String, ObjectGraph)>,
    pub tracker: ModificationTracker,
}

/// The RNG stream for one building, derived from the portfolio's base seed
/// and the building's index so streams never collide across workers.
pub fn building_rng(base_seed: u64, building_index: usize) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(base_seed ^ building_index as u64)
}

/// Run one variant against one building graph, mutating the graph in place
/// and appending to the tracker.
///
/// Proposals are decided and applied sequentially per object instance, so
/// dependency and group-sum rules always see that instance's freshest
/// values. Within an instance, rebalance proposals (which shrink group
/// siblings) go first; the grown target is then checked against the already
/// shrunk siblings, which is the order that makes an effective rebalance
/// verifiable.
///
/// An error leaves the tracker with its variant open; per the cancellation
/// model, a failed run's tracker is discarded, never exported.
pub fn run_variant<R: Rng>(
    building_id: &str,
    graph: &mut ObjectGraph,
    plan: &VariantPlan,
    registry: &ParameterRegistry,
    strategies: &StrategyEngine,
    tracker: &mut ModificationTracker,
    rng: &mut R,
) -> Result<VariantOutcome> {
    // 1. Resolve handles for the plan's categories.
    let resolution = resolve(graph, registry, &plan.categories);
    if !resolution.gaps.is_empty() {
        debug!(
            building_id,
            variant_id = plan.variant_id.as_str(),
            gaps = resolution.gaps.len(),
            "some definitions resolved no instances"
        );
    }

    // 2. Let the strategy propose changes.
    let proposals = strategies.apply(
        &plan.strategy,
        &resolution.handles,
        graph,
        registry,
        rng,
    )?;

    // 3. Group proposals by object instance, keeping first-seen order.
    let mut by_instance: IndexMap<(String, String), Vec<ProposedChange<'_>>> = IndexMap::new();
    for proposal in proposals {
        let key = (
            proposal.handle.object_type.to_ascii_uppercase(),
            proposal.handle.object_name.to_ascii_uppercase(),
        );
        by_instance.entry(key).or_default().push(proposal);
    }

    // 4. Decide, apply, and record, one instance at a time.
    let rules = RuleEngine::new(registry);
    let mut outcome = VariantOutcome {
        variant_id: plan.variant_id.clone(),
        proposals: 0,
        valid: 0,
        clamped: 0,
        rejected: 0,
        gaps: resolution.gaps.len(),
    };

    tracker.begin_variant(building_id, &plan.variant_id)?;
    for (_, mut changes) in by_instance {
        changes.sort_by_key(|c| c.kind != ChangeKind::Rebalance);
        for change in changes {
            let decision = rules.validate(&change, graph);
            if let Some(value) = decision.value() {
                graph
                    .set_value(
                        &change.handle.object_type,
                        &change.handle.object_name,
                        &change.handle.field_key,
                        value.clone(),
                    )
                    .with_context(|| {
                        format!(
                            "applying accepted value to {} '{}'",
                            change.handle.object_type, change.handle.object_name
                        )
                    })?;
            }
            let status = decision.status();
            tracker.record(
                building_id,
                &plan.variant_id,
                change.handle.definition.category,
                &plan.strategy,
                &change,
                &decision,
            )?;
            outcome.proposals += 1;
            match status {
                ValidationStatus::Valid => outcome.valid += 1,
                ValidationStatus::Clamped => outcome.clamped += 1,
                ValidationStatus::Rejected => outcome.rejected += 1,
            }
        }
    }
    tracker.finish_variant()?;

    info!(
        building_id,
        variant_id = plan.variant_id.as_str(),
        strategy = plan.strategy.as_str(),
        proposals = outcome.proposals,
        valid = outcome.valid,
        clamped = outcome.clamped,
        rejected = outcome.rejected,
        "variant complete"
    );
    Ok(outcome)
}

/// Run every plan against one building, each variant starting from a fresh
/// copy of the base graph but sharing one RNG stream and one tracker.
pub fn run_building(
    building_id: &str,
    base_graph: &ObjectGraph,
    plans: &[VariantPlan],
    registry: &ParameterRegistry,
    strategies: &StrategyEngine,
    seed_rng: ChaCha8Rng,
) -> Result<BuildingRun> {
    let mut rng = seed_rng;
    let mut tracker = ModificationTracker::new();
    let mut variants = Vec::with_capacity(plans.len());

    for plan in plans {
        let mut graph = base_graph.clone();
        run_variant(
            building_id,
            &mut graph,
            plan,
            registry,
            strategies,
            &mut tracker,
            &mut rng,
        )
        .with_context(|| {
            format!(
                "building '{}': variant '{}' with strategy '{}' failed",
                building_id, plan.variant_id, plan.strategy
            )
        })?;
        variants.push((plan.variant_id.clone(), graph));
    }

    Ok(BuildingRun {
        building_id: building_id.to_string(),
        variants,
        tracker,
    })
}

/// Run a portfolio of buildings in parallel.
///
/// Buildings fan out over the rayon pool. Each result is independent: a
/// failure reports which building, variant, and strategy failed without
/// touching its siblings. Output order matches input order regardless of
/// which worker finishes first.
pub fn run_portfolio(
    buildings: Vec<(String, ObjectGraph)>,
    plans: &[VariantPlan],
    registry: &ParameterRegistry,
    strategies: &StrategyEngine,
    base_seed: u64,
) -> Vec<Result<BuildingRun>> {
    buildings
        .into_par_iter()
        .enumerate()
        .map(|(index, (building_id, graph))| {
            run_building(
                &building_id,
                &graph,
                plans,
                registry,
                strategies,
                building_rng(base_seed, index),
            )
        })
        .collect()
}

/// Rebuild a variant's post-mutation graph by replaying its records against
/// a fresh copy of the original graph. Rejected records are skipped; they
/// never touched the graph. Callers pass the records of one variant, in
/// sequence order, as exported.
pub fn replay_records(
    base_graph: &ObjectGraph,
    records: &[ModificationRecord],
) -> Result<ObjectGraph> {
    let mut graph = base_graph.clone();
    for record in records {
        if !record.is_accepted() {
            continue;
        }
        graph
            .set_value(
                &record.object_type,
                &record.object_name,
                &record.field_name,
                record.accepted_value.clone(),
            )
            .with_context(|| {
                format!(
                    "replaying record {} onto {} '{}'",
                    record.sequence, record.object_type, record.object_name
                )
            })?;
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldValue, IdfObject};
    use crate::strategy::StrategyCatalog;

    fn dhw_graph() -> ObjectGraph {
        let mut graph = ObjectGraph::new();
        graph.insert(
            IdfObject::new("WaterHeater:Mixed", "SWHSys1 Water Heater")
                .with_field("Heater Thermal Efficiency", FieldValue::numeric(0.8)),
        );
        graph
    }

    fn dhw_plan() -> VariantPlan {
        VariantPlan {
            variant_id: "v1".to_string(),
            strategy: "hvac_efficiency_boost".to_string(),
            categories: vec![ParameterCategory::Dhw],
        }
    }

    #[test]
    fn test_run_variant_applies_and_records() {
        let registry = ParameterRegistry::builtin();
        let strategies = StrategyEngine::new(StrategyCatalog::builtin());
        let mut graph = dhw_graph();
        let mut tracker = ModificationTracker::new();
        let mut rng = building_rng(42, 0);

        let outcome = run_variant(
            "bldg-01",
            &mut graph,
            &dhw_plan(),
            &registry,
            &strategies,
            &mut tracker,
            &mut rng,
        )
        .unwrap();

        assert_eq!(outcome.proposals, 1);
        let records = tracker.export().unwrap();
        assert_eq!(records.len(), 1);

        let applied = graph
            .object("WaterHeater:Mixed", "SWHSys1 Water Heater")
            .and_then(|o| o.numeric("Heater Thermal Efficiency"))
            .unwrap();
        assert_eq!(
            records[0].accepted_value,
            FieldValue::numeric(applied),
            "Graph value and record must agree"
        );
        assert_ne!(applied, 0.8, "The efficiency boost should move the value");
    }

    #[test]
    fn test_empty_category_yields_no_records() {
        let registry = ParameterRegistry::builtin();
        let strategies = StrategyEngine::new(StrategyCatalog::builtin());
        let mut graph = dhw_graph();
        let mut tracker = ModificationTracker::new();
        let mut rng = building_rng(42, 0);

        let plan = VariantPlan {
            variant_id: "v-empty".to_string(),
            strategy: "envelope_upgrade".to_string(),
            categories: vec![ParameterCategory::Envelope],
        };
        let outcome = run_variant(
            "bldg-01",
            &mut graph,
            &plan,
            &registry,
            &strategies,
            &mut tracker,
            &mut rng,
        )
        .unwrap();

        assert_eq!(outcome.proposals, 0);
        assert!(outcome.gaps > 0, "Unmatched definitions surface as gaps");
        assert!(tracker.export().unwrap().is_empty(), "No placeholder records");
        assert_eq!(graph, dhw_graph(), "Graph must be untouched");
    }

    #[test]
    fn test_replay_reproduces_the_mutated_graph() {
        let registry = ParameterRegistry::builtin();
        let strategies = StrategyEngine::new(StrategyCatalog::builtin());
        let base = dhw_graph();
        let mut graph = base.clone();
        let mut tracker = ModificationTracker::new();
        let mut rng = building_rng(7, 3);

        run_variant(
            "bldg-01",
            &mut graph,
            &dhw_plan(),
            &registry,
            &strategies,
            &mut tracker,
            &mut rng,
        )
        .unwrap();

        let replayed = replay_records(&base, tracker.export().unwrap()).unwrap();
        assert_eq!(replayed, graph, "Replay must reproduce the post-run graph");
    }

    #[test]
    fn test_building_rng_streams_differ_by_index() {
        let mut a = building_rng(42, 0);
        let mut b = building_rng(42, 1);
        let mut a2 = building_rng(42, 0);

        let draw_a: f64 = a.random_range(0.0..=1.0);
        let draw_b: f64 = b.random_range(0.0..=1.0);
        let draw_a2: f64 = a2.random_range(0.0..=1.0);

        assert_eq!(draw_a, draw_a2, "Same building index, same stream");
        assert_ne!(draw_a, draw_b, "Different building index, different stream");
    }

    #[test]
    fn test_variant_plan_deserializes_from_toml() {
        let plan: VariantPlan = toml::from_str(
            r#"
            variant_id = "led_retrofit_1"
            strategy = "lighting_retrofit"
            categories = ["lighting", "equipment"]
        "#,
        )
        .unwrap();
        assert_eq!(plan.strategy, "lighting_retrofit");
        assert_eq!(
            plan.categories,
            vec![ParameterCategory::Lighting, ParameterCategory::Equipment]
        );
    }
}
