//! Deterministic modification engine for building-energy-model variants.
//!
//! Takes an in-memory object graph of simulation-input records, applies a
//! named mutation strategy to the parameters of selected categories, and
//! records every decided change in a replayable audit trail. The text
//! parser/writer, the simulator, and the analysis consumers all live
//! outside this crate; it speaks only object graphs and records.
//!
//! # Architecture
//!
//! - **Registry**: TOML catalog of typed, bounded parameters (embedded
//!   defaults or a custom file)
//! - **Resolver**: catalog x graph -> concrete parameter handles
//! - **Strategies**: named, ordered rule lists proposing value changes,
//!   all randomness drawn from a caller-seeded RNG
//! - **Validation**: range, dependency, reference, and fraction-sum rules
//!   deciding each proposal (accept, clamp, or reject)
//! - **Tracker**: append-only record store with long and wide export views
//!
//! Runs are deterministic: one seed, one graph, one strategy always
//! produce the same records, and portfolios parallelize per building with
//! derived seeds so scheduling never changes results.
//!
//! # Example
//!
//! ```ignore
//! use epvariant::{
//!     run_variant, FieldValue, IdfObject, ModificationTracker, ObjectGraph,
//!     ParameterCategory, ParameterRegistry, StrategyCatalog, StrategyEngine,
//!     VariantPlan,
//! };
//!
//! let registry = ParameterRegistry::builtin();
//! let strategies = StrategyEngine::new(StrategyCatalog::builtin());
//!
//! let mut graph = ObjectGraph::new();
//! graph.insert(
//!     IdfObject::new("WaterHeater:Mixed", "SWHSys1 Water Heater")
//!         .with_field("Heater Thermal Efficiency", FieldValue::numeric(0.8)),
//! );
//!
//! let plan = VariantPlan {
//!     variant_id: "dhw_upgrade_1".to_string(),
//!     strategy: "hvac_efficiency_boost".to_string(),
//!     categories: vec![ParameterCategory::Dhw],
//! };
//!
//! let mut tracker = ModificationTracker::new();
//! let mut rng = epvariant::building_rng(42, 0);
//! run_variant("bldg-01", &mut graph, &plan, &registry, &strategies, &mut tracker, &mut rng)?;
//!
//! for record in tracker.export()? {
//!     println!(
//!         "{} {} {} -> {} ({})",
//!         record.object_name, record.field_name,
//!         record.original_value, record.accepted_value, record.status,
//!     );
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod error;
pub mod model;
pub mod registry;
pub mod resolver;
pub mod runner;
pub mod strategy;
pub mod tracker;
pub mod validation;

pub use error::{GraphError, RegistryError, StrategyError, TrackerError};
pub use model::{FieldValue, IdfObject, ObjectGraph};
pub use registry::{
    DependencyRule, FractionGroup, ParameterCategory, ParameterDefinition, ParameterKind,
    ParameterRegistry, FRACTION_SUM_EPSILON,
};
pub use resolver::{resolve, ParameterHandle, Resolution, ResolutionGap};
pub use runner::{
    building_rng, replay_records, run_building, run_portfolio, run_variant, BuildingRun,
    VariantOutcome, VariantPlan,
};
pub use strategy::{
    AssignValue, ChangeKind, ProposedChange, Strategy, StrategyCatalog, StrategyEngine,
    StrategyRule, TargetSpec, TransformSpec, ValueDraw,
};
pub use tracker::{ModificationRecord, ModificationTracker, TrackerSummary};
pub use validation::{Decision, RuleEngine, ValidationStatus};
