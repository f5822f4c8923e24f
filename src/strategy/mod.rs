//! Named mutation strategies.
//!
//! A strategy is a declarative, ordered rule list: each rule targets a slice
//! of the resolved handles and declares a transform (scale, shift, assign,
//! or fraction rebalance). Scalars may be drawn from uniform ranges; all
//! randomness flows through the caller's seeded RNG, so a run is fully
//! reproducible from its seed.

mod catalog;
mod engine;
mod types;

pub use catalog::StrategyCatalog;
pub use engine::StrategyEngine;
pub use types::{
    AssignValue, ChangeKind, ProposedChange, Strategy, StrategyRule, TargetSpec, TransformSpec,
    ValueDraw,
};
