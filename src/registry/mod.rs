//! Typed parameter catalog.
//!
//! The registry is the engine's single source of truth for what may be
//! modified: each definition binds a logical parameter name to a concrete
//! field on an object type and carries the type discipline, physical bounds,
//! and structural rules (fraction groups, field dependencies) the validator
//! enforces. Catalogs are declarative TOML; the embedded default covers the
//! seven standard categories.

mod catalog;
mod types;

pub use catalog::ParameterRegistry;
pub use types::{
    DependencyRule, FieldMatcher, FractionGroup, ParameterCategory, ParameterDefinition,
    ParameterKind, FRACTION_SUM_EPSILON,
};
