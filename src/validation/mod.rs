//! Validation and rules engine.
//!
//! Every proposed change passes through [`RuleEngine::validate`] before it
//! may touch a graph. Decisions are data, not errors: clamps and rejections
//! are expected outcomes that the tracker records alongside acceptances.

mod engine;

pub use engine::{Decision, RuleEngine, ValidationStatus};
