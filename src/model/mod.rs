//! Building-model object graph.
//!
//! The engine never parses IDF text itself; callers hand it an
//! [`ObjectGraph`] assembled from whatever front end they use, and every
//! later stage (resolution, mutation, validation, tracking) works against
//! this one representation.

mod graph;
mod types;

pub use graph::ObjectGraph;
pub use types::{FieldValue, IdfObject};
