use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::GraphError;
use crate::model::types::{FieldValue, IdfObject};

/// In-memory store of every object instance in one building model, grouped
/// by object type. Insertion order is preserved within each type bucket so a
/// graph walks the same way every run.
///
/// Type keys are held uppercased; lookups by type or instance name are
/// case-insensitive to match simulator semantics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectGraph {
    objects: IndexMap<String, Vec<IdfObject>>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instance to the graph. A second instance with the same type
    /// and name replaces the first, since the simulator would reject the
    /// duplicate anyway.
    pub fn insert(&mut self, object: IdfObject) {
        let key = object.object_type().to_ascii_uppercase();
        let bucket = self.objects.entry(key).or_default();
        if let Some(existing) = bucket
            .iter_mut()
            .find(|o| o.name().eq_ignore_ascii_case(object.name()))
        {
            warn!(
                object_type = object.object_type(),
                name = object.name(),
                "replacing duplicate object instance"
            );
            *existing = object;
        } else {
            bucket.push(object);
        }
    }

    /// All instances of one object type, in insertion order.
    pub fn objects_of_type(&self, object_type: &str) -> &[IdfObject] {
        self.objects
            .get(&object_type.to_ascii_uppercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// One instance by type and name, case-insensitive.
    pub fn object(&self, object_type: &str, name: &str) -> Option<&IdfObject> {
        self.objects_of_type(object_type)
            .iter()
            .find(|o| o.name().eq_ignore_ascii_case(name))
    }

    /// Whether an instance with this type and name exists.
    pub fn contains_object(&self, object_type: &str, name: &str) -> bool {
        self.object(object_type, name).is_some()
    }

    pub fn object_types(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    pub fn instance_count(&self) -> usize {
        self.objects.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Overwrite one field of one instance. This is the only mutation the
    /// engine performs on a graph after construction, and it refuses to
    /// invent objects or fields that are not already present.
    pub fn set_value(
        &mut self,
        object_type: &str,
        name: &str,
        field: &str,
        value: FieldValue,
    ) -> Result<(), GraphError> {
        let key = object_type.to_ascii_uppercase();
        let object = self
            .objects
            .get_mut(&key)
            .and_then(|bucket| {
                bucket
                    .iter_mut()
                    .find(|o| o.name().eq_ignore_ascii_case(name))
            })
            .ok_or_else(|| GraphError::UnknownObject {
                object_type: object_type.to_string(),
                name: name.to_string(),
            })?;

        if object.set_existing(field, value) {
            Ok(())
        } else {
            Err(GraphError::UnknownField {
                object_type: object_type.to_string(),
                name: name.to_string(),
                field: field.to_string(),
            })
        }
    }
}
