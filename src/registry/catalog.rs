//! Parameter catalog loading and lookup.
//!
//! Provides two loading methods:
//! - `ParameterRegistry::builtin()` - Loads the embedded catalog compiled into the binary
//! - `ParameterRegistry::load(path)` - Loads a custom catalog from a file path
//!
//! Every catalog is validated on load. A definition that passes validation
//! is safe for the rest of the engine to use without re-checking: bounds are
//! ordered, enums have members, and every entry can locate its field.

use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::error::RegistryError;
use crate::registry::types::{
    DependencyRule, FieldMatcher, FractionGroup, ParameterCategory, ParameterDefinition,
    ParameterKind,
};

/// Default parameter catalog embedded in the binary at compile time.
/// Loaded from `config/parameters.toml`.
const DEFAULT_CATALOG: &str = include_str!("../../config/parameters.toml");

/// On-disk shape of a catalog file.
#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    parameters: Vec<ParameterDefinition>,
    #[serde(default)]
    fraction_groups: Vec<FractionGroup>,
    #[serde(default)]
    dependencies: Vec<DependencyRule>,
}

/// Validated, indexed parameter catalog.
///
/// Definitions keep their catalog order, so category lookups and resolution
/// walk parameters the same way every run.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterRegistry {
    definitions: IndexMap<String, ParameterDefinition>,
    fraction_groups: Vec<FractionGroup>,
    dependencies: Vec<DependencyRule>,
}

impl ParameterRegistry {
    /// The default catalog embedded in the binary.
    ///
    /// # Panics
    /// Panics if the embedded TOML is invalid (this would be a compile-time bug).
    pub fn builtin() -> Self {
        Self::from_toml_str(DEFAULT_CATALOG)
            .expect("embedded parameters.toml must be a valid catalog")
    }

    /// Load a catalog from a TOML file at the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read parameter catalog {}", path.display()))?;
        let registry = Self::from_toml_str(&content)
            .with_context(|| format!("invalid parameter catalog {}", path.display()))?;
        Ok(registry)
    }

    /// Parse and validate a catalog from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, RegistryError> {
        let file: CatalogFile = toml::from_str(content)?;
        Self::from_parts(file.parameters, file.fraction_groups, file.dependencies)
    }

    /// Build a catalog from already-deserialized parts, compiling field
    /// matchers and enforcing every structural rule.
    pub fn from_parts(
        definitions: Vec<ParameterDefinition>,
        fraction_groups: Vec<FractionGroup>,
        dependencies: Vec<DependencyRule>,
    ) -> Result<Self, RegistryError> {
        let mut indexed: IndexMap<String, ParameterDefinition> =
            IndexMap::with_capacity(definitions.len());

        for mut def in definitions {
            validate_definition(&def)?;
            def.matcher = FieldMatcher::compile(&def.field, &def.synonyms, def.position);
            let name = def.name.clone();
            if indexed.insert(name.clone(), def).is_some() {
                return Err(RegistryError::DuplicateParameter { name });
            }
        }

        for group in &fraction_groups {
            if group.fields.len() < 2 {
                return Err(RegistryError::UndersizedFractionGroup {
                    object_type: group.object_type.clone(),
                    count: group.fields.len(),
                });
            }
            for field in &group.fields {
                let covered = indexed.values().any(|d| {
                    d.kind == ParameterKind::Float
                        && d.object_type.eq_ignore_ascii_case(&group.object_type)
                        && (d.field.eq_ignore_ascii_case(field)
                            || d.synonyms.iter().any(|s| s.eq_ignore_ascii_case(field)))
                });
                if !covered {
                    return Err(RegistryError::UnknownFractionField {
                        object_type: group.object_type.clone(),
                        field: field.clone(),
                    });
                }
            }
        }

        for dep in &dependencies {
            if dep.field.eq_ignore_ascii_case(&dep.must_exceed) {
                return Err(RegistryError::SelfDependency {
                    object_type: dep.object_type.clone(),
                    field: dep.field.clone(),
                });
            }
            if dep.margin < 0.0 {
                return Err(RegistryError::NegativeMargin {
                    object_type: dep.object_type.clone(),
                    margin: dep.margin,
                });
            }
        }

        debug!(
            parameters = indexed.len(),
            fraction_groups = fraction_groups.len(),
            dependencies = dependencies.len(),
            "parameter catalog loaded"
        );

        Ok(Self {
            definitions: indexed,
            fraction_groups,
            dependencies,
        })
    }

    /// Definition by logical name.
    pub fn get(&self, name: &str) -> Option<&ParameterDefinition> {
        self.definitions.get(name)
    }

    /// Every definition, in catalog order.
    pub fn all(&self) -> impl Iterator<Item = &ParameterDefinition> {
        self.definitions.values()
    }

    /// Definitions in one category, in catalog order.
    pub fn lookup(&self, category: ParameterCategory) -> Vec<&ParameterDefinition> {
        self.definitions
            .values()
            .filter(|d| d.category == category)
            .collect()
    }

    /// The definition addressing `field` on `object_type`, matched against
    /// canonical names and synonyms.
    pub fn find_by_field(
        &self,
        object_type: &str,
        field: &str,
    ) -> Option<&ParameterDefinition> {
        self.definitions.values().find(|d| {
            d.object_type.eq_ignore_ascii_case(object_type)
                && (d.field.eq_ignore_ascii_case(field)
                    || d.synonyms.iter().any(|s| s.eq_ignore_ascii_case(field)))
        })
    }

    /// Every declared fraction group.
    pub fn fraction_groups(&self) -> &[FractionGroup] {
        &self.fraction_groups
    }

    /// The fraction group that `field` on `object_type` belongs to, if any.
    pub fn group_for(&self, object_type: &str, field: &str) -> Option<&FractionGroup> {
        self.fraction_groups
            .iter()
            .find(|g| g.object_type.eq_ignore_ascii_case(object_type) && g.contains_field(field))
    }

    /// Dependency rules declared for one object type.
    pub fn dependencies_for<'a>(
        &'a self,
        object_type: &'a str,
    ) -> impl Iterator<Item = &'a DependencyRule> {
        self.dependencies
            .iter()
            .filter(move |d| d.object_type.eq_ignore_ascii_case(object_type))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

fn validate_definition(def: &ParameterDefinition) -> Result<(), RegistryError> {
    if def.field.trim().is_empty() && def.position.is_none() {
        return Err(RegistryError::MissingLocator {
            name: def.name.clone(),
        });
    }

    match def.kind {
        ParameterKind::Float => {
            if !def.allowed_values.is_empty() {
                return Err(RegistryError::AllowedValuesOnNumeric {
                    name: def.name.clone(),
                });
            }
            if let Some((lo, hi)) = def.bounds() {
                if lo > hi {
                    return Err(RegistryError::InvertedBounds {
                        name: def.name.clone(),
                        min: lo,
                        max: hi,
                    });
                }
            }
        }
        ParameterKind::String | ParameterKind::Enum => {
            if def.min_value.is_some() || def.max_value.is_some() {
                return Err(RegistryError::BoundsOnNonNumeric {
                    name: def.name.clone(),
                });
            }
            if def.kind == ParameterKind::Enum && def.allowed_values.is_empty() {
                return Err(RegistryError::MissingAllowedValues {
                    name: def.name.clone(),
                });
            }
        }
    }

    Ok(())
}
