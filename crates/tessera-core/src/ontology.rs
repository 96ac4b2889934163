//! Ontology definitions and the immutable snapshot consumed by the engine.
//!
//! An [`OntologyRegistry`] exposes entity/property/indexable type catalogs
//! and relationship rules. The engine never queries the registry directly
//! while ingesting; it takes an [`OntologySnapshot`] once and injects it into
//! every component so classification stays deterministic for the lifetime of
//! the pipeline.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::defaults;
use crate::error::{Error, Result};
use crate::traits::OntologyRegistry;

/// Sentinel primary type for labels the ontology does not know.
pub const UNRECOGNIZED_TYPE: &str = "Unrecognized";

/// An entity type declared by the ontology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OntologyEntityType {
    pub name: String,
    #[serde(default)]
    pub super_types: Vec<String>,
    /// Synonyms the extractor may emit for this type.
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default, rename = "propertyType", alias = "isPropertyType")]
    pub is_property_type: bool,
    #[serde(default, rename = "indexable", alias = "isIndexable")]
    pub is_indexable: bool,
}

impl OntologyEntityType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            super_types: Vec::new(),
            aliases: Vec::new(),
            is_property_type: false,
            is_indexable: false,
        }
    }

    pub fn with_super_types(mut self, super_types: &[&str]) -> Self {
        self.super_types = super_types.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn indexable(mut self) -> Self {
        self.is_indexable = true;
        self
    }

    pub fn property(mut self) -> Self {
        self.is_property_type = true;
        self
    }
}

/// A type-pair rule: entities of `source_type` relate to `target_type` via `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipRule {
    pub name: String,
    pub source_type: String,
    pub target_type: String,
}

impl RelationshipRule {
    pub fn new(
        name: impl Into<String>,
        source_type: impl Into<String>,
        target_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_type: source_type.into(),
            target_type: target_type.into(),
        }
    }
}

fn default_generic_types() -> Vec<String> {
    defaults::GENERIC_TYPES.iter().map(|s| s.to_string()).collect()
}

/// File-backed ontology definition (YAML or JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OntologyDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_generic_types")]
    pub generic_types: Vec<String>,
    #[serde(default)]
    pub entity_types: Vec<OntologyEntityType>,
    #[serde(default)]
    pub relationship_rules: Vec<RelationshipRule>,
}

impl Default for OntologyDefinition {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            generic_types: default_generic_types(),
            entity_types: Vec::new(),
            relationship_rules: Vec::new(),
        }
    }
}

impl OntologyDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, entity_type: OntologyEntityType) -> Self {
        self.entity_types.push(entity_type);
        self
    }

    pub fn with_rule(mut self, rule: RelationshipRule) -> Self {
        self.relationship_rules.push(rule);
        self
    }

    /// Parse a YAML document. JSON is valid YAML, so this accepts both.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let definition: Self = serde_yaml::from_str(content)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Load a definition file; `.json` files go through serde_json, everything
    /// else through serde_yaml.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let definition: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };
        definition.validate()?;
        debug!(
            ontology = %definition.name,
            entity_types = definition.entity_types.len(),
            rules = definition.relationship_rules.len(),
            "Loaded ontology definition"
        );
        Ok(definition)
    }

    /// Reject empty and duplicate type names or aliases.
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashMap<String, &str> = HashMap::new();
        for ty in &self.entity_types {
            if ty.name.trim().is_empty() {
                return Err(Error::Ontology("entity type name cannot be empty".to_string()));
            }
            for label in std::iter::once(&ty.name).chain(ty.aliases.iter()) {
                let key = normalize_type_key(label);
                if let Some(owner) = seen.insert(key, &ty.name).filter(|o| *o != ty.name) {
                    return Err(Error::Ontology(format!(
                        "type label '{}' of '{}' collides with '{}'",
                        label, ty.name, owner
                    )));
                }
            }
        }
        for rule in &self.relationship_rules {
            if rule.name.trim().is_empty() {
                return Err(Error::Ontology(
                    "relationship rule name cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl OntologyRegistry for OntologyDefinition {
    fn list_entity_types(&self) -> Vec<OntologyEntityType> {
        self.entity_types.clone()
    }

    fn list_property_types(&self) -> Vec<String> {
        self.entity_types
            .iter()
            .filter(|t| t.is_property_type)
            .map(|t| t.name.clone())
            .collect()
    }

    fn list_indexable_types(&self) -> Vec<String> {
        self.entity_types
            .iter()
            .filter(|t| t.is_indexable && !t.is_property_type)
            .map(|t| t.name.clone())
            .collect()
    }

    /// Transitive super-type chain, breadth-first, nearest first. Cycles and
    /// repeats are cut.
    fn super_types_of(&self, type_name: &str) -> Vec<String> {
        let mut chain: Vec<String> = Vec::new();
        let mut frontier: Vec<&str> = vec![type_name];
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for name in frontier {
                let Some(ty) = self.entity_types.iter().find(|t| t.name == name) else {
                    continue;
                };
                for parent in &ty.super_types {
                    if parent != type_name && !chain.contains(parent) {
                        chain.push(parent.clone());
                        next.push(parent.as_str());
                    }
                }
            }
            frontier = next;
        }
        chain
    }

    fn relationship_rules(&self) -> Vec<RelationshipRule> {
        self.relationship_rules.clone()
    }

    fn generic_types(&self) -> Vec<String> {
        self.generic_types.clone()
    }
}

/// Case- and separator-insensitive comparison key for type labels.
///
/// `PERSON_NAME`, `person name`, and `personName` all map to `personname`.
pub fn normalize_type_key(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

#[derive(Debug)]
struct SnapshotInner {
    types: HashMap<String, OntologyEntityType>,
    exact: HashMap<String, String>,
    normalized: HashMap<String, String>,
    indexable: HashSet<String>,
    property: HashSet<String>,
    generic: HashSet<String>,
    rules: Vec<RelationshipRule>,
}

/// Immutable, cheaply cloneable view of an ontology registry.
#[derive(Debug, Clone)]
pub struct OntologySnapshot {
    inner: Arc<SnapshotInner>,
}

impl OntologySnapshot {
    /// Capture the current state of `registry`.
    ///
    /// The registry's property and indexable catalogs are authoritative over
    /// the flags on individual type descriptors. Property types are never
    /// indexable.
    pub fn from_registry(registry: &dyn OntologyRegistry) -> Self {
        let property: HashSet<String> = registry.list_property_types().into_iter().collect();
        let indexable: HashSet<String> = registry
            .list_indexable_types()
            .into_iter()
            .filter(|t| !property.contains(t))
            .collect();

        let mut types = HashMap::new();
        let mut exact = HashMap::new();
        let mut normalized = HashMap::new();

        for mut ty in registry.list_entity_types() {
            ty.super_types = registry.super_types_of(&ty.name);
            ty.is_property_type = property.contains(&ty.name);
            ty.is_indexable = indexable.contains(&ty.name);

            exact.insert(ty.name.clone(), ty.name.clone());
            normalized.insert(normalize_type_key(&ty.name), ty.name.clone());
            for alias in &ty.aliases {
                exact.entry(alias.clone()).or_insert_with(|| ty.name.clone());
                normalized
                    .entry(normalize_type_key(alias))
                    .or_insert_with(|| ty.name.clone());
            }
            types.insert(ty.name.clone(), ty);
        }

        let generic = registry
            .generic_types()
            .iter()
            .map(|g| normalize_type_key(g))
            .collect();

        Self {
            inner: Arc::new(SnapshotInner {
                types,
                exact,
                normalized,
                indexable,
                property,
                generic,
                rules: registry.relationship_rules(),
            }),
        }
    }

    /// Resolve a raw label to its canonical type name.
    ///
    /// Tries the canonical name and aliases verbatim first, then falls back
    /// to the normalized comparison key.
    pub fn canonical_name(&self, raw: &str) -> Option<&str> {
        let raw = raw.trim();
        self.inner
            .exact
            .get(raw)
            .or_else(|| self.inner.normalized.get(&normalize_type_key(raw)))
            .map(String::as_str)
    }

    pub fn entity_type(&self, canonical: &str) -> Option<&OntologyEntityType> {
        self.inner.types.get(canonical)
    }

    pub fn is_property_type(&self, canonical: &str) -> bool {
        self.inner.property.contains(canonical)
    }

    pub fn is_indexable(&self, label: &str) -> bool {
        self.inner.indexable.contains(label)
    }

    /// True for generic catch-all labels (`Entity`, `Thing`, ...), matched on
    /// the normalized key.
    pub fn is_generic(&self, label: &str) -> bool {
        self.inner.generic.contains(&normalize_type_key(label))
    }

    pub fn rules(&self) -> &[RelationshipRule] {
        &self.inner.rules
    }

    pub fn is_rule_name(&self, name: &str) -> bool {
        self.inner.rules.iter().any(|r| r.name == name)
    }

    /// Indexable labels, sorted for deterministic iteration.
    pub fn indexable_types(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.inner.indexable.iter().map(String::as_str).collect();
        labels.sort_unstable();
        labels
    }

    pub fn type_count(&self) -> usize {
        self.inner.types.len()
    }
}

impl From<&OntologyDefinition> for OntologySnapshot {
    fn from(definition: &OntologyDefinition) -> Self {
        Self::from_registry(definition)
    }
}
