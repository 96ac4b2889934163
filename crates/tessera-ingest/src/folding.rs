//! Property folding and enrichment flattening.
//!
//! A property-type entity (an email address, a phone number) never becomes a
//! node. Its value is folded onto the node on the source side of the
//! `HAS_<T>` relationship that points at it.

use std::collections::{HashMap, HashSet};

use serde_json::Value as JsonValue;
use tracing::{debug, trace};

use tessera_core::{IngestionEntity, PropertyMap, Relationship};

use crate::config::FlattenPolicy;
use crate::naming::{additional_key, fold_key};
use crate::resolver::TypeClassification;

/// Fold `value` into `props` under `key`.
///
/// The first value lands on the singular key; later distinct values are
/// appended to the plural `additional<Key>s` list. Returns `true` when the
/// map changed.
pub fn fold_value(props: &mut PropertyMap, key: &str, value: &JsonValue) -> bool {
    match props.get(key) {
        None | Some(JsonValue::Null) => {
            props.insert(key.to_string(), value.clone());
            return true;
        }
        Some(existing) if existing == value => return false,
        Some(_) => {}
    }

    let plural = additional_key(key);
    let list = props
        .entry(plural)
        .or_insert_with(|| JsonValue::Array(Vec::new()));
    if !list.is_array() {
        *list = JsonValue::Array(vec![list.take()]);
    }
    match list.as_array_mut() {
        Some(values) if !values.contains(value) => {
            values.push(value.clone());
            true
        }
        _ => false,
    }
}

/// Flatten nested enrichment objects into scalar-valued keys.
///
/// Arrays are kept as-is. With [`FlattenPolicy::LastWriteWins`] leaf names
/// are used directly and later values overwrite earlier ones; with
/// [`FlattenPolicy::Namespaced`] keys carry their path joined by `_`.
pub fn flatten_enriched(data: &PropertyMap, policy: FlattenPolicy) -> PropertyMap {
    let mut out = PropertyMap::new();
    flatten_into(&mut out, data, None, policy);
    out
}

fn flatten_into(out: &mut PropertyMap, data: &PropertyMap, prefix: Option<&str>, policy: FlattenPolicy) {
    for (key, value) in data {
        let flat_key = match (policy, prefix) {
            (FlattenPolicy::Namespaced, Some(prefix)) => format!("{}_{}", prefix, key),
            _ => key.clone(),
        };
        match value {
            JsonValue::Object(nested) => flatten_into(out, nested, Some(&flat_key), policy),
            _ => {
                if let Some(previous) = out.insert(flat_key.clone(), value.clone()) {
                    if previous != *value {
                        debug!(
                            subsystem = "ingest",
                            component = "folding",
                            key = %flat_key,
                            "Flattened enrichment key overwritten"
                        );
                    }
                }
            }
        }
    }
}

/// Folding plan of one batch, computed before any node is written.
#[derive(Debug, Default, Clone)]
pub struct PropertyFolds {
    by_source: HashMap<String, Vec<(String, JsonValue)>>,
    folding_relationships: HashSet<usize>,
    /// Property entity id to the ids of the entities it folds onto.
    owners: HashMap<String, Vec<String>>,
}

impl PropertyFolds {
    /// Find every `X HAS_<T> Y` relationship whose target `Y` is a property
    /// entity of the batch. `classifications` is parallel to `entities`.
    pub fn collect(
        relationships: &[Relationship],
        entities: &[IngestionEntity],
        classifications: &[TypeClassification],
    ) -> Self {
        let property_targets: HashMap<&str, &IngestionEntity> = entities
            .iter()
            .zip(classifications)
            .filter(|(_, class)| class.is_property)
            .map(|(entity, _)| (entity.id.as_str(), entity))
            .collect();

        let mut folds = Self::default();
        for (index, rel) in relationships.iter().enumerate() {
            let Some(key) = fold_key(&rel.rel_type) else {
                continue;
            };
            let Some(target) = property_targets.get(rel.target.as_str()) else {
                continue;
            };
            trace!(
                subsystem = "ingest",
                component = "folding",
                source = %rel.source,
                key = %key,
                "Planned property fold"
            );
            folds
                .by_source
                .entry(rel.source.clone())
                .or_default()
                .push((key, JsonValue::String(target.name.clone())));
            folds.folding_relationships.insert(index);
            folds
                .owners
                .entry(target.id.clone())
                .or_default()
                .push(rel.source.clone());
        }
        folds
    }

    /// Values to fold onto the node of entity `source_id`, in batch order.
    pub fn for_source(&self, source_id: &str) -> &[(String, JsonValue)] {
        self.by_source.get(source_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_folds(&self, source_id: &str) -> bool {
        !self.for_source(source_id).is_empty()
    }

    /// True when the relationship at `index` encodes a fold and must not
    /// become an edge.
    pub fn is_folding(&self, index: usize) -> bool {
        self.folding_relationships.contains(&index)
    }

    /// True when the property entity `entity_id` folds onto some owner.
    pub fn is_folded_entity(&self, entity_id: &str) -> bool {
        self.owners.contains_key(entity_id)
    }

    /// Folded property entities none of whose owners resolved to a node.
    /// Their values were planned but never written.
    pub fn stranded<'a>(&'a self, entities: &[IngestionEntity]) -> Vec<&'a str> {
        let resolved: HashSet<&str> = entities
            .iter()
            .filter(|e| e.resolved_id.is_some())
            .map(|e| e.id.as_str())
            .collect();
        let mut stranded: Vec<&str> = self
            .owners
            .iter()
            .filter(|(_, sources)| !sources.iter().any(|s| resolved.contains(s.as_str())))
            .map(|(id, _)| id.as_str())
            .collect();
        stranded.sort_unstable();
        stranded
    }

    /// Fold the values planned for `source_id` into `props`, returning the
    /// keys that changed.
    pub fn apply(&self, source_id: &str, props: &mut PropertyMap) -> Vec<String> {
        let mut changed = Vec::new();
        for (key, value) in self.for_source(source_id) {
            if fold_value(props, key, value) {
                let touched = if props.get(key) == Some(value) {
                    key.clone()
                } else {
                    additional_key(key)
                };
                if !changed.contains(&touched) {
                    changed.push(touched);
                }
            }
        }
        changed
    }
}
