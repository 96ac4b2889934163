//! Ontology type resolution.
//!
//! Maps raw extractor labels onto canonical ontology types. Classification
//! is a pure function of the raw label and the injected snapshot.

use serde::Serialize;

use tessera_core::{OntologySnapshot, UNRECOGNIZED_TYPE};

/// Result of classifying a raw type label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeClassification {
    /// Canonical type, or `Unrecognized`.
    pub primary: String,
    /// Super-type chain, nearest first.
    pub super_types: Vec<String>,
    pub is_property: bool,
    pub is_indexable: bool,
    pub is_generic: bool,
    candidates: Vec<String>,
}

impl TypeClassification {
    fn unrecognized(is_generic: bool) -> Self {
        Self {
            primary: UNRECOGNIZED_TYPE.to_string(),
            super_types: Vec::new(),
            is_property: false,
            is_indexable: false,
            is_generic,
            candidates: Vec::new(),
        }
    }

    pub fn is_unrecognized(&self) -> bool {
        self.primary == UNRECOGNIZED_TYPE
    }

    /// Primary then super-types, restricted to indexable labels, in priority
    /// order for vector lookups.
    pub fn candidate_labels(&self) -> &[String] {
        &self.candidates
    }

    /// Node label set: primary followed by super-types.
    pub fn labels(&self) -> Vec<String> {
        std::iter::once(self.primary.clone())
            .chain(self.super_types.iter().cloned())
            .collect()
    }

    /// True when the primary type or any super-type equals `type_name`.
    pub fn matches(&self, type_name: &str) -> bool {
        self.primary == type_name || self.super_types.iter().any(|t| t == type_name)
    }

    /// Entities of this type never become nodes.
    pub fn is_persistable(&self) -> bool {
        !(self.is_unrecognized() || self.is_generic || self.is_property)
    }
}

/// Classifies raw labels against an ontology snapshot.
#[derive(Debug, Clone)]
pub struct TypeResolver {
    snapshot: OntologySnapshot,
}

impl TypeResolver {
    pub fn new(snapshot: OntologySnapshot) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &OntologySnapshot {
        &self.snapshot
    }

    /// Canonicalize `raw`: exact canonical name, then exact alias, then the
    /// case- and separator-insensitive key. Unknown labels classify as
    /// `Unrecognized`.
    pub fn classify(&self, raw: &str) -> TypeClassification {
        let raw_is_generic = self.snapshot.is_generic(raw);
        let Some(primary) = self.snapshot.canonical_name(raw) else {
            return TypeClassification::unrecognized(raw_is_generic);
        };

        let super_types = self
            .snapshot
            .entity_type(primary)
            .map(|t| t.super_types.clone())
            .unwrap_or_default();
        let is_property = self.snapshot.is_property_type(primary);
        let is_indexable = self.snapshot.is_indexable(primary);

        let candidates = if is_property {
            Vec::new()
        } else {
            std::iter::once(primary)
                .chain(super_types.iter().map(String::as_str))
                .filter(|label| self.snapshot.is_indexable(label))
                .map(String::from)
                .collect()
        };

        TypeClassification {
            primary: primary.to_string(),
            is_generic: raw_is_generic || self.snapshot.is_generic(primary),
            super_types,
            is_property,
            is_indexable,
            candidates,
        }
    }
}
