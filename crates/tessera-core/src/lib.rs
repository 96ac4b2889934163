//! # tessera-core
//!
//! Core types, traits, and abstractions for the tessera knowledge-graph
//! ingestion engine.
//!
//! This crate provides the batch data model, the ontology snapshot consumed
//! by every engine component, and the trait boundaries of the external
//! collaborators (graph store, ontology registry, embedding and generation
//! backends, model-backed relationship inference).

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod ontology;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use ontology::{
    OntologyDefinition, OntologyEntityType, OntologySnapshot, RelationshipRule,
    UNRECOGNIZED_TYPE,
};
pub use traits::*;
pub use uuid_utils::{entity_node_id, new_v7};
