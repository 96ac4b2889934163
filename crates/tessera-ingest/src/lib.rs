//! # tessera-ingest
//!
//! Knowledge-graph ingestion and entity resolution.
//!
//! A batch of extracted entities and relationships goes through four stages,
//! each built on the one before it:
//!
//! - [`TypeResolver`] classifies raw type labels against an ontology snapshot.
//! - [`EntityResolver`] dedups entities against existing nodes by vector
//!   similarity, creates the rest, and folds property entities onto their
//!   owners.
//! - [`RelationshipWriter`] writes edges between resolved nodes and links them
//!   to the batch's container node.
//! - [`InferenceEngine`] proposes extra relationships from ontology rules and
//!   an optional model pass.
//!
//! [`IngestionPipeline`] wires them together.

pub mod config;
pub mod entity_writer;
pub mod folding;
pub mod inference;
pub mod naming;
pub mod pipeline;
pub mod relationship_writer;
pub mod resolver;

pub use tessera_core::*;

pub use config::{FlattenPolicy, IngestConfig};
pub use entity_writer::{skip_reason, EntityResolver, SkipReason};
pub use folding::{flatten_enriched, fold_value, PropertyFolds};
pub use inference::{InferenceEngine, InferenceOutcome, InferencePhase};
pub use naming::{additional_key, fold_key, normalize_rel_type};
pub use pipeline::IngestionPipeline;
pub use relationship_writer::RelationshipWriter;
pub use resolver::{TypeClassification, TypeResolver};
