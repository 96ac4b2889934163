//! Structured logging schema and field name constants for tessera.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation can query every subsystem by the same names.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Batch aborted, requires operator attention |
//! | WARN  | Entity skipped, relationship dropped, inference degraded |
//! | INFO  | Lifecycle events, batch completions with statistics |
//! | DEBUG | Dedup decisions, folding, intermediate values |
//! | TRACE | Per-item iteration (vector hits, edge writes) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "ingest", "db", "inference", "extraction"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "type_resolver", "entity_writer", "relationship_writer", "inference_engine"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "resolve", "merge_node", "vector_search", "infer"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Container/unit id of the batch being ingested.
pub const BATCH_ID: &str = "batch_id";

/// Extractor-local entity id.
pub const ENTITY_ID: &str = "entity_id";

/// Persisted node id.
pub const NODE_ID: &str = "node_id";

/// Raw or canonical entity type.
pub const ENTITY_TYPE: &str = "entity_type";

/// Graph label (also used for vector index selection).
pub const LABEL: &str = "label";

/// Normalized relationship type.
pub const REL_TYPE: &str = "rel_type";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a search or query.
pub const RESULT_COUNT: &str = "result_count";

/// Similarity score of a vector hit.
pub const SCORE: &str = "score";

/// Number of input texts sent to an embedding endpoint.
pub const INPUT_COUNT: &str = "input_count";

/// Retry attempt number for HTTP calls.
pub const ATTEMPT: &str = "attempt";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

/// Byte length of a prompt.
pub const PROMPT_LEN: &str = "prompt_len";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
