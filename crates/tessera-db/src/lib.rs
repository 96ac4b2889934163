//! # tessera-db
//!
//! Graph store implementations for tessera.
//!
//! This crate provides:
//! - Connection pool management
//! - [`PgGraphStore`]: property graph on PostgreSQL with per-label pgvector
//!   HNSW indexes
//! - [`MemoryGraphStore`]: in-process store with exact cosine search, used for
//!   dry runs and tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use tessera_db::PgGraphStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PgGraphStore::connect("postgres://localhost/tessera").await?;
//!     store.ensure_schema().await?;
//!     Ok(())
//! }
//! ```

pub mod graph;
pub mod identifier;
pub mod memory;
pub mod pool;

// Re-export core types
pub use tessera_core::*;

pub use graph::PgGraphStore;
pub use identifier::validate_identifier;
pub use memory::{cosine_similarity, property_map, MemoryGraphStore};
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
