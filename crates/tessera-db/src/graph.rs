//! PostgreSQL property graph with per-label pgvector indexes.
//!
//! Nodes carry a label array and a JSONB property bag; the node vector lives
//! in an untyped `vector` column so labels of different dimensions can share
//! the table. Each indexable label gets a partial HNSW index over
//! `embedding::vector(dim)` restricted to rows carrying that label, and a row
//! in `graph_vector_index` recording its name, label, and dimension.

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, instrument};

use tessera_core::{
    vector_index_name, Error, GraphNode, GraphStore, MergeOutcome, PropertyMap, Result,
    VectorMatch,
};

use crate::identifier::validate_identifier;
use crate::pool::create_pool;

/// SQLSTATE for foreign key violations.
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Schema statements applied by [`PgGraphStore::ensure_schema`], in order.
const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE EXTENSION IF NOT EXISTS vector",
    r#"
    CREATE TABLE IF NOT EXISTS graph_node (
        id          TEXT PRIMARY KEY,
        labels      TEXT[] NOT NULL DEFAULT '{}',
        name        TEXT,
        category    TEXT,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        embedding   vector,
        properties  JSONB NOT NULL DEFAULT '{}'::jsonb
    )
    "#,
    "CREATE INDEX IF NOT EXISTS graph_node_labels_idx ON graph_node USING gin (labels)",
    r#"
    CREATE TABLE IF NOT EXISTS graph_edge (
        source_id   TEXT NOT NULL REFERENCES graph_node(id) ON DELETE CASCADE,
        target_id   TEXT NOT NULL REFERENCES graph_node(id) ON DELETE CASCADE,
        rel_type    TEXT NOT NULL,
        properties  JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (source_id, target_id, rel_type)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS graph_edge_target_idx ON graph_edge (target_id)",
    r#"
    CREATE TABLE IF NOT EXISTS graph_vector_index (
        name        TEXT PRIMARY KEY,
        label       TEXT NOT NULL,
        dimension   INTEGER NOT NULL
    )
    "#,
];

/// PostgreSQL implementation of [`GraphStore`].
#[derive(Clone)]
pub struct PgGraphStore {
    pool: Pool<Postgres>,
}

impl PgGraphStore {
    /// Create a new PgGraphStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Connect with the default pool configuration.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    /// Create the graph tables and the pgvector extension if missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
        }
        debug!(
            subsystem = "db",
            component = "graph",
            op = "ensure_schema",
            "Graph schema ready"
        );
        Ok(())
    }

    pub async fn node_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM graph_node")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count)
    }

    pub async fn edge_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM graph_edge")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count)
    }

    /// Count edges of one relationship type.
    pub async fn edge_count_by_type(&self, rel_type: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM graph_edge WHERE rel_type = $1")
            .bind(rel_type)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count)
    }

    async fn lookup_index(&self, index_name: &str) -> Result<(String, i32)> {
        let row = sqlx::query("SELECT label, dimension FROM graph_vector_index WHERE name = $1")
            .bind(index_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or_else(|| Error::IndexNotFound(index_name.to_string()))?;
        Ok((row.get("label"), row.get("dimension")))
    }
}

/// Split a property bag into the dedicated columns and the JSONB remainder.
struct NodeColumns {
    name: Option<String>,
    category: Option<String>,
    created_at: DateTime<Utc>,
    embedding: Option<Vector>,
    properties: JsonValue,
}

impl NodeColumns {
    fn from_properties(mut properties: PropertyMap) -> Self {
        let embedding = properties
            .remove("embedding")
            .and_then(|v| serde_json::from_value::<Vec<f32>>(v).ok())
            .filter(|v| !v.is_empty())
            .map(Vector::from);
        let created_at = properties
            .get("createdAt")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let name = properties
            .get("name")
            .and_then(|v| v.as_str())
            .map(String::from);
        let category = properties
            .get("category")
            .and_then(|v| v.as_str())
            .map(String::from);

        Self {
            name,
            category,
            created_at,
            embedding,
            properties: JsonValue::Object(properties),
        }
    }
}

fn node_from_row(row: &PgRow) -> GraphNode {
    let properties = match row.get::<JsonValue, _>("properties") {
        JsonValue::Object(map) => map,
        _ => PropertyMap::new(),
    };
    let embedding: Option<Vector> = row.get("embedding");
    GraphNode {
        id: row.get("id"),
        labels: row.get("labels"),
        properties,
        embedding: embedding.map(|v| v.to_vec()),
    }
}

fn outcome(inserted: bool) -> MergeOutcome {
    if inserted {
        MergeOutcome::Created
    } else {
        MergeOutcome::Updated
    }
}

#[async_trait]
impl GraphStore for PgGraphStore {
    #[instrument(
        skip(self, embedding),
        fields(subsystem = "db", component = "graph", op = "vector_search", result_count = tracing::field::Empty)
    )]
    async fn vector_search(
        &self,
        index_name: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorMatch>> {
        let start = Instant::now();
        let (label, dimension) = self.lookup_index(index_name).await?;
        validate_identifier(&label)?;

        if embedding.len() != dimension as usize {
            return Err(Error::InvalidInput(format!(
                "Query vector has {} dimensions, index {} expects {}",
                embedding.len(),
                index_name,
                dimension
            )));
        }

        // Label and dimension are spliced so the planner can match the
        // partial index predicate and expression.
        let query = format!(
            r#"
            SELECT id, labels, properties, embedding,
                   1.0 - ((embedding::vector({dim})) <=> $1::vector({dim})) AS score
            FROM graph_node
            WHERE '{label}' = ANY(labels)
              AND embedding IS NOT NULL
              AND vector_dims(embedding) = {dim}
            ORDER BY (embedding::vector({dim})) <=> $1::vector({dim})
            LIMIT $2
            "#,
            dim = dimension,
            label = label
        );

        let rows = sqlx::query(&query)
            .bind(Vector::from(embedding.to_vec()))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let matches: Vec<VectorMatch> = rows
            .iter()
            .map(|row| VectorMatch {
                node: node_from_row(row),
                score: row.get::<f64, _>("score") as f32,
            })
            .collect();

        tracing::Span::current().record("result_count", matches.len());
        debug!(
            index = index_name,
            duration_ms = start.elapsed().as_millis() as u64,
            "Vector search complete"
        );
        Ok(matches)
    }

    #[instrument(skip(self, properties), fields(subsystem = "db", component = "graph", op = "merge_node"))]
    async fn merge_node(
        &self,
        id: &str,
        labels: &[String],
        properties: PropertyMap,
    ) -> Result<MergeOutcome> {
        let columns = NodeColumns::from_properties(properties);

        // Labels keep first-seen order; an existing createdAt survives the
        // JSONB overlay and the created_at column is never updated.
        let inserted: bool = sqlx::query_scalar(
            r#"
            INSERT INTO graph_node (id, labels, name, category, created_at, embedding, properties)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                labels = ARRAY(
                    SELECT l FROM unnest(graph_node.labels || EXCLUDED.labels)
                        WITH ORDINALITY AS t(l, ord)
                    GROUP BY l
                    ORDER BY min(ord)
                ),
                name = COALESCE(EXCLUDED.name, graph_node.name),
                category = COALESCE(EXCLUDED.category, graph_node.category),
                embedding = COALESCE(EXCLUDED.embedding, graph_node.embedding),
                properties = graph_node.properties || (EXCLUDED.properties - 'createdAt')
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(id)
        .bind(labels)
        .bind(columns.name)
        .bind(columns.category)
        .bind(columns.created_at)
        .bind(columns.embedding)
        .bind(columns.properties)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(outcome(inserted))
    }

    #[instrument(skip(self, properties), fields(subsystem = "db", component = "graph", op = "merge_edge"))]
    async fn merge_edge(
        &self,
        source_id: &str,
        target_id: &str,
        rel_type: &str,
        properties: Option<PropertyMap>,
    ) -> Result<MergeOutcome> {
        let properties = JsonValue::Object(properties.unwrap_or_default());

        let result = sqlx::query_scalar::<_, bool>(
            r#"
            INSERT INTO graph_edge (source_id, target_id, rel_type, properties)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (source_id, target_id, rel_type) DO UPDATE SET
                properties = graph_edge.properties || EXCLUDED.properties
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(source_id)
        .bind(target_id)
        .bind(rel_type)
        .bind(properties)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(inserted) => Ok(outcome(inserted)),
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) =>
            {
                Err(Error::NodeNotFound(format!("{} -> {}", source_id, target_id)))
            }
            Err(e) => Err(Error::Database(e)),
        }
    }

    #[instrument(skip(self, properties), fields(subsystem = "db", component = "graph", op = "update_node_properties"))]
    async fn update_node_properties(&self, id: &str, properties: PropertyMap) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE graph_node
            SET properties = properties || ($2::jsonb - 'createdAt'),
                name = COALESCE($2::jsonb ->> 'name', name)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(JsonValue::Object(properties))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NodeNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn get_node(&self, id: &str) -> Result<Option<GraphNode>> {
        let row = sqlx::query("SELECT id, labels, properties, embedding FROM graph_node WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.as_ref().map(node_from_row))
    }

    #[instrument(skip(self), fields(subsystem = "db", component = "graph", op = "ensure_vector_index"))]
    async fn ensure_vector_index(&self, label: &str, dimension: usize) -> Result<()> {
        validate_identifier(label)?;
        let index_name = vector_index_name(label);
        validate_identifier(&index_name)?;
        if dimension == 0 {
            return Err(Error::InvalidInput(format!(
                "Vector index {} needs a positive dimension",
                index_name
            )));
        }

        let ddl = format!(
            r#"
            CREATE INDEX IF NOT EXISTS {name} ON graph_node
            USING hnsw ((embedding::vector({dim})) vector_cosine_ops)
            WHERE '{label}' = ANY(labels)
              AND embedding IS NOT NULL
              AND vector_dims(embedding) = {dim}
            "#,
            name = index_name,
            dim = dimension,
            label = label
        );
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        sqlx::query(
            "INSERT INTO graph_vector_index (name, label, dimension) VALUES ($1, $2, $3)
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(&index_name)
        .bind(label)
        .bind(dimension as i32)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(index = %index_name, dimension, "Vector index ensured");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_core::defaults;

    fn props(value: JsonValue) -> PropertyMap {
        match value {
            JsonValue::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_node_columns_split_embedding_out_of_properties() {
        let columns = NodeColumns::from_properties(props(json!({
            "id": "n1",
            "name": "Alice",
            "category": defaults::DEFAULT_CATEGORY,
            "createdAt": "2026-01-02T03:04:05Z",
            "embedding": [0.1, 0.2, 0.3],
        })));

        assert_eq!(columns.name.as_deref(), Some("Alice"));
        assert_eq!(columns.category.as_deref(), Some("Generic"));
        assert_eq!(columns.created_at.to_rfc3339(), "2026-01-02T03:04:05+00:00");
        assert_eq!(columns.embedding.map(|v| v.to_vec().len()), Some(3));
        assert!(columns.properties.get("embedding").is_none());
        assert_eq!(columns.properties["createdAt"], "2026-01-02T03:04:05Z");
    }

    #[test]
    fn test_node_columns_tolerate_missing_fields() {
        let columns = NodeColumns::from_properties(props(json!({
            "createdAt": "yesterday",
            "embedding": [],
        })));
        assert!(columns.name.is_none());
        assert!(columns.embedding.is_none());
    }

    #[test]
    fn test_outcome_mapping() {
        assert_eq!(outcome(true), MergeOutcome::Created);
        assert_eq!(outcome(false), MergeOutcome::Updated);
    }

    #[test]
    fn test_schema_creates_vector_extension_first() {
        assert!(SCHEMA_STATEMENTS[0].contains("vector"));
        assert!(SCHEMA_STATEMENTS
            .iter()
            .any(|s| s.contains("PRIMARY KEY (source_id, target_id, rel_type)")));
    }
}
