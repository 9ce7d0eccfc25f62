//! `GraphSink` contract, implemented on top of Postgres: the property graph
//! is represented as two tables (`graph_nodes`, `graph_edges`) upserted with
//! `INSERT ... ON CONFLICT ... DO UPDATE`, using the `xmax = 0` trick to
//! distinguish created from updated rows.
//!
//! No neo4j-family driver crate is available in this dependency stack, and
//! `petgraph` is in-memory-only and unsuited to a durable, cross-process
//! graph store, so this relational upsert is the grounded choice (see
//! DESIGN.md).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    pub nodes_deleted: i64,
    pub edges_deleted: i64,
}

#[async_trait]
pub trait GraphSink: Send + Sync {
    async fn upsert_node(&self, label: &str, key: &Value, properties: &Value) -> Result<UpsertOutcome>;
    async fn upsert_edge(
        &self,
        from_label: &str,
        from_key: &Value,
        to_label: &str,
        to_key: &Value,
        edge_type: &str,
        properties: &Value,
    ) -> Result<UpsertOutcome>;
    async fn delete_file(&self, codebase_id: &str, path: &str) -> Result<DeleteOutcome>;
}

/// Reuses the engine's own Postgres pool.
pub struct PgGraphSink {
    pool: PgPool,
}

impl PgGraphSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GraphSink for PgGraphSink {
    async fn upsert_node(&self, label: &str, key: &Value, properties: &Value) -> Result<UpsertOutcome> {
        let row: (bool,) = sqlx::query_as(
            "INSERT INTO graph_nodes (label, key, properties) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (label, key) DO UPDATE SET properties = $3, updated_at = now() \
             RETURNING (xmax = 0)",
        )
        .bind(label)
        .bind(key)
        .bind(properties)
        .fetch_one(&self.pool)
        .await
        .context("failed to upsert graph node")?;

        Ok(if row.0 {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn upsert_edge(
        &self,
        from_label: &str,
        from_key: &Value,
        to_label: &str,
        to_key: &Value,
        edge_type: &str,
        properties: &Value,
    ) -> Result<UpsertOutcome> {
        let row: (bool,) = sqlx::query_as(
            "INSERT INTO graph_edges \
                (from_label, from_key, to_label, to_key, edge_type, properties) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (from_label, from_key, to_label, to_key, edge_type) \
             DO UPDATE SET properties = $6, updated_at = now() \
             RETURNING (xmax = 0)",
        )
        .bind(from_label)
        .bind(from_key)
        .bind(to_label)
        .bind(to_key)
        .bind(edge_type)
        .bind(properties)
        .fetch_one(&self.pool)
        .await
        .context("failed to upsert graph edge")?;

        Ok(if row.0 {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        })
    }

    /// Detach-deletes the `File` node, its outgoing `DEFINES` edges, and any
    /// `Symbol` node keyed to this file (symbol keys embed `codebase_id` and
    /// `file`, so a symbol is only ever defined by one file in this schema).
    async fn delete_file(&self, codebase_id: &str, path: &str) -> Result<DeleteOutcome> {
        let file_key = serde_json::json!({ "codebase_id": codebase_id, "path": path });

        let symbols = sqlx::query(
            "DELETE FROM graph_nodes \
             WHERE label = 'Symbol' \
               AND key->>'codebase_id' = $1 \
               AND key->>'file' = $2",
        )
        .bind(codebase_id)
        .bind(path)
        .execute(&self.pool)
        .await
        .context("failed to delete symbol nodes for file")?;

        let edges = sqlx::query(
            "DELETE FROM graph_edges WHERE from_label = 'File' AND from_key = $1 AND edge_type = 'DEFINES'",
        )
        .bind(&file_key)
        .execute(&self.pool)
        .await
        .context("failed to delete DEFINES edges for file")?;

        let file_node = sqlx::query("DELETE FROM graph_nodes WHERE label = 'File' AND key = $1")
            .bind(&file_key)
            .execute(&self.pool)
            .await
            .context("failed to delete file node")?;

        Ok(DeleteOutcome {
            nodes_deleted: symbols.rows_affected() as i64 + file_node.rows_affected() as i64,
            edges_deleted: edges.rows_affected() as i64,
        })
    }
}
