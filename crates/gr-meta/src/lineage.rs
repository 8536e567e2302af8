//! Lineage recorder: persisted edge set plus bounded traversal.
//!
//! Nodes live in `lineage_nodes` under `(schema, name, column)`; edges are
//! unique on `(source_node_id, target_node_id, relationship)`. Traversals
//! load the edge set into a [`LineageGraph`] and walk it breadth-first.

use crate::connection::MetaDb;
use crate::error::{MetaError, MetaResult, MetaResultExt};
use crate::row_helpers::{now_param, parse_col};
use crate::runs::run_status;
use duckdb::{Connection, OptionalExt};
use gr_core::{LineageEdge, LineageGraph, LineageNode, Relationship, TraceDirection, TracedNode};

const TABLE: &str = "lineage_edges";

/// Record `source -> target`. Returns `false` when the edge already existed.
///
/// A referenced run must exist but may already be terminal.
pub fn record_edge(
    db: &MetaDb,
    source: &LineageNode,
    target: &LineageNode,
    relationship: Relationship,
    run_id: Option<i64>,
) -> MetaResult<bool> {
    if let Some(run_id) = run_id {
        run_status(db.conn(), run_id)?;
    }
    let source_id = ensure_node(db, source)?;
    let target_id = ensure_node(db, target)?;

    db.with_conflict_retry("record_edge", |db| {
        if edge_exists(db.conn(), source_id, target_id, relationship)? {
            log::debug!("Lineage edge {source} -[{relationship}]-> {target} already recorded");
            return Ok(Some(false));
        }
        let inserted = db
            .conn()
            .execute(
                "INSERT INTO gr_meta.lineage_edges
                     (source_node_id, target_node_id, relationship, run_id, recorded_at)
                 VALUES (?, ?, ?, ?, CAST(? AS TIMESTAMP))",
                duckdb::params![
                    source_id,
                    target_id,
                    relationship.as_str(),
                    run_id,
                    now_param()
                ],
            )
            .db_context("insert lineage_edges");
        match inserted {
            Ok(_) => {
                log::debug!("Recorded lineage edge {source} -[{relationship}]-> {target}");
                Ok(Some(true))
            }
            Err(e) if e.is_duplicate_key() => Ok(Some(false)),
            Err(e) => Err(e),
        }
    })
}

fn edge_exists(
    conn: &Connection,
    source_id: i64,
    target_id: i64,
    relationship: Relationship,
) -> MetaResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM gr_meta.lineage_edges
             WHERE source_node_id = ? AND target_node_id = ? AND relationship = ?",
            duckdb::params![source_id, target_id, relationship.as_str()],
            |row| row.get(0),
        )
        .optional()
        .db_context("select lineage_edges")?;
    Ok(found.is_some())
}

/// Node id for `node`, inserting the node on first sight.
fn ensure_node(db: &MetaDb, node: &LineageNode) -> MetaResult<i64> {
    db.with_conflict_retry("ensure_lineage_node", |db| {
        if let Some(node_id) = lookup_node_id(db.conn(), node)? {
            return Ok(Some(node_id));
        }
        let inserted = db
            .conn()
            .execute(
                "INSERT INTO gr_meta.lineage_nodes (schema_name, object_name, column_name, created_at)
                 VALUES (?, ?, ?, CAST(? AS TIMESTAMP))",
                duckdb::params![node.schema, node.name, node.column_key(), now_param()],
            )
            .db_context("insert lineage_nodes");
        match inserted {
            Ok(_) => lookup_node_id(db.conn(), node),
            Err(e) if e.is_duplicate_key() => Ok(None),
            Err(e) => Err(e),
        }
    })
}

fn lookup_node_id(conn: &Connection, node: &LineageNode) -> MetaResult<Option<i64>> {
    conn.query_row(
        "SELECT node_id FROM gr_meta.lineage_nodes
         WHERE schema_name = ? AND object_name = ? AND column_name = ?",
        duckdb::params![node.schema, node.name, node.column_key()],
        |row| row.get(0),
    )
    .optional()
    .db_context("select node_id")
}

const EDGE_SELECT: &str = "SELECT s.schema_name, s.object_name, s.column_name,
        t.schema_name, t.object_name, t.column_name, e.relationship, e.run_id
 FROM gr_meta.lineage_edges e
 JOIN gr_meta.lineage_nodes s ON s.node_id = e.source_node_id
 JOIN gr_meta.lineage_nodes t ON t.node_id = e.target_node_id";

type EdgeRow = (String, String, String, String, String, String, String, Option<i64>);

fn node_from_parts(schema: String, name: String, column: String) -> LineageNode {
    LineageNode {
        schema,
        name,
        column: (!column.is_empty()).then_some(column),
    }
}

fn query_edges(
    conn: &Connection,
    sql: &str,
    params: &[&dyn duckdb::ToSql],
) -> MetaResult<Vec<LineageEdge>> {
    let mut stmt = conn.prepare(sql).db_context("prepare lineage edges")?;
    let rows: Vec<EdgeRow> = stmt
        .query_map(params, |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
            ))
        })
        .db_context("lineage edges")?
        .collect::<Result<Vec<_>, _>>()
        .db_context("read lineage_edges")?;

    rows.into_iter()
        .map(|(ss, sn, sc, ts, tn, tc, relationship, run_id)| {
            Ok(LineageEdge {
                source: node_from_parts(ss, sn, sc),
                target: node_from_parts(ts, tn, tc),
                relationship: parse_col(TABLE, &relationship)?,
                run_id,
            })
        })
        .collect()
}

/// Every recorded edge, ordered by source then target.
pub fn list_edges(conn: &Connection) -> MetaResult<Vec<LineageEdge>> {
    let sql = format!(
        "{EDGE_SELECT}
         ORDER BY s.schema_name, s.object_name, s.column_name,
                  t.schema_name, t.object_name, t.column_name, e.relationship"
    );
    query_edges(conn, &sql, &[])
}

/// Edges where `node` is the source or the target.
pub fn edges_for(conn: &Connection, node: &LineageNode) -> MetaResult<Vec<LineageEdge>> {
    let sql = format!(
        "{EDGE_SELECT}
         WHERE (s.schema_name = ? AND s.object_name = ? AND s.column_name = ?)
            OR (t.schema_name = ? AND t.object_name = ? AND t.column_name = ?)
         ORDER BY s.schema_name, s.object_name, s.column_name,
                  t.schema_name, t.object_name, t.column_name, e.relationship"
    );
    let column = node.column_key();
    query_edges(
        conn,
        &sql,
        duckdb::params![node.schema, node.name, column, node.schema, node.name, column],
    )
}

/// The whole persisted edge set as an in-memory graph.
pub fn lineage_graph(conn: &Connection) -> MetaResult<LineageGraph> {
    Ok(LineageGraph::from_edges(&list_edges(conn)?))
}

/// Nodes reachable from `node` in `direction`, breadth-first.
///
/// `max_depth` of `None` uses the configured default; any depth is capped
/// at the configured limit.
pub fn trace(
    db: &MetaDb,
    node: &LineageNode,
    direction: TraceDirection,
    max_depth: Option<usize>,
) -> MetaResult<Vec<TracedNode>> {
    let config = db.lineage_config();
    let depth = LineageGraph::effective_depth(
        max_depth,
        config.default_max_depth,
        config.max_depth_limit,
    );
    if max_depth.is_some_and(|requested| requested > depth) {
        log::debug!("Lineage depth {max_depth:?} capped at {depth}");
    }
    let graph = lineage_graph(db.conn())?;
    Ok(graph.trace(node, direction, depth))
}

/// What feeds `node`.
pub fn trace_upstream(
    db: &MetaDb,
    node: &LineageNode,
    max_depth: Option<usize>,
) -> MetaResult<Vec<TracedNode>> {
    trace(db, node, TraceDirection::Upstream, max_depth)
}

/// What `node` feeds.
pub fn trace_downstream(
    db: &MetaDb,
    node: &LineageNode,
    max_depth: Option<usize>,
) -> MetaResult<Vec<TracedNode>> {
    trace(db, node, TraceDirection::Downstream, max_depth)
}

/// Fail unless `node` appears in at least one edge.
pub fn require_node(conn: &Connection, node: &LineageNode) -> MetaResult<()> {
    match lookup_node_id(conn, node)? {
        Some(_) => Ok(()),
        None => Err(MetaError::InvalidInput(format!(
            "lineage node {node} has never been recorded"
        ))),
    }
}

#[cfg(test)]
#[path = "lineage_test.rs"]
mod tests;
