//! Lineage graph: typed edges between named data artifacts and
//! bounded-depth provenance traversal.
//!
//! Nothing prevents a cycle in the recorded edge set, so traversal never
//! recurses and never walks further than `max_depth` hops.

use crate::error::{CoreError, CoreResult};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

/// Default traversal depth when a caller does not pass one.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// A named data artifact: `schema.name` or `schema.name.column`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineageNode {
    pub schema: String,
    pub name: String,
    /// Column, when the edge is column-level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl LineageNode {
    /// A table/view-level node.
    pub fn table(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            column: None,
        }
    }

    /// A column-level node.
    pub fn column(
        schema: impl Into<String>,
        name: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            column: Some(column.into()),
        }
    }

    /// Column as stored: empty when absent so the natural key has no NULLs.
    pub fn column_key(&self) -> &str {
        self.column.as_deref().unwrap_or("")
    }
}

impl std::fmt::Display for LineageNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.column {
            Some(column) => write!(f, "{}.{}.{}", self.schema, self.name, column),
            None => write!(f, "{}.{}", self.schema, self.name),
        }
    }
}

impl FromStr for LineageNode {
    type Err = CoreError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = spec.split('.').collect();
        if parts.iter().any(|p| p.trim().is_empty() || p.trim() != *p) {
            return Err(CoreError::InvalidNode {
                spec: spec.to_string(),
                reason: "empty or padded segment".to_string(),
            });
        }
        match parts.as_slice() {
            [schema, name] => Ok(LineageNode::table(*schema, *name)),
            [schema, name, column] => Ok(LineageNode::column(*schema, *name, *column)),
            _ => Err(CoreError::InvalidNode {
                spec: spec.to_string(),
                reason: "expected schema.name or schema.name.column".to_string(),
            }),
        }
    }
}

/// Kind of relationship an edge asserts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relationship {
    Copies,
    Transforms,
    Joins,
    Aggregates,
    DerivesFrom,
    References,
}

impl Relationship {
    pub const ALL: [Relationship; 6] = [
        Relationship::Copies,
        Relationship::Transforms,
        Relationship::Joins,
        Relationship::Aggregates,
        Relationship::DerivesFrom,
        Relationship::References,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::Copies => "COPIES",
            Relationship::Transforms => "TRANSFORMS",
            Relationship::Joins => "JOINS",
            Relationship::Aggregates => "AGGREGATES",
            Relationship::DerivesFrom => "DERIVES_FROM",
            Relationship::References => "REFERENCES",
        }
    }
}

impl std::fmt::Display for Relationship {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relationship {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Relationship::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "relationship",
                value: s.to_string(),
            })
    }
}

/// A directed edge `source -> target`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEdge {
    pub source: LineageNode,
    pub target: LineageNode,
    pub relationship: Relationship,
    /// Ingest run (or session) that produced the transformation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<i64>,
}

/// Traversal direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceDirection {
    /// What feeds this node
    Upstream,
    /// What this node feeds
    Downstream,
}

impl TraceDirection {
    fn petgraph(self) -> Direction {
        match self {
            TraceDirection::Upstream => Direction::Incoming,
            TraceDirection::Downstream => Direction::Outgoing,
        }
    }
}

/// A node reached by a traversal, with its hop distance from the start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracedNode {
    pub node: LineageNode,
    pub depth: usize,
}

/// In-memory arena of lineage nodes with an adjacency index
#[derive(Debug, Default)]
pub struct LineageGraph {
    graph: DiGraph<LineageNode, Relationship>,
    node_map: HashMap<LineageNode, NodeIndex>,
    edge_keys: HashSet<(NodeIndex, NodeIndex, Relationship)>,
}

impl LineageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from an edge list.
    pub fn from_edges<'a>(edges: impl IntoIterator<Item = &'a LineageEdge>) -> Self {
        let mut graph = Self::new();
        for edge in edges {
            graph.add_edge(&edge.source, &edge.target, edge.relationship);
        }
        graph
    }

    /// Add a node, returning its index.
    pub fn add_node(&mut self, node: &LineageNode) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(node) {
            return idx;
        }
        let idx = self.graph.add_node(node.clone());
        self.node_map.insert(node.clone(), idx);
        idx
    }

    /// Add an edge. Returns `false` when the same typed edge already exists.
    pub fn add_edge(
        &mut self,
        source: &LineageNode,
        target: &LineageNode,
        relationship: Relationship,
    ) -> bool {
        let from = self.add_node(source);
        let to = self.add_node(target);
        if !self.edge_keys.insert((from, to, relationship)) {
            return false;
        }
        self.graph.add_edge(from, to, relationship);
        true
    }

    pub fn contains(&self, node: &LineageNode) -> bool {
        self.node_map.contains_key(node)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Nodes feeding `node`, up to `max_depth` hops.
    pub fn upstream(&self, node: &LineageNode, max_depth: usize) -> Vec<TracedNode> {
        self.trace(node, TraceDirection::Upstream, max_depth)
    }

    /// Nodes fed by `node`, up to `max_depth` hops.
    pub fn downstream(&self, node: &LineageNode, max_depth: usize) -> Vec<TracedNode> {
        self.trace(node, TraceDirection::Downstream, max_depth)
    }

    /// Level-by-level BFS from `node`.
    ///
    /// Output is ordered by depth, then by node display name within a level.
    /// The start node is never part of the result, and each node appears at
    /// most once (at its shallowest depth), so cycles terminate.
    pub fn trace(
        &self,
        node: &LineageNode,
        direction: TraceDirection,
        max_depth: usize,
    ) -> Vec<TracedNode> {
        let Some(&start) = self.node_map.get(node) else {
            return Vec::new();
        };
        let dir = direction.petgraph();

        let mut result = Vec::new();
        let mut visited = HashSet::from([start]);
        let mut frontier = vec![start];

        for depth in 1..=max_depth {
            let mut level = Vec::new();
            for &current in &frontier {
                for edge in self.graph.edges_directed(current, dir) {
                    let neighbor = match dir {
                        Direction::Incoming => edge.source(),
                        Direction::Outgoing => edge.target(),
                    };
                    if visited.insert(neighbor) {
                        level.push(neighbor);
                    }
                }
            }
            if level.is_empty() {
                break;
            }
            level.sort_by_cached_key(|idx| self.graph[*idx].to_string());
            result.extend(level.iter().map(|&idx| TracedNode {
                node: self.graph[idx].clone(),
                depth,
            }));
            frontier = level;
        }

        result
    }

    /// Resolve a caller's requested depth against the configured default and cap.
    pub fn effective_depth(requested: Option<usize>, default: usize, limit: usize) -> usize {
        requested.unwrap_or(default).min(limit)
    }
}

/// Parse a node spec, mapping failures into [`CoreError::InvalidNode`].
pub fn parse_node(spec: &str) -> CoreResult<LineageNode> {
    spec.parse()
}

#[cfg(test)]
#[path = "lineage_test.rs"]
mod tests;
