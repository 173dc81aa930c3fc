//! The editable workflow graph.
//!
//! [`Workflow`] is the only way nodes and edges are created or changed, so the
//! single-outgoing-edge rule is enforced here rather than by whatever editor
//! happens to drive it. The flow engine only ever reads a workflow.

use crate::models::{Edge, Node, NodeId, NodeKind};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Version tag written into every saved workflow document
pub const WORKFLOW_DOCUMENT_VERSION: &str = "1.0";

/// Errors raised while editing, importing or exporting a workflow
#[derive(Debug, Error)]
pub enum GraphError {
    /// Referenced node does not exist
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Edge from a node to itself
    #[error("Node {0} cannot be connected to itself")]
    SelfLoop(NodeId),

    /// Two nodes share an id
    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),

    /// Edge endpoint is not a node of the workflow
    #[error("Edge {from} -> {to} references a missing node")]
    DanglingEdge {
        /// Source of the offending edge
        from: NodeId,
        /// Target of the offending edge
        to: NodeId,
    },

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading or writing a workflow file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persisted layout of a workflow file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDocument {
    /// Document format version
    #[serde(default = "default_version")]
    pub version: String,
    /// All nodes on the canvas
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// All connections
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Next value of the id counter; derived from the nodes when missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_node_id: Option<u64>,
}

fn default_version() -> String {
    WORKFLOW_DOCUMENT_VERSION.to_string()
}

/// A node/edge graph with at most one outgoing edge per node
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    next_node_id: u64,
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

impl Workflow {
    /// Create an empty workflow
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            next_node_id: 1,
        }
    }

    /// All nodes, in creation order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All edges, in insertion order
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Id that the next [`Workflow::add_node`] call will assign
    pub fn next_node_id(&self) -> u64 {
        self.next_node_id
    }

    /// Look up a node by id
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// The outgoing edge of a node, if any
    pub fn outgoing(&self, id: &NodeId) -> Option<&Edge> {
        self.edges.iter().find(|e| &e.source == id)
    }

    /// Add a node and return its freshly assigned id
    pub fn add_node(&mut self, kind: NodeKind, label: impl Into<String>) -> NodeId {
        let id = NodeId::new(self.next_node_id.to_string());
        self.next_node_id += 1;
        self.nodes.push(Node::new(id.clone(), kind, label));
        debug!("Added {} node {}", kind, id);
        id
    }

    /// Remove a node together with every edge touching it
    pub fn remove_node(&mut self, id: &NodeId) -> Result<Node, GraphError> {
        let index = self
            .nodes
            .iter()
            .position(|n| &n.id == id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;
        self.edges.retain(|e| &e.source != id && &e.target != id);
        Ok(self.nodes.remove(index))
    }

    /// Connect `source` to `target`.
    ///
    /// A node has at most one outgoing edge: if `source` already has one it is
    /// replaced and returned.
    pub fn connect(&mut self, source: &NodeId, target: &NodeId) -> Result<Option<Edge>, GraphError> {
        self.require_node(source)?;
        self.require_node(target)?;
        if source == target {
            return Err(GraphError::SelfLoop(source.clone()));
        }

        let replaced = self.disconnect(source);
        if let Some(old) = &replaced {
            debug!("Replacing edge {} -> {} with {} -> {}", old.source, old.target, source, target);
        }
        self.edges.push(Edge::new(source.clone(), target.clone()));
        Ok(replaced)
    }

    /// Remove the outgoing edge of `source`, returning it
    pub fn disconnect(&mut self, source: &NodeId) -> Option<Edge> {
        let index = self.edges.iter().position(|e| &e.source == source)?;
        Some(self.edges.remove(index))
    }

    /// Set one parameter of a node
    pub fn set_parameter(
        &mut self,
        id: &NodeId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), GraphError> {
        let node = self.node_mut(id)?;
        node.parameters.insert(key.into(), value.into());
        Ok(())
    }

    /// Rename a node
    pub fn set_label(&mut self, id: &NodeId, label: impl Into<String>) -> Result<(), GraphError> {
        self.node_mut(id)?.label = label.into();
        Ok(())
    }

    fn require_node(&self, id: &NodeId) -> Result<(), GraphError> {
        if self.node(id).is_some() {
            Ok(())
        } else {
            Err(GraphError::NodeNotFound(id.clone()))
        }
    }

    fn node_mut(&mut self, id: &NodeId) -> Result<&mut Node, GraphError> {
        self.nodes
            .iter_mut()
            .find(|n| &n.id == id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))
    }

    /// Snapshot the workflow as a persistable document
    pub fn to_document(&self) -> WorkflowDocument {
        WorkflowDocument {
            version: WORKFLOW_DOCUMENT_VERSION.to_string(),
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            next_node_id: Some(self.next_node_id),
        }
    }

    /// Build a workflow from a document.
    ///
    /// Edges must reference existing nodes and may not be self-loops. When a
    /// node has several outgoing edges only the last one is kept.
    pub fn from_document(document: WorkflowDocument) -> Result<Self, GraphError> {
        let mut seen = HashSet::new();
        for node in &document.nodes {
            if !seen.insert(node.id.clone()) {
                return Err(GraphError::DuplicateNode(node.id.clone()));
            }
        }

        let mut edges: Vec<Edge> = Vec::with_capacity(document.edges.len());
        for edge in document.edges {
            if !seen.contains(&edge.source) || !seen.contains(&edge.target) {
                return Err(GraphError::DanglingEdge {
                    from: edge.source,
                    to: edge.target,
                });
            }
            if edge.source == edge.target {
                return Err(GraphError::SelfLoop(edge.source));
            }
            if let Some(index) = edges.iter().position(|e| e.source == edge.source) {
                let dropped = edges.remove(index);
                warn!(
                    "Node {} has more than one outgoing edge; dropping {} -> {}",
                    dropped.source, dropped.source, dropped.target
                );
            }
            edges.push(edge);
        }

        let derived_next = document
            .nodes
            .iter()
            .filter_map(|n| n.id.sequence())
            .max()
            .map_or(1, |max| max + 1);
        let next_node_id = document
            .next_node_id
            .map_or(derived_next, |stored| stored.max(derived_next));

        Ok(Self {
            nodes: document.nodes,
            edges,
            next_node_id,
        })
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    /// Parse a workflow from JSON
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let document: WorkflowDocument = serde_json::from_str(json)?;
        Self::from_document(document)
    }

    /// Load a workflow file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Write the workflow to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), GraphError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
