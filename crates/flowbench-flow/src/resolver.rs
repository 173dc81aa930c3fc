//! Derives the linear execution order of a workflow.
//!
//! The walk starts at the single Start node and follows each node's outgoing
//! edge until it reaches the single End node. Nodes not on that path are
//! never executed.

use std::collections::{HashMap, HashSet};

use flowbench_protocol::{Edge, Node, NodeId, NodeKind, Workflow};
use thiserror::Error;
use tracing::debug;

/// Why a graph cannot be executed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No Start node
    #[error("No Start node found. Add a Start node and connect it to the flow.")]
    MissingStart,

    /// No End node
    #[error("No End node found. Add an End node and connect the flow to it.")]
    MissingEnd,

    /// More than one Start node
    #[error("Found {0} Start nodes; a flow must have exactly one.")]
    AmbiguousStart(usize),

    /// More than one End node
    #[error("Found {0} End nodes; a flow must have exactly one.")]
    AmbiguousEnd(usize),

    /// The walk stopped at a node without a usable outgoing edge
    #[error("No path from Start to End: node {node} is not connected to a next node.")]
    DeadEnd {
        /// Last node reached
        node: NodeId,
    },

    /// The walk came back to a node it already visited
    #[error("Cycle detected at node {node}: the flow never reaches End.")]
    Cycle {
        /// First node visited twice
        node: NodeId,
    },
}

fn unique_of_kind(nodes: &[Node], kind: NodeKind) -> Result<Option<&Node>, usize> {
    let mut found = nodes.iter().filter(|n| n.kind == kind);
    let first = found.next();
    let extra = found.count();
    if extra > 0 {
        Err(extra + 1)
    } else {
        Ok(first)
    }
}

/// Compute the execution sequence from Start to End.
///
/// When several edges leave the same node the last one wins. The walk is
/// bounded by the number of nodes.
pub fn resolve<'a>(nodes: &'a [Node], edges: &[Edge]) -> Result<Vec<&'a Node>, ResolveError> {
    let start = unique_of_kind(nodes, NodeKind::Start)
        .map_err(ResolveError::AmbiguousStart)?
        .ok_or(ResolveError::MissingStart)?;
    unique_of_kind(nodes, NodeKind::End)
        .map_err(ResolveError::AmbiguousEnd)?
        .ok_or(ResolveError::MissingEnd)?;

    let by_id: HashMap<&NodeId, &Node> = nodes.iter().map(|n| (&n.id, n)).collect();
    let next: HashMap<&NodeId, &NodeId> = edges.iter().map(|e| (&e.source, &e.target)).collect();

    let mut order = vec![start];
    let mut visited: HashSet<&NodeId> = HashSet::from([&start.id]);
    let mut current = start;

    for _ in 0..nodes.len() {
        if current.kind == NodeKind::End {
            debug!("Resolved execution order of {} nodes", order.len());
            return Ok(order);
        }

        let successor = next
            .get(&current.id)
            .and_then(|id| by_id.get(*id))
            .copied()
            .ok_or_else(|| ResolveError::DeadEnd {
                node: current.id.clone(),
            })?;

        if !visited.insert(&successor.id) {
            return Err(ResolveError::Cycle {
                node: successor.id.clone(),
            });
        }
        order.push(successor);
        current = successor;
    }

    if current.kind == NodeKind::End {
        Ok(order)
    } else {
        Err(ResolveError::Cycle {
            node: current.id.clone(),
        })
    }
}

/// [`resolve`] over a [`Workflow`]
pub fn resolve_workflow(workflow: &Workflow) -> Result<Vec<&Node>, ResolveError> {
    resolve(workflow.nodes(), workflow.edges())
}
