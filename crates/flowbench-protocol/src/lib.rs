//! FlowBench Protocol - Core types shared by every FlowBench crate
//!
//! This crate provides the workflow graph model edited by the canvas, the run
//! log produced by the flow engine, and the request/response shapes spoken to
//! the remote services.
//!
//! # Core Types
//!
//! - [`Node`] / [`NodeKind`] - A typed unit of work or marker on the canvas
//! - [`Edge`] - A directed connection from one node to the next
//! - [`Workflow`] - The editable graph; enforces at most one outgoing edge per node
//! - [`WorkflowDocument`] - The persisted workflow file layout
//! - [`LogEntry`] - One line of the run log
//!
//! # Example
//!
//! ```rust
//! use flowbench_protocol::{NodeKind, Workflow};
//!
//! let mut workflow = Workflow::new();
//! let start = workflow.add_node(NodeKind::Start, "Start");
//! let llm = workflow.add_node(NodeKind::Llm, "Summarize");
//! let end = workflow.add_node(NodeKind::End, "End");
//!
//! workflow.connect(&start, &llm).unwrap();
//! workflow.connect(&llm, &end).unwrap();
//! workflow.set_parameter(&llm, "userMessage", "Hi").unwrap();
//!
//! let json = workflow.to_json().unwrap();
//! let restored = Workflow::from_json(&json).unwrap();
//! assert_eq!(restored.nodes().len(), 3);
//! ```

#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Editable workflow graph and its persisted document
pub mod graph;
/// Node, edge and log models
pub mod models;
/// Request and response bodies of the remote services
pub mod wire;

pub use graph::*;
pub use models::*;
