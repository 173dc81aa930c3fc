//! Flow Execution Engine
//!
//! Turns a node/edge graph into a linear run: the [`resolver`] walks from
//! Start to End, the [`executor`] performs each node's remote call, and the
//! [`RunController`] sequences them, keeps the log and stops at the first
//! failure.

#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Run orchestration and state
pub mod controller;
/// Per-node-type execution
pub mod executor;
/// Execution order resolution
pub mod resolver;

pub use controller::{RunController, RunEvent, RunReport, RunState};
pub use executor::{execute_node, ExecutorError, NodeOutput};
pub use resolver::{resolve, resolve_workflow, ResolveError};

use thiserror::Error;

/// Errors returned by the run controller itself
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// A run was requested while another one is resolving or running
    #[error("A run is already in progress")]
    RunInProgress,
}
