use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use flowbench_protocol::{LogEntry, LogLevel, Node, NodeId, Workflow};
use flowbench_services::RemoteServices;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::executor::execute_node;
use crate::resolver::resolve_workflow;
use crate::FlowError;

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No run has started yet
    Idle,
    /// Computing the execution order
    Resolving,
    /// Executing nodes
    Running,
    /// Every node succeeded
    Completed,
    /// Validation failed or a node failed
    Failed,
}

impl RunState {
    /// Whether a run is in flight
    pub fn is_busy(&self) -> bool {
        matches!(self, RunState::Resolving | RunState::Running)
    }

    /// Whether a run reached its final state
    pub fn is_finished(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}

/// Progress notifications for front ends
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// The run moved to a new state
    StateChanged(RunState),
    /// A node is about to execute
    NodeStarted {
        /// Executing node
        node_id: NodeId,
        /// Its label
        node_name: String,
    },
    /// A log entry was appended
    EntryAppended(LogEntry),
}

/// Summary of one finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Timestamped run identifier
    pub run_id: String,
    /// Terminal state, `Completed` or `Failed`
    pub state: RunState,
    /// The full log of the run
    pub entries: Vec<LogEntry>,
    /// When the run was triggered
    pub started_at: DateTime<Utc>,
    /// When it reached its terminal state
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Whether every node succeeded
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Completed
    }
}

fn lock_state(state: &Mutex<RunState>) -> MutexGuard<'_, RunState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Marks a run Failed if its future is dropped while still busy
struct RunGuard {
    state: Arc<Mutex<RunState>>,
    events: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut state = lock_state(&self.state);
        if state.is_busy() {
            warn!("Run dropped while {:?}; marking it failed", *state);
            *state = RunState::Failed;
            if let Some(sender) = &self.events {
                let _ = sender.send(RunEvent::StateChanged(RunState::Failed));
            }
        }
    }
}

/// Orchestrates resolver and executors, owns the run state and the log.
///
/// Clones share state, so a clone can observe or be rejected by a run that
/// another clone started. Dropping a run future mid-flight settles the state
/// to `Failed`.
#[derive(Clone)]
pub struct RunController {
    services: Arc<dyn RemoteServices>,
    // Never held across an await
    state: Arc<Mutex<RunState>>,
    log: Arc<RwLock<Vec<LogEntry>>>,
    events: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl RunController {
    /// Create an idle controller
    pub fn new(services: Arc<dyn RemoteServices>) -> Self {
        Self {
            services,
            state: Arc::new(Mutex::new(RunState::Idle)),
            log: Arc::new(RwLock::new(Vec::new())),
            events: None,
        }
    }

    /// Send progress events to `sender`
    pub fn with_events(mut self, sender: mpsc::UnboundedSender<RunEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Current state
    pub async fn state(&self) -> RunState {
        *lock_state(&self.state)
    }

    /// Snapshot of the log
    pub async fn log(&self) -> Vec<LogEntry> {
        self.log.read().await.clone()
    }

    /// Clear the log; refused while a run is in flight
    pub async fn clear_log(&self) -> Result<(), FlowError> {
        let mut log = self.log.write().await;
        if lock_state(&self.state).is_busy() {
            return Err(FlowError::RunInProgress);
        }
        log.clear();
        Ok(())
    }

    /// Execute `workflow` from Start to End, stopping at the first failure.
    ///
    /// Validation and node failures are recorded in the log and reflected in
    /// the report's state; the only error returned is a rejected re-entry.
    #[instrument(skip(self, workflow), fields(nodes = workflow.nodes().len()))]
    pub async fn run(&self, workflow: &Workflow) -> Result<RunReport, FlowError> {
        let started_at = Utc::now();
        {
            let mut state = lock_state(&self.state);
            if state.is_busy() {
                warn!("Rejecting run request: a run is already in progress");
                return Err(FlowError::RunInProgress);
            }
            *state = RunState::Resolving;
        }
        let _guard = RunGuard {
            state: self.state.clone(),
            events: self.events.clone(),
        };
        self.emit(RunEvent::StateChanged(RunState::Resolving));
        self.log.write().await.clear();

        let run_id = new_run_id(started_at);
        info!("Starting run {}", run_id);

        let sequence = match resolve_workflow(workflow) {
            Ok(sequence) => sequence,
            Err(e) => {
                warn!("Flow is not executable: {}", e);
                self.append(LogEntry::for_flow(e.to_string(), LogLevel::Error))
                    .await;
                return Ok(self.finish(run_id, started_at, RunState::Failed).await);
            }
        };

        self.set_state(RunState::Running).await;

        let Some((start, rest)) = sequence.split_first() else {
            return Ok(self.finish(run_id, started_at, RunState::Failed).await);
        };
        self.emit(RunEvent::NodeStarted {
            node_id: start.id.clone(),
            node_name: start.display_label().to_string(),
        });
        self.append(LogEntry::for_node(
            start,
            format!("Flow started with {} nodes", sequence.len()),
            LogLevel::Info,
        ))
        .await;

        for node in rest {
            if !self.execute(node).await {
                return Ok(self.finish(run_id, started_at, RunState::Failed).await);
            }
        }

        Ok(self.finish(run_id, started_at, RunState::Completed).await)
    }

    /// Execute one node and log the outcome; returns false on failure
    async fn execute(&self, node: &Node) -> bool {
        self.emit(RunEvent::NodeStarted {
            node_id: node.id.clone(),
            node_name: node.display_label().to_string(),
        });
        info!("Executing node {} ({})", node.id, node.kind);

        match execute_node(node, self.services.as_ref()).await {
            Ok(output) => {
                self.append(LogEntry::for_node(node, output.text, output.level))
                    .await;
                true
            }
            Err(e) => {
                error!("Node {} failed: {}", node.id, e);
                self.append(LogEntry::for_node(node, format!("Error: {}", e), LogLevel::Error))
                    .await;
                false
            }
        }
    }

    async fn append(&self, entry: LogEntry) {
        self.log.write().await.push(entry.clone());
        self.emit(RunEvent::EntryAppended(entry));
    }

    async fn set_state(&self, state: RunState) {
        *lock_state(&self.state) = state;
        self.emit(RunEvent::StateChanged(state));
    }

    async fn finish(&self, run_id: String, started_at: DateTime<Utc>, state: RunState) -> RunReport {
        let entries = self.log.read().await.clone();
        *lock_state(&self.state) = state;
        self.emit(RunEvent::StateChanged(state));
        info!("Run {} finished: {:?} after {} log entries", run_id, state, entries.len());

        RunReport {
            run_id,
            state,
            entries,
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn emit(&self, event: RunEvent) {
        if let Some(sender) = &self.events {
            // A dropped receiver only means nobody is watching
            let _ = sender.send(event);
        }
    }
}

fn new_run_id(now: DateTime<Utc>) -> String {
    let uuid = Uuid::new_v4().to_string();
    format!("{}_{}", now.format("%Y-%m-%dT%H-%M-%SZ"), &uuid[..8])
}
