use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name used for log entries emitted by the flow itself rather than a node
pub const FLOW_LOG_NAME: &str = "Flow";

/// Opaque node identifier, assigned sequentially by [`crate::Workflow::add_node`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value of the identifier, when it was issued by the sequential counter
    pub fn sequence(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The fixed set of node types that can be placed on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    /// Entry point of a flow; exactly one per executable graph
    Start,
    /// Terminal node of a flow; exactly one per executable graph
    End,
    /// User-supplied input
    Input,
    /// Text generation call
    Llm,
    /// Tool invocation placeholder
    Tool,
    /// Conversation memory placeholder
    Memory,
    /// Output sink
    Output,
    /// Browser-driven data extraction
    WebScraping,
    /// Structured output shaping
    StructuredOutput,
    /// Embed text and store it in the vector database
    EmbeddingGenerator,
    /// Query the vector database
    SimilaritySearch,
    /// Free-form annotation on the canvas
    TextNote,
    /// A type this build does not know about; executes as a no-op
    #[serde(other)]
    Unknown,
}

impl NodeKind {
    /// Every kind an editor can create
    pub const ALL: [NodeKind; 12] = [
        NodeKind::Start,
        NodeKind::End,
        NodeKind::Input,
        NodeKind::Llm,
        NodeKind::Tool,
        NodeKind::Memory,
        NodeKind::Output,
        NodeKind::WebScraping,
        NodeKind::StructuredOutput,
        NodeKind::EmbeddingGenerator,
        NodeKind::SimilaritySearch,
        NodeKind::TextNote,
    ];

    /// Human-readable name used as the default label
    pub fn display_name(&self) -> &'static str {
        match self {
            NodeKind::Start => "Start",
            NodeKind::End => "End",
            NodeKind::Input => "Input",
            NodeKind::Llm => "LLM",
            NodeKind::Tool => "Tool",
            NodeKind::Memory => "Memory",
            NodeKind::Output => "Output",
            NodeKind::WebScraping => "Web Scraping",
            NodeKind::StructuredOutput => "Structured Output",
            NodeKind::EmbeddingGenerator => "Embedding Generator",
            NodeKind::SimilaritySearch => "Similarity Search",
            NodeKind::TextNote => "Text Note",
            NodeKind::Unknown => "Unknown",
        }
    }

    /// Parameter keys the configuration form offers for this kind
    pub fn parameter_keys(&self) -> &'static [&'static str] {
        match self {
            NodeKind::Llm => &[
                "systemInstruction",
                "userMessage",
                "temperature",
                "maxOutputTokens",
                "topK",
            ],
            NodeKind::WebScraping => &["url", "instruction"],
            NodeKind::EmbeddingGenerator => &["text", "source", "info", "tag", "workflow"],
            NodeKind::SimilaritySearch => &["query", "topK"],
            NodeKind::Input => &["value"],
            NodeKind::TextNote => &["text"],
            _ => &[],
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Canvas position; owned by the editing surface and ignored by execution
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Position {
    /// Horizontal offset
    pub x: f64,
    /// Vertical offset
    pub y: f64,
}

/// A typed node in the workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier, never reused within a workflow
    pub id: NodeId,
    /// Node type; immutable after creation
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Display name; does not affect execution
    #[serde(default)]
    pub label: String,
    /// Parameter values keyed by name. BTreeMap keeps serialization stable.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Canvas position, if the editor recorded one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Node {
    /// Create a node with no parameters
    pub fn new(id: impl Into<NodeId>, kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            parameters: BTreeMap::new(),
            position: None,
        }
    }

    /// Set a parameter value
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Look up a parameter, treating blank values as absent.
    ///
    /// Non-blank values are returned exactly as entered.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Label shown in the run log, falling back to the kind name
    pub fn display_label(&self) -> &str {
        if self.label.trim().is_empty() {
            self.kind.display_name()
        } else {
            &self.label
        }
    }
}

/// Directed connection from one node's output to another's input
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Edge {
    /// Node the edge leaves
    pub source: NodeId,
    /// Node the edge enters
    pub target: NodeId,
}

impl Edge {
    /// Create an edge between two nodes
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Severity of a log entry; front ends style `Error` lines distinctly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Progress or pass-through information
    Info,
    /// A node produced a result
    Success,
    /// Validation failure or failed node
    Error,
}

/// One line of the run log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Node the entry is attributed to; `None` for flow-level diagnostics
    pub node_id: Option<NodeId>,
    /// Node label at the time of execution
    pub node_name: String,
    /// Result text or error message
    pub output: String,
    /// When the entry was appended
    pub timestamp: DateTime<Utc>,
    /// Severity
    pub level: LogLevel,
}

impl LogEntry {
    /// Entry attributed to a node
    pub fn for_node(node: &Node, output: impl Into<String>, level: LogLevel) -> Self {
        Self {
            node_id: Some(node.id.clone()),
            node_name: node.display_label().to_string(),
            output: output.into(),
            timestamp: Utc::now(),
            level,
        }
    }

    /// Entry emitted by the flow itself
    pub fn for_flow(output: impl Into<String>, level: LogLevel) -> Self {
        Self {
            node_id: None,
            node_name: FLOW_LOG_NAME.to_string(),
            output: output.into(),
            timestamp: Utc::now(),
            level,
        }
    }

    /// Whether this entry reports a failure
    pub fn is_error(&self) -> bool {
        self.level == LogLevel::Error
    }
}
