//! Per-node-type execution.
//!
//! Each executable kind turns the node's parameters into one remote call and
//! formats the response as log text. Every failure, local or remote, comes
//! back as an [`ExecutorError`].

use std::fmt::Write as _;
use std::str::FromStr;

use flowbench_protocol::wire::{
    EmbedRequest, EmbedResponse, ExtractionRequest, ExtractionResponse, GenerationRequest,
    SearchRequest, SearchResponse,
};
use flowbench_protocol::{LogLevel, Node, NodeKind};
use flowbench_services::{RemoteServices, ServiceError};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

/// Default LLM sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Default LLM output token limit
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1024;
/// Default LLM top-k
pub const DEFAULT_LLM_TOP_K: u32 = 40;
/// Default number of similarity search matches
pub const DEFAULT_SEARCH_TOP_K: u32 = 5;
/// Characters of matched text shown per search hit
pub const SNIPPET_CHARS: usize = 200;

/// Failure of a single node
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// A required parameter is blank or absent
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// A parameter is present but unusable
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter key
        name: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// The remote call failed
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The remote call succeeded but lacked data the node needs
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// Text a node contributes to the run log
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutput {
    /// Log text
    pub text: String,
    /// Severity of the log line
    pub level: LogLevel,
}

impl NodeOutput {
    fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: LogLevel::Info,
        }
    }

    fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: LogLevel::Success,
        }
    }
}

/// Run one node against the remote services
pub async fn execute_node(
    node: &Node,
    services: &dyn RemoteServices,
) -> Result<NodeOutput, ExecutorError> {
    debug!("Executing {} node {}", node.kind, node.id);
    match node.kind {
        // The run controller logs its own start marker; this serves direct callers
        NodeKind::Start => Ok(NodeOutput::info("Flow starting")),
        NodeKind::End => Ok(NodeOutput::success("Flow completed successfully")),
        NodeKind::Llm => run_llm(node, services).await,
        NodeKind::WebScraping => run_web_scraping(node, services).await,
        NodeKind::EmbeddingGenerator => run_embedding(node, services).await,
        NodeKind::SimilaritySearch => run_similarity_search(node, services).await,
        NodeKind::Input => Ok(NodeOutput::info(match node.parameter("value") {
            Some(value) => format!("Input: {}", value),
            None => "Input passed through".to_string(),
        })),
        NodeKind::Tool
        | NodeKind::Memory
        | NodeKind::Output
        | NodeKind::StructuredOutput => Ok(NodeOutput::info(format!(
            "{} node passed through",
            node.kind
        ))),
        NodeKind::TextNote => Ok(NodeOutput::info("Note skipped")),
        NodeKind::Unknown => {
            warn!("Node {} has an unsupported type; skipping", node.id);
            Ok(NodeOutput::info("Unsupported node type; nothing to execute"))
        }
    }
}

fn required<'a>(node: &'a Node, key: &'static str) -> Result<&'a str, ExecutorError> {
    node.parameter(key).ok_or(ExecutorError::MissingParameter(key))
}

/// Parse a numeric parameter, falling back to `default` when blank or unparsable
fn parse_or<T>(node: &Node, key: &str, default: T, accept: impl Fn(&T) -> bool) -> T
where
    T: FromStr + Copy,
{
    match node.parameter(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) if accept(&value) => value,
            _ => {
                warn!("Node {}: ignoring invalid {} {:?}", node.id, key, raw);
                default
            }
        },
    }
}

/// Parameters of an LLM node
#[derive(Debug, Clone, PartialEq)]
pub struct LlmParams {
    /// System prompt; empty when unset
    pub system_instruction: String,
    /// User prompt
    pub user_message: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Output token limit
    pub max_output_tokens: u32,
    /// Top-k cutoff
    pub top_k: u32,
}

impl LlmParams {
    /// Read and validate the parameters of `node`
    pub fn from_node(node: &Node) -> Result<Self, ExecutorError> {
        Ok(Self {
            system_instruction: node.parameter("systemInstruction").unwrap_or_default().to_string(),
            user_message: required(node, "userMessage")?.to_string(),
            temperature: parse_or(node, "temperature", DEFAULT_TEMPERATURE, |t: &f32| {
                t.is_finite() && *t >= 0.0
            }),
            max_output_tokens: parse_or(node, "maxOutputTokens", DEFAULT_MAX_OUTPUT_TOKENS, |n| *n > 0),
            top_k: parse_or(node, "topK", DEFAULT_LLM_TOP_K, |n| *n > 0),
        })
    }

    fn into_request(self) -> GenerationRequest {
        GenerationRequest {
            system_instruction: self.system_instruction,
            user_message: self.user_message,
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
            top_k: self.top_k,
        }
    }
}

async fn run_llm(node: &Node, services: &dyn RemoteServices) -> Result<NodeOutput, ExecutorError> {
    let request = LlmParams::from_node(node)?.into_request();
    info!(
        "Generating text for node {} (temperature {}, max tokens {})",
        node.id, request.temperature, request.max_output_tokens
    );
    let output = services.generate(&request).await?;
    Ok(NodeOutput::success(output))
}

/// Read and validate the parameters of a Web Scraping node
pub fn extraction_request(node: &Node) -> Result<ExtractionRequest, ExecutorError> {
    let url = required(node, "url")?.trim();
    let parsed = Url::parse(url).map_err(|e| ExecutorError::InvalidParameter {
        name: "url",
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ExecutorError::InvalidParameter {
            name: "url",
            reason: "must start with http:// or https://".to_string(),
        });
    }
    Ok(ExtractionRequest {
        url: url.to_string(),
        instruction: required(node, "instruction")?.to_string(),
    })
}

async fn run_web_scraping(
    node: &Node,
    services: &dyn RemoteServices,
) -> Result<NodeOutput, ExecutorError> {
    let request = extraction_request(node)?;
    info!("Extracting from {} for node {}", request.url, node.id);
    let response = services.extract(&request).await?;
    Ok(NodeOutput::success(format_extraction(&request, &response)))
}

/// Render an extraction result
pub fn format_extraction(request: &ExtractionRequest, response: &ExtractionResponse) -> String {
    format!(
        "URL: {}\nInstruction: {}\n\nExtracted data:\n{}",
        response.url.as_deref().unwrap_or(&request.url),
        response.instruction.as_deref().unwrap_or(&request.instruction),
        render_value(&response.data)
    )
}

/// Read the parameters of an Embedding Generator node
pub fn embed_request(node: &Node) -> Result<EmbedRequest, ExecutorError> {
    let optional = |key: &str| node.parameter(key).map(str::to_string);
    let mut request = EmbedRequest::new(required(node, "text")?, node.id.as_str());
    request.source = optional("source");
    request.info = optional("info");
    request.tag = optional("tag");
    request.workflow = optional("workflow");
    Ok(request)
}

async fn run_embedding(node: &Node, services: &dyn RemoteServices) -> Result<NodeOutput, ExecutorError> {
    let request = embed_request(node)?;
    info!("Embedding {} characters for node {}", request.text.len(), node.id);
    let response = services.embed(&request).await?;
    format_embedding(&response).map(NodeOutput::success)
}

/// Render a stored embedding; the response must carry an id
pub fn format_embedding(response: &EmbedResponse) -> Result<String, ExecutorError> {
    let id = response
        .id
        .as_deref()
        .ok_or_else(|| ExecutorError::MalformedResponse("embedding response has no id".to_string()))?;
    let dimension = response
        .dimension
        .map_or_else(|| "unknown".to_string(), |d| d.to_string());
    Ok(format!(
        "Embedding stored\nID: {}\nDimension: {}\nMetadata:\n{}",
        id,
        dimension,
        render_value(&response.metadata)
    ))
}

/// Read the parameters of a Similarity Search node
pub fn search_request(node: &Node) -> Result<SearchRequest, ExecutorError> {
    let query = required(node, "query")?;
    let top_k = parse_or(node, "topK", DEFAULT_SEARCH_TOP_K, |n| *n > 0);
    Ok(SearchRequest::new(query, top_k))
}

async fn run_similarity_search(
    node: &Node,
    services: &dyn RemoteServices,
) -> Result<NodeOutput, ExecutorError> {
    let request = search_request(node)?;
    info!("Searching top {} matches for node {}", request.top_k, node.id);
    let response = services.search(&request).await?;
    Ok(NodeOutput::success(format_matches(&request.query, &response)))
}

/// Render a ranked match list
pub fn format_matches(query: &str, response: &SearchResponse) -> String {
    let query = response.query.as_deref().unwrap_or(query);
    if response.matches.is_empty() {
        return format!("No matches found for \"{}\"", query);
    }

    let mut out = format!("Found {} matches for \"{}\":", response.matches.len(), query);
    for (rank, hit) in response.matches.iter().enumerate() {
        let _ = write!(out, "\n\n{}. [score {:.3}] {}", rank + 1, hit.score, snippet(&hit.text));
        let mut labels = Vec::new();
        if let Some(source) = &hit.source {
            labels.push(format!("source: {}", source));
        }
        if let Some(tag) = &hit.tag {
            labels.push(format!("tag: {}", tag));
        }
        if !labels.is_empty() {
            let _ = write!(out, "\n   {}", labels.join(" | "));
        }
    }
    out
}

fn snippet(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() > SNIPPET_CHARS {
        let cut: String = text.chars().take(SNIPPET_CHARS).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "(none)".to_string(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}
