//! Request and response bodies exchanged with the remote services.
//!
//! Field names are the wire contract and must not change.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of a text generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// System prompt; may be empty
    pub system_instruction: String,
    /// User prompt
    pub user_message: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub max_output_tokens: u32,
    /// Top-k sampling cutoff
    pub top_k: u32,
}

/// Successful generation response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Generated text
    pub output: String,
}

/// Error body returned by any service on a non-success status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message
    pub error: String,
    /// Optional extra detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Body of a browser-driven extraction request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    /// Page to load
    pub url: String,
    /// What to extract from it
    pub instruction: String,
}

/// Extraction response, for both outcomes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResponse {
    /// Whether extraction succeeded
    pub success: bool,
    /// Echoed page url
    #[serde(default)]
    pub url: Option<String>,
    /// Echoed instruction
    #[serde(default)]
    pub instruction: Option<String>,
    /// Extracted payload; shape depends on the instruction
    #[serde(default)]
    pub data: Value,
    /// Failure message when `success` is false
    #[serde(default)]
    pub error: Option<String>,
    /// Failure detail when `success` is false
    #[serde(default)]
    pub details: Option<String>,
}

/// Body of an embed-and-store request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedRequest {
    /// Always `"embed"`
    pub action: String,
    /// Text to embed
    pub text: String,
    /// Where the text came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Free-form description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    /// Grouping tag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Workflow name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    /// Node that produced the embedding
    pub node_id: String,
}

impl EmbedRequest {
    /// Action tag of embed requests
    pub const ACTION: &'static str = "embed";

    /// Request embedding `text` on behalf of `node_id`
    pub fn new(text: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            action: Self::ACTION.to_string(),
            text: text.into(),
            source: None,
            info: None,
            tag: None,
            workflow: None,
            node_id: node_id.into(),
        }
    }
}

/// Embed-and-store response, for both outcomes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedResponse {
    /// Whether the vector was stored
    pub success: bool,
    /// Id of the stored vector
    #[serde(default)]
    pub id: Option<String>,
    /// Embedding dimension
    #[serde(default)]
    pub dimension: Option<u32>,
    /// Metadata stored alongside the vector
    #[serde(default)]
    pub metadata: Value,
    /// Failure message when `success` is false
    #[serde(default)]
    pub error: Option<String>,
    /// Failure detail when `success` is false
    #[serde(default)]
    pub details: Option<String>,
}

/// Body of a similarity search request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Always `"search"`
    pub action: String,
    /// Query text
    pub query: String,
    /// Number of matches wanted
    pub top_k: u32,
}

impl SearchRequest {
    /// Action tag of search requests
    pub const ACTION: &'static str = "search";

    /// Search for the `top_k` nearest neighbours of `query`
    pub fn new(query: impl Into<String>, top_k: u32) -> Self {
        Self {
            action: Self::ACTION.to_string(),
            query: query.into(),
            top_k,
        }
    }
}

/// One ranked search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMatch {
    /// Similarity score; higher is closer
    pub score: f64,
    /// Stored text
    #[serde(default)]
    pub text: String,
    /// Origin of the stored text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Grouping tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Any other metadata the store returned
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Similarity search response, for both outcomes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Whether the query ran
    pub success: bool,
    /// Echoed query
    #[serde(default)]
    pub query: Option<String>,
    /// Echoed match limit
    #[serde(default)]
    pub top_k: Option<u32>,
    /// Number of matches returned
    #[serde(default)]
    pub results_count: Option<u32>,
    /// Ranked matches, best first
    #[serde(default)]
    pub matches: Vec<SearchMatch>,
    /// Failure message when `success` is false
    #[serde(default)]
    pub error: Option<String>,
    /// Failure detail when `success` is false
    #[serde(default)]
    pub details: Option<String>,
}
