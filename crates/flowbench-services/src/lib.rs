//! Remote service clients for FlowBench
//!
//! Every executable node talks to exactly one of three HTTP services:
//! - Text generation (`POST {generate_path}`)
//! - Browser-driven extraction (`POST {extract_path}`)
//! - Vector embed/search (`POST {vector_path}`, selected by the `action` field)
//!
//! # Features
//! - One outbound call per request, no client-side retries
//! - Request timeout taken from [`ServiceConfig`]
//! - Error bodies decoded and sanitized before they reach the run log

#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument};
use url::Url;

use flowbench_protocol::wire::{
    EmbedRequest, EmbedResponse, ErrorBody, ExtractionRequest, ExtractionResponse,
    GenerationRequest, GenerationResponse, SearchRequest, SearchResponse,
};

pub mod config;

pub use config::*;

/// Errors produced by a remote service call
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The request never produced a response
    #[error("Request failed: {0}")]
    Transport(String),

    /// The service did not answer within the configured timeout
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Non-success HTTP status
    #[error("HTTP error {status}: {message}")]
    Http {
        /// Status code
        status: u16,
        /// Message from the error body, or the canonical reason
        message: String,
    },

    /// The service answered but reported `success: false`
    #[error("{0}")]
    Rejected(String),

    /// The response body did not have the expected shape
    #[error("Malformed response: {0}")]
    Decode(String),
}

/// The operations the node executors need from the outside world
#[async_trait]
pub trait RemoteServices: Send + Sync {
    /// Generate text; returns the model output
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ServiceError>;

    /// Load a page and extract data from it
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResponse, ServiceError>;

    /// Embed text and store it in the vector database
    async fn embed(&self, request: &EmbedRequest) -> Result<EmbedResponse, ServiceError>;

    /// Find stored texts similar to a query
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ServiceError>;
}

/// HTTP implementation of [`RemoteServices`]
#[derive(Debug, Clone)]
pub struct ServiceClient {
    base_url: Url,
    api_key: Option<SecretString>,
    http: reqwest::Client,
    timeout_seconds: u64,
    generate_path: String,
    extract_path: String,
    vector_path: String,
}

impl ServiceClient {
    /// Create a new client
    pub fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        config.validate()?;
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ServiceError::Config(format!("invalid base URL: {}", e)))?;

        info!(
            "Creating service client for {}",
            base_url.host_str().unwrap_or("unknown")
        );

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ServiceError::Config(e.to_string()))?;

        Ok(Self {
            base_url,
            api_key: config.api_key,
            http,
            timeout_seconds: config.timeout_seconds,
            generate_path: config.generate_path,
            extract_path: config.extract_path,
            vector_path: config.vector_path,
        })
    }

    /// Resolve an endpoint path against the base URL without dropping its last segment
    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        let mut url_str = self.base_url.to_string();
        if !url_str.ends_with('/') {
            url_str.push('/');
        }
        url_str.push_str(path.trim_start_matches('/'));
        Url::parse(&url_str).map_err(|e| ServiceError::Config(format!("invalid endpoint {}: {}", path, e)))
    }

    fn build_headers(&self) -> Result<HeaderMap, ServiceError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key.expose_secret()))
                .map_err(|e| ServiceError::Config(format!("Invalid API key characters: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        Ok(headers)
    }

    /// POST a JSON body and decode a JSON response
    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let headers = self.build_headers()?;

        debug!("Sending request to {}", url);

        let response = self
            .http
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        if status.is_success() {
            return serde_json::from_str(&text).map_err(|e| {
                error!("Undecodable response from {}: {}", path, e);
                ServiceError::Decode(e.to_string())
            });
        }

        // Log the full body for debugging; only the sanitized message is returned
        error!("Service error ({}) from {}: {}", status, path, text);

        let message = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => sanitize_error_message(&join_error(&body.error, body.details.as_deref())),
            Err(_) => status.canonical_reason().unwrap_or("Unknown error").to_string(),
        };
        Err(ServiceError::Http {
            status: status.as_u16(),
            message,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> ServiceError {
        if err.is_timeout() {
            ServiceError::Timeout(self.timeout_seconds)
        } else {
            ServiceError::Transport(sanitize_error_message(&err.to_string()))
        }
    }
}

#[async_trait]
impl RemoteServices for ServiceClient {
    #[instrument(skip(self, request))]
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ServiceError> {
        let response: GenerationResponse = self.post_json(&self.generate_path, request).await?;
        info!("Generation returned {} characters", response.output.len());
        Ok(response.output)
    }

    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResponse, ServiceError> {
        let response: ExtractionResponse = self.post_json(&self.extract_path, request).await?;
        if !response.success {
            return Err(rejected(response.error.as_deref(), response.details.as_deref()));
        }
        Ok(response)
    }

    #[instrument(skip(self, request), fields(node_id = %request.node_id))]
    async fn embed(&self, request: &EmbedRequest) -> Result<EmbedResponse, ServiceError> {
        let response: EmbedResponse = self.post_json(&self.vector_path, request).await?;
        if !response.success {
            return Err(rejected(response.error.as_deref(), response.details.as_deref()));
        }
        Ok(response)
    }

    #[instrument(skip(self, request), fields(top_k = request.top_k))]
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ServiceError> {
        let response: SearchResponse = self.post_json(&self.vector_path, request).await?;
        if !response.success {
            return Err(rejected(response.error.as_deref(), response.details.as_deref()));
        }
        info!("Search returned {} matches", response.matches.len());
        Ok(response)
    }
}

fn join_error(error: &str, details: Option<&str>) -> String {
    match details.filter(|d| !d.trim().is_empty()) {
        Some(details) => format!("{}: {}", error, details),
        None => error.to_string(),
    }
}

fn rejected(error: Option<&str>, details: Option<&str>) -> ServiceError {
    let error = error.unwrap_or("Service reported failure");
    ServiceError::Rejected(sanitize_error_message(&join_error(error, details)))
}

/// Longest error message passed on to the run log
const MAX_ERROR_LEN: usize = 256;

/// Sanitize error messages to prevent information disclosure
pub fn sanitize_error_message(message: &str) -> String {
    let patterns = [
        (r"(?i)bearer\s+[A-Za-z0-9._~+/=-]+", "Bearer ***"),
        (r"sk-[a-zA-Z0-9]{20,}", "sk-***"),
        (r"AIza[0-9A-Za-z_-]{35}", "AIza***"),
        (r"(?i)([?&](?:key|api_key|token)=)[^&\s]+", "${1}***"),
    ];

    let mut sanitized = message.to_string();
    for (pattern, replacement) in patterns {
        if let Ok(re) = regex::Regex::new(pattern) {
            sanitized = re.replace_all(&sanitized, replacement).to_string();
        }
    }

    if sanitized.chars().count() > MAX_ERROR_LEN {
        let truncated: String = sanitized.chars().take(MAX_ERROR_LEN).collect();
        format!("{}... [truncated]", truncated)
    } else {
        sanitized
    }
}
