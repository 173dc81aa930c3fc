#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flowbench_protocol::wire::{
    EmbedRequest, EmbedResponse, ExtractionRequest, ExtractionResponse, GenerationRequest,
    SearchMatch, SearchRequest, SearchResponse,
};
use flowbench_protocol::{NodeId, NodeKind, Workflow};
use flowbench_services::{RemoteServices, ServiceError};
use serde_json::json;
use tokio::sync::Notify;

type GenerateFn = dyn Fn(&GenerationRequest) -> Result<String, ServiceError> + Send + Sync;

/// In-memory stand-in for the remote services that records every call
pub struct FakeServices {
    generate: Box<GenerateFn>,
    calls: Mutex<Vec<String>>,
    gate: Option<Arc<Notify>>,
}

impl FakeServices {
    pub fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::with_generate(move |_| Ok(text.clone()))
    }

    pub fn echoing() -> Self {
        Self::with_generate(|req| Ok(format!("echo: {}", req.user_message)))
    }

    pub fn failing(status: u16, message: &str) -> Self {
        let message = message.to_string();
        Self::with_generate(move |_| {
            Err(ServiceError::Http {
                status,
                message: message.clone(),
            })
        })
    }

    pub fn with_generate<F>(f: F) -> Self
    where
        F: Fn(&GenerationRequest) -> Result<String, ServiceError> + Send + Sync + 'static,
    {
        Self {
            generate: Box::new(f),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Hold every generation call until `gate` is notified
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl RemoteServices for FakeServices {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ServiceError> {
        self.record(format!("generate:{}", request.user_message));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        (self.generate)(request)
    }

    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResponse, ServiceError> {
        self.record(format!("extract:{}", request.url));
        Ok(ExtractionResponse {
            success: true,
            url: Some(request.url.clone()),
            instruction: Some(request.instruction.clone()),
            data: json!({"title": "Example Domain"}),
            error: None,
            details: None,
        })
    }

    async fn embed(&self, request: &EmbedRequest) -> Result<EmbedResponse, ServiceError> {
        self.record(format!("embed:{}", request.node_id));
        Ok(EmbedResponse {
            success: true,
            id: Some("vec-42".to_string()),
            dimension: Some(768),
            metadata: json!({"text": request.text}),
            error: None,
            details: None,
        })
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ServiceError> {
        self.record(format!("search:{}", request.query));
        Ok(SearchResponse {
            success: true,
            query: Some(request.query.clone()),
            top_k: Some(request.top_k),
            results_count: Some(1),
            matches: vec![SearchMatch {
                score: 0.9,
                text: "stored text".to_string(),
                source: None,
                tag: Some("docs".to_string()),
                extra: Default::default(),
            }],
            error: None,
            details: None,
        })
    }
}

/// Build Start -> middle... -> End, returning the workflow and all ids in order
pub fn chain(middle: Vec<(NodeKind, Vec<(&str, &str)>)>) -> (Workflow, Vec<NodeId>) {
    let mut workflow = Workflow::new();
    let mut ids = vec![workflow.add_node(NodeKind::Start, "Start")];
    for (kind, params) in middle {
        let id = workflow.add_node(kind, kind.display_name());
        for (key, value) in params {
            workflow
                .set_parameter(&id, key, value)
                .expect("node was just added");
        }
        ids.push(id);
    }
    ids.push(workflow.add_node(NodeKind::End, "End"));
    for pair in ids.windows(2) {
        workflow
            .connect(&pair[0], &pair[1])
            .expect("nodes were just added");
    }
    (workflow, ids)
}
