//! Deterministic scripted LLM client
//!
//! Replays a queue of canned responses. Used by tests and offline runs where
//! no provider is reachable.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{Error, Result};

use super::client::{CompletionRequest, CompletionResponse, LlmClient, ToolCall};

/// One scripted completion
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Return a plain assistant message
    Text(String),
    /// Return one or more tool calls
    ToolCalls(Vec<ToolCall>),
    /// Fail with an LLM error
    Error(String),
}

impl ScriptStep {
    pub fn text(content: impl Into<String>) -> Self {
        ScriptStep::Text(content.into())
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        ScriptStep::ToolCalls(vec![ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        }])
    }

    pub fn error(message: impl Into<String>) -> Self {
        ScriptStep::Error(message.into())
    }
}

#[derive(Default)]
struct ScriptState {
    steps: VecDeque<ScriptStep>,
    requests: Vec<CompletionRequest>,
}

/// Scripted client; clones share the script and the request log
#[derive(Clone, Default)]
pub struct ScriptedClient {
    state: Arc<Mutex<ScriptState>>,
    fallback: Option<ScriptStep>,
}

impl ScriptedClient {
    /// Create a client that replays `steps` in order
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                steps: steps.into_iter().collect(),
                requests: Vec::new(),
            })),
            fallback: None,
        }
    }

    /// A client that answers every request with the same step
    pub fn always(step: ScriptStep) -> Self {
        Self::new(Vec::<ScriptStep>::new()).with_fallback(step)
    }

    /// Step to replay once the queue is exhausted
    pub fn with_fallback(mut self, step: ScriptStep) -> Self {
        self.fallback = Some(step);
        self
    }

    /// Append a step to the script
    pub async fn push(&self, step: ScriptStep) {
        self.state.lock().await.steps.push_back(step);
    }

    /// Steps not yet consumed
    pub async fn remaining(&self) -> usize {
        self.state.lock().await.steps.len()
    }

    /// Every request received so far
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.state.lock().await.requests.clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    fn provider(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let mut state = self.state.lock().await;
        state.requests.push(request);

        let step = match state.steps.pop_front() {
            Some(step) => step,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| Error::Llm("script exhausted".to_string()))?,
        };

        match step {
            ScriptStep::Text(text) => Ok(CompletionResponse::text(text)),
            ScriptStep::ToolCalls(calls) => Ok(CompletionResponse::tool_calls(calls)),
            ScriptStep::Error(message) => Err(Error::Llm(message)),
        }
    }
}
