//! Best-effort memory categorization
//!
//! The categorizer asks a language model which category the recent
//! conversation belongs to. Categorization only picks a storage partition,
//! so it never fails: any model error, and any answer outside the fixed
//! category set, yields `Category::Personal`.

use super::record::Category;
use crate::llm::{CompletionRequest, LlmClient, Message, Role};
use crate::prompts::category_prompt;
use std::sync::Arc;
use thiserror::Error;

/// Category substituted whenever classification is unavailable
pub const FALLBACK_CATEGORY: Category = Category::Personal;

/// Default number of trailing turns read
pub const DEFAULT_WINDOW: usize = 3;

/// Why a classification attempt produced no usable category
#[derive(Error, Debug)]
pub enum ClassificationError {
    /// The classification call itself failed
    #[error("classification unavailable: {0}")]
    Unavailable(String),

    /// The model answered with something outside the category set
    #[error("unrecognized category '{0}'")]
    Unrecognized(String),
}

/// LLM-backed categorizer with a deterministic fallback
#[derive(Clone)]
pub struct Categorizer {
    client: Arc<dyn LlmClient>,
    window: usize,
}

impl Categorizer {
    /// Create a categorizer reading the last three turns
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            window: DEFAULT_WINDOW,
        }
    }

    /// Override the number of trailing turns read
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    /// Classify the recent conversation. Never fails.
    pub async fn classify(&self, messages: &[Message]) -> Category {
        match self.try_classify(messages).await {
            Ok(category) => category,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    fallback = %FALLBACK_CATEGORY,
                    "Categorization fell back"
                );
                FALLBACK_CATEGORY
            }
        }
    }

    /// Classify, surfacing why a category could not be determined
    pub async fn try_classify(
        &self,
        messages: &[Message],
    ) -> std::result::Result<Category, ClassificationError> {
        let recent = recent_turns(messages, self.window);
        let listing = serde_json::to_string(&recent)
            .map_err(|e| ClassificationError::Unavailable(e.to_string()))?;

        let request = CompletionRequest::new(vec![Message::user(category_prompt(&listing))])
            .with_max_tokens(16);
        let response = self
            .client
            .complete(request)
            .await
            .map_err(|e| ClassificationError::Unavailable(e.to_string()))?;

        let answer = response.content.unwrap_or_default();
        let answer = answer.trim();
        answer
            .parse::<Category>()
            .map_err(|_| ClassificationError::Unrecognized(answer.to_string()))
    }
}

/// Contents of the last `window` conversational turns, oldest first.
///
/// System prompts, tool results, and content-less tool-call messages are
/// not turns.
fn recent_turns(messages: &[Message], window: usize) -> Vec<&str> {
    let mut turns: Vec<&str> = messages
        .iter()
        .rev()
        .filter(|m| matches!(m.role, Role::User | Role::Assistant) && !m.content.is_empty())
        .take(window)
        .map(|m| m.content.as_str())
        .collect();
    turns.reverse();
    turns
}
