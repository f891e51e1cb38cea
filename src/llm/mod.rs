//! Language model seam
//!
//! Reply generation and categorization both go through `LlmClient`. The
//! Anthropic client talks to the Messages API; the scripted client replays
//! canned responses.

pub mod anthropic;
pub mod client;
pub mod scripted;

pub use anthropic::AnthropicClient;
pub use client::{
    CompletionRequest, CompletionResponse, FinishReason, LlmClient, Message, Role, ToolCall,
    ToolSchema,
};
pub use scripted::{ScriptStep, ScriptedClient};
