//! Memory Agent - Conversational assistant with confirmation-gated memory
//!
//! The agent remembers facts about the people it talks to. Whenever the
//! model proposes to save a memory, the conversation is suspended and the
//! human is asked to accept or reject it; nothing is written without an
//! explicit `"accept"`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       MemoryAgent                         │
//! │  ┌────────────┐   ┌──────────────┐   ┌────────────────┐  │
//! │  │ LlmClient  │   │  Categorizer │   │  Checkpointer  │  │
//! │  └─────┬──────┘   └──────┬───────┘   └───────┬────────┘  │
//! │        │ upsert_memory   │ category          │ suspend   │
//! │  ┌─────▼─────────────────▼───────────────────▼────────┐  │
//! │  │            Upsert-with-confirmation                 │  │
//! │  │  Proposed → Suspended → Committed | Discarded       │  │
//! │  └─────────────────────────┬──────────────────────────┘  │
//! └────────────────────────────┼─────────────────────────────┘
//!                              │ put on "accept"
//!                 ┌────────────▼───────────────┐
//!                 │ MemoryStore                │
//!                 │ (memories, user, category) │
//!                 └────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`agent`]: Orchestrator, confirmation protocol, thread checkpoints
//! - [`memory`]: Records, namespaced store, categorizer
//! - [`llm`]: Model client seam and providers
//! - [`prompts`]: Prompt templates
//! - [`config`]: Configuration management

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod prompts;

pub use agent::{Identity, MemoryAgent, Resume, TurnOutcome};
pub use config::MemoryAgentConfig;
pub use error::{Error, Result};
