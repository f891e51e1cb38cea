//! Memory agent
//!
//! Conversation orchestration with confirmation-gated memory writes.
//!
//! ## Architecture
//!
//! ```text
//! host ──handle_turn──► MemoryAgent ──► LlmClient
//!   ▲                      │  upsert_memory tool call
//!   │  Interrupt           ▼
//!   └──────────────── Proposal (suspended) ──► Checkpointer
//!
//! host ──resume("accept")──► MemoryAgent ──► MemoryStore.put
//! ```

pub mod checkpoint;
pub mod orchestrator;
pub mod types;
pub mod upsert;

pub use checkpoint::{
    Checkpointer, FileCheckpointer, InMemoryCheckpointer, PendingInterrupt, ThreadState,
};
pub use orchestrator::MemoryAgent;
pub use types::{Identity, Interrupt, Resume, TurnOutcome};
pub use upsert::{
    upsert_memory, upsert_memory_schema, HostContext, PendingProposal, Proposal, ProposalState,
    UpsertMemoryArgs, UpsertOutcome, ACCEPT, UPSERT_MEMORY_TOOL,
};
