//! Upsert-with-confirmation protocol
//!
//! A memory proposed by the model moves through
//!
//! ```text
//! Proposed ──suspend──► Suspended ──"accept"──► Committed
//!                           │
//!                           └──anything else──► Discarded
//! ```
//!
//! Nothing reaches the store before an exact `"accept"`. The memory id is
//! resolved when the proposal is created and travels with it through the
//! checkpoint, so a commit that is retried after a crash rewrites the same
//! key instead of minting a second record.
//!
//! The model supplies `content`, `context`, `category` and `memory_id`. The
//! host supplies the user id and store through `HostContext`; neither is
//! part of the tool schema.

use crate::error::{Error, Result};
use crate::llm::ToolSchema;
use crate::memory::{Category, MemoryRecord, MemoryStore, MemoryValue};
use crate::prompts::UPSERT_MEMORY_DESCRIPTION;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

/// Tool name advertised to the model
pub const UPSERT_MEMORY_TOOL: &str = "upsert_memory";

/// The only resume value that commits a proposal
pub const ACCEPT: &str = "accept";

/// Model-controlled arguments of `upsert_memory`.
///
/// Unknown fields are ignored, so a model cannot smuggle in a `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertMemoryArgs {
    /// The fact to remember
    pub content: String,
    /// Context the fact came up in
    #[serde(default)]
    pub context: String,
    /// Category name; checked only when the record is written
    #[serde(default)]
    pub category: Option<String>,
    /// Existing memory to overwrite
    #[serde(default)]
    pub memory_id: Option<String>,
}

impl UpsertMemoryArgs {
    /// Decode tool-call arguments
    pub fn from_tool_arguments(arguments: &Value) -> Result<Self> {
        serde_json::from_value(arguments.clone()).map_err(|e| {
            Error::Validation(format!("invalid {} arguments: {}", UPSERT_MEMORY_TOOL, e))
        })
    }
}

/// JSON schema of `upsert_memory`
pub fn upsert_memory_schema() -> ToolSchema {
    let categories: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
    ToolSchema {
        name: UPSERT_MEMORY_TOOL.to_string(),
        description: UPSERT_MEMORY_DESCRIPTION.to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The main content of the memory, e.g. \"User expressed interest in learning French.\""
                },
                "context": {
                    "type": "string",
                    "description": "Additional context, e.g. \"Mentioned while discussing career options in Europe.\""
                },
                "category": {
                    "type": "string",
                    "enum": categories,
                    "description": "personal: preferences, hobbies, relationships, interests. professional: work, skills, achievements. other: anything else."
                },
                "memory_id": {
                    "type": "string",
                    "description": "ONLY provide when updating an existing memory. The memory to overwrite."
                }
            },
            "required": ["content", "context", "category"]
        }),
    }
}

/// Host-injected half of an upsert call
#[derive(Clone, Copy)]
pub struct HostContext<'a> {
    /// Identity of the user the conversation belongs to
    pub user_id: &'a str,
    /// Store memories are written to
    pub store: &'a dyn MemoryStore,
}

/// Proposal lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalState {
    Proposed,
    Suspended,
    Committed,
    Discarded,
}

impl ProposalState {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProposalState::Committed | ProposalState::Discarded)
    }
}

/// What the user is being asked to confirm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingProposal {
    pub content: String,
    pub context: String,
    pub category: String,
    /// Id supplied by the model, if this is an update
    pub memory_id: Option<String>,
}

/// A memory proposal and its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pending: PendingProposal,
    resolved_id: String,
    state: ProposalState,
}

/// Result of resolving a suspended proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Accepted and written
    Stored { record: MemoryRecord },
    /// Declined by the user
    Rejected { content: String, category: String },
    /// Accepted, but the store refused the write
    Invalid {
        content: String,
        category: String,
        reason: String,
    },
}

impl UpsertOutcome {
    /// Status string handed back to the model as the tool result
    pub fn message(&self) -> String {
        match self {
            UpsertOutcome::Stored { record } => format!("Stored memory {}", record.id),
            UpsertOutcome::Rejected { content, category } => {
                format!("Rejected memory: {} in the category: {}", content, category)
            }
            UpsertOutcome::Invalid {
                content,
                category,
                reason,
            } => format!(
                "Rejected memory: {} in the category: {}. {}",
                content, category, reason
            ),
        }
    }

    /// Whether the memory was written
    pub fn is_stored(&self) -> bool {
        matches!(self, UpsertOutcome::Stored { .. })
    }
}

impl Proposal {
    /// Create a proposal in the `Proposed` state.
    ///
    /// `category` is taken verbatim. A missing or blank `memory_id` is
    /// replaced by a fresh UUID here, once.
    pub fn new(args: UpsertMemoryArgs, category: impl Into<String>) -> Self {
        let memory_id = args.memory_id.filter(|id| !id.trim().is_empty());
        let resolved_id = memory_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self {
            pending: PendingProposal {
                content: args.content,
                context: args.context,
                category: category.into(),
                memory_id,
            },
            resolved_id,
            state: ProposalState::Proposed,
        }
    }

    pub fn state(&self) -> ProposalState {
        self.state
    }

    pub fn pending(&self) -> &PendingProposal {
        &self.pending
    }

    /// Id the record will be written under
    pub fn memory_id(&self) -> &str {
        &self.resolved_id
    }

    /// Prompt shown to the human
    pub fn confirmation_prompt(&self) -> String {
        format!(
            "Saving the following memory: {} in the category: {}. Please reply with 'accept' or 'reject'",
            self.pending.content, self.pending.category
        )
    }

    /// `Proposed → Suspended`; returns the confirmation prompt
    pub fn suspend(&mut self) -> Result<String> {
        self.transition(ProposalState::Proposed, ProposalState::Suspended)?;
        Ok(self.confirmation_prompt())
    }

    /// `Suspended → Committed | Discarded`.
    ///
    /// Only the exact string `"accept"` commits. A store validation failure
    /// discards the proposal and is reported in the outcome. Any other store
    /// error propagates and leaves the proposal suspended so the resume can
    /// be retried.
    pub async fn resolve(
        &mut self,
        resume_value: &str,
        host: HostContext<'_>,
    ) -> Result<UpsertOutcome> {
        if self.state != ProposalState::Suspended {
            return Err(self.invalid_transition(ProposalState::Suspended));
        }

        if resume_value != ACCEPT {
            self.state = ProposalState::Discarded;
            tracing::info!(
                user_id = %host.user_id,
                category = %self.pending.category,
                "Memory proposal rejected"
            );
            return Ok(UpsertOutcome::Rejected {
                content: self.pending.content.clone(),
                category: self.pending.category.clone(),
            });
        }

        let value = MemoryValue {
            content: self.pending.content.clone(),
            context: self.pending.context.clone(),
        };
        match host
            .store
            .put(host.user_id, &self.pending.category, &self.resolved_id, value)
            .await
        {
            Ok(record) => {
                self.state = ProposalState::Committed;
                tracing::info!(
                    user_id = %host.user_id,
                    namespace = %record.namespace,
                    memory_id = %record.id,
                    "Memory committed"
                );
                Ok(UpsertOutcome::Stored { record })
            }
            Err(Error::Validation(reason)) => {
                self.state = ProposalState::Discarded;
                tracing::warn!(
                    user_id = %host.user_id,
                    category = %self.pending.category,
                    "Accepted memory failed validation: {}",
                    reason
                );
                Ok(UpsertOutcome::Invalid {
                    content: self.pending.content.clone(),
                    category: self.pending.category.clone(),
                    reason,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn transition(&mut self, from: ProposalState, to: ProposalState) -> Result<()> {
        if self.state != from {
            return Err(self.invalid_transition(from));
        }
        self.state = to;
        Ok(())
    }

    fn invalid_transition(&self, expected: ProposalState) -> Error {
        Error::Agent(format!(
            "proposal {} is {:?}, expected {:?}",
            self.resolved_id, self.state, expected
        ))
    }
}

/// Run the whole protocol in one call, with an in-process confirmation.
///
/// `confirm` receives the prompt and yields the human's answer. Useful for
/// hosts that can wait for the answer without checkpointing; the
/// orchestrator instead persists the suspended `Proposal` and resolves it
/// on a later resume.
pub async fn upsert_memory<F, Fut>(
    args: UpsertMemoryArgs,
    host: HostContext<'_>,
    confirm: F,
) -> Result<String>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let category = args
        .category
        .clone()
        .ok_or_else(|| Error::Validation("category is required".to_string()))?;
    let mut proposal = Proposal::new(args, category);
    let prompt = proposal.suspend()?;
    let answer = confirm(prompt).await?;
    Ok(proposal.resolve(&answer, host).await?.message())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryStore, NamespacePrefix};

    fn args(content: &str, category: &str) -> UpsertMemoryArgs {
        UpsertMemoryArgs {
            content: content.to_string(),
            context: "said during onboarding".to_string(),
            category: Some(category.to_string()),
            memory_id: None,
        }
    }

    fn host<'a>(user_id: &'a str, store: &'a InMemoryStore) -> HostContext<'a> {
        HostContext { user_id, store }
    }

    #[test]
    fn test_confirmation_prompt_text() {
        let mut proposal = Proposal::new(
            args("works as a data scientist", "professional"),
            "professional",
        );
        assert_eq!(
            proposal.suspend().unwrap(),
            "Saving the following memory: works as a data scientist in the category: professional. Please reply with 'accept' or 'reject'"
        );
        assert_eq!(proposal.state(), ProposalState::Suspended);
    }

    #[test]
    fn test_suspend_twice_is_invalid() {
        let mut proposal = Proposal::new(args("x", "other"), "other");
        proposal.suspend().unwrap();
        assert!(matches!(proposal.suspend(), Err(Error::Agent(_))));
    }

    #[tokio::test]
    async fn test_resolve_requires_suspension() {
        let store = InMemoryStore::new();
        let mut proposal = Proposal::new(args("x", "other"), "other");
        let err = proposal.resolve(ACCEPT, host("u1", &store)).await.unwrap_err();
        assert!(matches!(err, Error::Agent(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_accept_commits() {
        let store = InMemoryStore::new();
        let mut proposal = Proposal::new(
            args("works as a data scientist", "professional"),
            "professional",
        );
        proposal.suspend().unwrap();

        let outcome = proposal.resolve("accept", host("U1", &store)).await.unwrap();
        assert!(outcome.is_stored());
        assert_eq!(outcome.message(), format!("Stored memory {}", proposal.memory_id()));
        assert_eq!(proposal.state(), ProposalState::Committed);

        let records = store
            .search(&NamespacePrefix::category("U1", Category::Professional))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content(), "works as a data scientist");
        assert_eq!(records[0].id, proposal.memory_id());
    }

    #[tokio::test]
    async fn test_anything_but_exact_accept_discards() {
        for answer in ["reject", "Accept", "accept ", "yes", ""] {
            let store = InMemoryStore::new();
            let mut proposal =
                Proposal::new(args("enjoys playing guitar", "personal"), "personal");
            proposal.suspend().unwrap();

            let outcome = proposal.resolve(answer, host("U2", &store)).await.unwrap();
            assert_eq!(
                outcome.message(),
                "Rejected memory: enjoys playing guitar in the category: personal"
            );
            assert_eq!(proposal.state(), ProposalState::Discarded);
            assert!(store.is_empty(), "wrote on {:?}", answer);
        }
    }

    #[tokio::test]
    async fn test_terminal_proposal_cannot_resolve_again() {
        let store = InMemoryStore::new();
        let mut proposal = Proposal::new(args("likes tea", "personal"), "personal");
        proposal.suspend().unwrap();
        proposal.resolve("reject", host("u1", &store)).await.unwrap();

        assert!(proposal.state().is_terminal());
        assert!(proposal.resolve("accept", host("u1", &store)).await.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_supplied_memory_id_overwrites() {
        let store = InMemoryStore::new();
        let mut first = Proposal::new(args("likes tea", "personal"), "personal");
        first.suspend().unwrap();
        first.resolve(ACCEPT, host("u1", &store)).await.unwrap();

        let mut update_args = args("likes coffee now", "personal");
        update_args.memory_id = Some(first.memory_id().to_string());
        let mut update = Proposal::new(update_args, "personal");
        assert_eq!(update.memory_id(), first.memory_id());
        update.suspend().unwrap();
        update.resolve(ACCEPT, host("u1", &store)).await.unwrap();

        let records = store.search(&NamespacePrefix::user("u1")).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content(), "likes coffee now");
    }

    #[tokio::test]
    async fn test_blank_memory_id_gets_fresh_id() {
        let store = InMemoryStore::new();
        for content in ["has a dog", "has a cat"] {
            let mut blank = args(content, "personal");
            blank.memory_id = Some("  ".to_string());
            let mut proposal = Proposal::new(blank, "personal");
            assert!(proposal.pending().memory_id.is_none());
            assert!(!proposal.memory_id().trim().is_empty());

            proposal.suspend().unwrap();
            let outcome = proposal.resolve(ACCEPT, host("u1", &store)).await.unwrap();
            assert_ne!(outcome.message(), "Stored memory ");
        }

        let records = store.search(&NamespacePrefix::user("u1")).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.id.is_empty()));
    }

    #[tokio::test]
    async fn test_retried_commit_reuses_id() {
        let store = InMemoryStore::new();
        let mut proposal = Proposal::new(args("runs marathons", "personal"), "personal");
        proposal.suspend().unwrap();
        let checkpointed = proposal.clone();

        proposal.resolve(ACCEPT, host("u1", &store)).await.unwrap();
        let mut replay = checkpointed;
        replay.resolve(ACCEPT, host("u1", &store)).await.unwrap();

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_category_becomes_rejection_message() {
        let store = InMemoryStore::new();
        let mut proposal = Proposal::new(args("collects stamps", "hobbies"), "hobbies");
        let prompt = proposal.suspend().unwrap();
        assert!(prompt.contains("in the category: hobbies"));

        let outcome = proposal.resolve(ACCEPT, host("u1", &store)).await.unwrap();
        assert!(matches!(outcome, UpsertOutcome::Invalid { .. }));
        assert!(outcome
            .message()
            .starts_with("Rejected memory: collects stamps in the category: hobbies."));
        assert_eq!(proposal.state(), ProposalState::Discarded);
        assert!(store.is_empty());
    }

    #[test]
    fn test_args_ignore_injected_fields() {
        let parsed = UpsertMemoryArgs::from_tool_arguments(&serde_json::json!({
            "content": "likes tea",
            "context": "chat",
            "category": "personal",
            "user_id": "someone-else",
        }))
        .unwrap();
        assert_eq!(parsed, args_with_context("likes tea", "chat", "personal"));
    }

    fn args_with_context(content: &str, context: &str, category: &str) -> UpsertMemoryArgs {
        UpsertMemoryArgs {
            content: content.to_string(),
            context: context.to_string(),
            category: Some(category.to_string()),
            memory_id: None,
        }
    }

    #[test]
    fn test_args_require_content() {
        let err = UpsertMemoryArgs::from_tool_arguments(&serde_json::json!({"context": "x"}))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_schema_hides_host_fields() {
        let schema = upsert_memory_schema();
        let properties = schema.parameters["properties"].as_object().unwrap();
        assert!(properties.contains_key("memory_id"));
        assert!(!properties.contains_key("user_id"));
        assert!(!properties.contains_key("store"));
        assert_eq!(
            schema.parameters["properties"]["category"]["enum"],
            serde_json::json!(["personal", "professional", "other"])
        );
    }

    #[tokio::test]
    async fn test_one_shot_upsert_with_confirmation() {
        let store = InMemoryStore::new();
        let confirm = |prompt: String| async move {
            assert!(prompt.contains("plays chess"));
            Ok("accept".to_string())
        };
        let message = upsert_memory(args("plays chess", "other"), host("u1", &store), confirm)
            .await
            .unwrap();
        assert!(message.starts_with("Stored memory "));
        assert_eq!(store.len(), 1);

        let message = upsert_memory(args("plays poker", "other"), host("u1", &store), |_| async {
            Ok("reject".to_string())
        })
        .await
        .unwrap();
        assert_eq!(message, "Rejected memory: plays poker in the category: other");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_proposal_survives_serde() {
        let mut proposal = Proposal::new(args("likes tea", "personal"), "personal");
        proposal.suspend().unwrap();
        let json = serde_json::to_string(&proposal).unwrap();
        let restored: Proposal = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, proposal);
        assert_eq!(restored.state(), ProposalState::Suspended);
    }
}
