//! Conversation orchestrator
//!
//! `MemoryAgent` drives one model-and-tools loop per thread. Each advance
//! (a new user turn, or a resume) runs until the model replies with text or
//! a memory proposal needs confirmation. In the second case the proposal is
//! checkpointed as suspended and an `Interrupt` is returned; the loop picks
//! up from the checkpoint on `resume`, possibly in another process.
//!
//! Proposals on a thread resolve strictly in order: tool calls from one
//! model response are queued and handled one at a time, and a new user turn
//! is refused while a proposal is pending.

use super::checkpoint::{Checkpointer, PendingInterrupt, ThreadState};
use super::types::{Identity, Interrupt, Resume, TurnOutcome};
use super::upsert::{
    upsert_memory_schema, HostContext, Proposal, UpsertMemoryArgs, UPSERT_MEMORY_TOOL,
};
use crate::config::{AgentConfig, RetrievalScope};
use crate::error::{Error, Result};
use crate::llm::{CompletionRequest, LlmClient, Message, ToolCall};
use crate::memory::{Categorizer, Category, MemoryRecord, MemoryStore, NamespacePrefix};
use crate::prompts::system_prompt;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Memory-aware conversational agent
pub struct MemoryAgent {
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn MemoryStore>,
    checkpointer: Arc<dyn Checkpointer>,
    categorizer: Categorizer,
    config: AgentConfig,
    max_tokens: u32,
    temperature: Option<f32>,
    thread_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MemoryAgent {
    /// Create an agent. The categorizer shares the reply model.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn MemoryStore>,
        checkpointer: Arc<dyn Checkpointer>,
        config: AgentConfig,
    ) -> Self {
        let categorizer = Categorizer::new(llm.clone()).with_window(config.category_window);
        Self {
            llm,
            store,
            checkpointer,
            categorizer,
            config,
            max_tokens: 1024,
            temperature: None,
            thread_locks: DashMap::new(),
        }
    }

    /// Use a separate categorizer
    pub fn with_categorizer(mut self, categorizer: Categorizer) -> Self {
        self.categorizer = categorizer;
        self
    }

    /// Sampling parameters for reply generation
    pub fn with_sampling(mut self, max_tokens: u32, temperature: Option<f32>) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// Process a user message on a thread.
    ///
    /// Fails with `AwaitingConfirmation` if the thread has an unresolved
    /// proposal, and with `IdentityMismatch` if the thread belongs to
    /// someone else.
    pub async fn handle_turn(
        &self,
        thread_id: &str,
        identity: &Identity,
        text: &str,
    ) -> Result<TurnOutcome> {
        let lock = self.thread_lock(thread_id);
        let result = {
            let _guard = lock.lock().await;
            self.handle_turn_locked(thread_id, identity, text).await
        };
        self.release_thread_lock(thread_id, lock);
        result
    }

    async fn handle_turn_locked(
        &self,
        thread_id: &str,
        identity: &Identity,
        text: &str,
    ) -> Result<TurnOutcome> {
        let mut state = match self.checkpointer.load(thread_id).await? {
            Some(state) => {
                ensure_owner(&state, identity)?;
                if state.is_suspended() {
                    return Err(Error::AwaitingConfirmation(thread_id.to_string()));
                }
                state
            }
            None => ThreadState::new(thread_id, identity.user_id.clone()),
        };

        tracing::debug!(thread_id = %thread_id, user_id = %identity.user_id, "Handling turn");
        state.messages.push(Message::user(text));
        self.advance(&mut state).await
    }

    /// Answer the pending confirmation on a thread and continue the turn.
    ///
    /// The checkpoint is looked up and validated before anything happens.
    /// A missing or unreadable checkpoint is `SuspensionLost`; a thread with
    /// nothing pending (including one already resumed) is `NotSuspended`.
    pub async fn resume(
        &self,
        thread_id: &str,
        identity: &Identity,
        resume: Resume,
    ) -> Result<TurnOutcome> {
        let lock = self.thread_lock(thread_id);
        let result = {
            let _guard = lock.lock().await;
            self.resume_locked(thread_id, identity, resume).await
        };
        self.release_thread_lock(thread_id, lock);
        result
    }

    async fn resume_locked(
        &self,
        thread_id: &str,
        identity: &Identity,
        resume: Resume,
    ) -> Result<TurnOutcome> {
        let mut state = match self.checkpointer.load(thread_id).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                return Err(Error::SuspensionLost {
                    thread_id: thread_id.to_string(),
                    reason: "no checkpoint for thread".to_string(),
                })
            }
            Err(e) => {
                return Err(Error::SuspensionLost {
                    thread_id: thread_id.to_string(),
                    reason: e.to_string(),
                })
            }
        };
        ensure_owner(&state, identity)?;

        let pending = state
            .pending
            .clone()
            .ok_or_else(|| Error::NotSuspended(thread_id.to_string()))?;
        if let Some(actual) = resume.interrupt_id {
            if actual != pending.interrupt_id {
                return Err(Error::InterruptMismatch {
                    expected: pending.interrupt_id,
                    actual,
                });
            }
        }

        let mut proposal = pending.proposal;
        let host = HostContext {
            user_id: &state.user_id,
            store: self.store.as_ref(),
        };
        // A store failure leaves the checkpoint suspended; the retry reuses
        // the same memory id.
        let outcome = proposal.resolve(&resume.value, host).await?;

        state.pending = None;
        state
            .messages
            .push(Message::tool_result(pending.tool_call_id, outcome.message()));
        self.save(&mut state).await?;

        self.advance(&mut state).await
    }

    /// The pending confirmation on a thread, if any. Only the thread's
    /// owner may read it.
    pub async fn pending_interrupt(
        &self,
        thread_id: &str,
        identity: &Identity,
    ) -> Result<Option<Interrupt>> {
        let Some(state) = self.checkpointer.load(thread_id).await? else {
            return Ok(None);
        };
        ensure_owner(&state, identity)?;
        Ok(state.pending.map(|pending| Interrupt {
            id: pending.interrupt_id,
            prompt: pending.proposal.confirmation_prompt(),
        }))
    }

    /// Stored memories of a user, optionally limited to one category
    pub async fn memories(
        &self,
        user_id: &str,
        category: Option<Category>,
    ) -> Result<Vec<MemoryRecord>> {
        let prefix = match category {
            Some(category) => NamespacePrefix::category(user_id, category),
            None => NamespacePrefix::user(user_id),
        };
        let mut records = self.store.search(&prefix).await?;
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    /// Run tool calls and model rounds until a reply or a suspension
    async fn advance(&self, state: &mut ThreadState) -> Result<TurnOutcome> {
        let mut rounds = 0;
        loop {
            while !state.queued_tool_calls.is_empty() {
                let call = state.queued_tool_calls.remove(0);
                if let Some(interrupt) = self.dispatch_tool_call(state, call).await? {
                    self.save(state).await?;
                    return Ok(TurnOutcome::Interrupted(interrupt));
                }
            }

            if rounds >= self.config.max_model_rounds {
                self.save(state).await?;
                return Err(Error::Agent(format!(
                    "model did not finish within {} rounds",
                    self.config.max_model_rounds
                )));
            }
            rounds += 1;

            let mut messages = vec![Message::system(self.build_system_prompt(state).await)];
            messages.extend(state.messages.iter().cloned());
            let request = CompletionRequest::new(messages)
                .with_tools(vec![upsert_memory_schema()])
                .with_max_tokens(self.max_tokens)
                .with_temperature(self.temperature);

            tracing::debug!(
                thread_id = %state.thread_id,
                round = rounds,
                provider = %self.llm.provider(),
                model = %self.llm.model(),
                "Calling model"
            );
            let response = self.llm.complete(request).await?;

            if response.tool_calls.is_empty() {
                let reply = response.content.unwrap_or_default();
                // Providers reject empty assistant turns in later requests
                if !reply.trim().is_empty() {
                    state.messages.push(Message::assistant(reply.clone()));
                }
                self.save(state).await?;
                return Ok(TurnOutcome::Completed { reply });
            }

            state.messages.push(Message::assistant_with_tool_calls(
                response.content,
                response.tool_calls.clone(),
            ));
            state.queued_tool_calls = response.tool_calls;
        }
    }

    /// Handle one tool call. Returns an interrupt when a proposal was
    /// suspended; otherwise the tool result is appended to the transcript.
    async fn dispatch_tool_call(
        &self,
        state: &mut ThreadState,
        call: ToolCall,
    ) -> Result<Option<Interrupt>> {
        if call.name != UPSERT_MEMORY_TOOL {
            tracing::warn!(tool = %call.name, "Model called an unknown tool");
            state.messages.push(Message::tool_result(
                call.id,
                format!("Error: unknown tool '{}'", call.name),
            ));
            return Ok(None);
        }

        let args = match UpsertMemoryArgs::from_tool_arguments(&call.arguments) {
            Ok(args) => args,
            Err(e) => {
                tracing::warn!(error = %e, "Rejected malformed tool arguments");
                state
                    .messages
                    .push(Message::tool_result(call.id, format!("Error: {}", e)));
                return Ok(None);
            }
        };

        let category = match &args.category {
            Some(category) => category.clone(),
            None => self.categorizer.classify(&state.messages).await.to_string(),
        };
        let mut proposal = Proposal::new(args, category);
        let prompt = proposal.suspend()?;

        let interrupt_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(
            thread_id = %state.thread_id,
            interrupt_id = %interrupt_id,
            memory_id = %proposal.memory_id(),
            "Memory proposal awaiting confirmation"
        );
        state.pending = Some(PendingInterrupt {
            interrupt_id: interrupt_id.clone(),
            tool_call_id: call.id,
            proposal,
        });

        Ok(Some(Interrupt {
            id: interrupt_id,
            prompt,
        }))
    }

    /// System prompt with the memories relevant to the conversation
    async fn build_system_prompt(&self, state: &ThreadState) -> String {
        let prefix = match self.config.retrieval {
            RetrievalScope::Category => {
                let category = self.categorizer.classify(&state.messages).await;
                NamespacePrefix::category(state.user_id.clone(), category)
            }
            RetrievalScope::User => NamespacePrefix::user(state.user_id.clone()),
        };

        let mut records = match self.store.search(&prefix).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "Memory retrieval failed; continuing without memories");
                Vec::new()
            }
        };
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records.truncate(self.config.memory_search_limit);

        system_prompt(&format_memories(&records), &Utc::now().to_rfc3339())
    }

    async fn save(&self, state: &mut ThreadState) -> Result<()> {
        state.updated_at = Utc::now();
        self.checkpointer.save(state).await
    }

    fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        self.thread_locks
            .entry(thread_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop the caller's handle and forget the lock once nobody else holds
    /// or waits on it. `remove_if` runs under the shard lock that
    /// `thread_lock` also takes, so no handle can be handed out in between.
    fn release_thread_lock(&self, thread_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.thread_locks
            .remove_if(thread_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of threads with a live lock entry
    pub fn active_threads(&self) -> usize {
        self.thread_locks.len()
    }
}

fn ensure_owner(state: &ThreadState, identity: &Identity) -> Result<()> {
    if state.user_id != identity.user_id {
        tracing::warn!(thread_id = %state.thread_id, "Thread driven by a different user");
        return Err(Error::IdentityMismatch(state.thread_id.clone()));
    }
    Ok(())
}

/// `<memories>` block for the system prompt; empty when there are none
fn format_memories(records: &[MemoryRecord]) -> String {
    if records.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = records
        .iter()
        .map(|r| format!("[{}]: {} ({})", r.id, r.content(), r.context()))
        .collect();
    format!("\n<memories>\n{}\n</memories>", lines.join("\n"))
}
