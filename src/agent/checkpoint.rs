//! Thread checkpoints
//!
//! A `ThreadState` is everything needed to continue a conversation: the
//! transcript, tool calls from the last model response that have not been
//! handled, and the suspended proposal (if any). It is saved after every
//! advance and always before an interrupt is handed to the caller.

use super::upsert::Proposal;
use crate::error::{Error, Result};
use crate::llm::{Message, ToolCall};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current checkpoint schema version
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// A proposal awaiting the human's answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingInterrupt {
    /// Id handed out with the interrupt
    pub interrupt_id: String,
    /// Tool call the answer will be reported to
    pub tool_call_id: String,
    /// The suspended proposal, with its resolved memory id
    pub proposal: Proposal,
}

/// Persisted conversation state of one thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadState {
    pub schema_version: u32,
    pub thread_id: String,
    /// Owner of the thread; fixed at creation
    pub user_id: String,
    pub messages: Vec<Message>,
    /// Tool calls still to be handled, in the order the model made them
    #[serde(default)]
    pub queued_tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub pending: Option<PendingInterrupt>,
    pub updated_at: DateTime<Utc>,
}

impl ThreadState {
    /// Fresh thread owned by `user_id`
    pub fn new(thread_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            messages: Vec::new(),
            queued_tool_calls: Vec::new(),
            pending: None,
            updated_at: Utc::now(),
        }
    }

    /// Whether a proposal is waiting for confirmation
    pub fn is_suspended(&self) -> bool {
        self.pending.is_some()
    }

    fn check_schema(&self) -> Result<()> {
        if self.schema_version == 0 || self.schema_version > CHECKPOINT_SCHEMA_VERSION {
            return Err(Error::Agent(format!(
                "Unsupported checkpoint schema version: {}",
                self.schema_version
            )));
        }
        Ok(())
    }
}

/// Durable home for thread state
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Load a thread. A thread never saved is `Ok(None)`.
    async fn load(&self, thread_id: &str) -> Result<Option<ThreadState>>;

    /// Replace the saved state of `state.thread_id`
    async fn save(&self, state: &ThreadState) -> Result<()>;
}

/// Checkpoints held for the lifetime of the process
#[derive(Default)]
pub struct InMemoryCheckpointer {
    threads: DashMap<String, ThreadState>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn load(&self, thread_id: &str) -> Result<Option<ThreadState>> {
        Ok(self.threads.get(thread_id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, state: &ThreadState) -> Result<()> {
        self.threads.insert(state.thread_id.clone(), state.clone());
        Ok(())
    }
}

/// One JSON file per thread under a directory
pub struct FileCheckpointer {
    dir: PathBuf,
}

impl FileCheckpointer {
    /// Open (and create if needed) a checkpoint directory
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, thread_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_file_stem(thread_id)))
    }
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    async fn load(&self, thread_id: &str) -> Result<Option<ThreadState>> {
        let path = self.path_for(thread_id);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state: ThreadState = serde_json::from_str(&data)?;
        state.check_schema()?;
        if state.thread_id != thread_id {
            return Err(Error::Agent(format!(
                "Checkpoint {} belongs to thread '{}'",
                path.display(),
                state.thread_id
            )));
        }
        Ok(Some(state))
    }

    async fn save(&self, state: &ThreadState) -> Result<()> {
        let path = self.path_for(&state.thread_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(state)?;

        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(thread_id = %state.thread_id, path = %path.display(), "Saved checkpoint");
        Ok(())
    }
}

/// Encode a thread id as a file stem: `[A-Za-z0-9_-]` pass through, every
/// other byte becomes `%XX`.
fn encode_file_stem(thread_id: &str) -> String {
    let mut out = String::with_capacity(thread_id.len());
    for byte in thread_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    if out.is_empty() {
        out.push('%');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::upsert::UpsertMemoryArgs;
    use tempfile::TempDir;

    fn suspended_state(thread_id: &str) -> ThreadState {
        let mut proposal = Proposal::new(
            UpsertMemoryArgs {
                content: "likes tea".to_string(),
                context: "chat".to_string(),
                category: Some("personal".to_string()),
                memory_id: None,
            },
            "personal",
        );
        proposal.suspend().unwrap();

        let mut state = ThreadState::new(thread_id, "u1");
        state.messages.push(Message::user("I like tea"));
        state.pending = Some(PendingInterrupt {
            interrupt_id: "int-1".to_string(),
            tool_call_id: "call-1".to_string(),
            proposal,
        });
        state
    }

    #[test]
    fn test_encode_file_stem() {
        assert_eq!(encode_file_stem("thread-1_a"), "thread-1_a");
        assert_eq!(encode_file_stem("../etc/passwd"), "%2E%2E%2Fetc%2Fpasswd");
        assert_eq!(encode_file_stem("a b"), "a%20b");
        assert_eq!(encode_file_stem(""), "%");
    }

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let checkpointer = InMemoryCheckpointer::new();
        assert!(checkpointer.load("t1").await.unwrap().is_none());

        let state = suspended_state("t1");
        checkpointer.save(&state).await.unwrap();
        assert_eq!(checkpointer.load("t1").await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_file_checkpoint_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let state = suspended_state("thread/with:odd chars");
        {
            let checkpointer = FileCheckpointer::new(dir.path()).await.unwrap();
            checkpointer.save(&state).await.unwrap();
        }

        let reopened = FileCheckpointer::new(dir.path()).await.unwrap();
        let loaded = reopened.load("thread/with:odd chars").await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(loaded.is_suspended());

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().flatten().collect();
        assert_eq!(files.len(), 1, "temp file left behind");
    }

    #[tokio::test]
    async fn test_file_missing_thread() {
        let dir = TempDir::new().unwrap();
        let checkpointer = FileCheckpointer::new(dir.path()).await.unwrap();
        assert!(checkpointer.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_corrupt_checkpoint_is_error() {
        let dir = TempDir::new().unwrap();
        let checkpointer = FileCheckpointer::new(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("t1.json"), "{not json").unwrap();
        assert!(matches!(
            checkpointer.load("t1").await,
            Err(Error::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_file_rejects_future_schema() {
        let dir = TempDir::new().unwrap();
        let checkpointer = FileCheckpointer::new(dir.path()).await.unwrap();
        let mut state = suspended_state("t1");
        state.schema_version = CHECKPOINT_SCHEMA_VERSION + 1;
        checkpointer.save(&state).await.unwrap();

        let err = checkpointer.load("t1").await.unwrap_err();
        assert!(err.to_string().contains("Unsupported checkpoint schema version"));
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let checkpointer = FileCheckpointer::new(dir.path()).await.unwrap();
        let mut state = suspended_state("t1");
        checkpointer.save(&state).await.unwrap();

        state.pending = None;
        state.messages.push(Message::tool_result("call-1", "Stored memory x"));
        checkpointer.save(&state).await.unwrap();

        let loaded = checkpointer.load("t1").await.unwrap().unwrap();
        assert!(!loaded.is_suspended());
        assert_eq!(loaded.messages.len(), 2);
    }
}
