//! Memory agent error types

use thiserror::Error;

/// Memory agent error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input failed validation (unknown category, malformed tool arguments)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A suspended proposal could not be recovered on resume
    #[error("Suspension lost for thread '{thread_id}': {reason}")]
    SuspensionLost {
        /// Conversation thread that was resumed
        thread_id: String,
        /// Why the checkpoint could not be recovered
        reason: String,
    },

    /// Resume was requested on a thread with nothing awaiting confirmation
    #[error("Thread '{0}' has no proposal awaiting confirmation")]
    NotSuspended(String),

    /// A new turn arrived while a proposal on the thread is unresolved
    #[error("Thread '{0}' is awaiting confirmation of a pending memory")]
    AwaitingConfirmation(String),

    /// Resume named a different interrupt than the one pending
    #[error("Interrupt mismatch: pending '{expected}', resumed '{actual}'")]
    InterruptMismatch {
        /// Interrupt id recorded in the checkpoint
        expected: String,
        /// Interrupt id supplied by the caller
        actual: String,
    },

    /// A thread was driven with an identity other than its owner's
    #[error("Identity mismatch for thread '{0}'")]
    IdentityMismatch(String),

    /// Language model error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Memory store error
    #[error("Store error: {0}")]
    Store(String),

    /// Agent orchestration error
    #[error("Agent error: {0}")]
    Agent(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for memory agent operations
pub type Result<T> = std::result::Result<T, Error>;
