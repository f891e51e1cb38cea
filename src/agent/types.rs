//! Types exchanged between the host and the memory agent

use serde::{Deserialize, Serialize};

/// Host-authenticated caller. Never derived from model output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// A confirmation request surfaced to the human
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interrupt {
    /// Pass back in `Resume::interrupt_id` to guard against stale answers
    pub id: String,
    pub prompt: String,
}

/// The human's answer to an interrupt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resume {
    /// Free text; only `"accept"` commits
    pub value: String,
    /// When set, must name the pending interrupt
    #[serde(default)]
    pub interrupt_id: Option<String>,
}

impl Resume {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            interrupt_id: None,
        }
    }

    /// Bind the answer to a specific interrupt
    pub fn for_interrupt(mut self, interrupt_id: impl Into<String>) -> Self {
        self.interrupt_id = Some(interrupt_id.into());
        self
    }
}

/// Where a turn (or a resume) stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The model produced its reply
    Completed { reply: String },
    /// A memory proposal awaits confirmation
    Interrupted(Interrupt),
}

impl TurnOutcome {
    pub fn reply(&self) -> Option<&str> {
        match self {
            TurnOutcome::Completed { reply } => Some(reply),
            TurnOutcome::Interrupted(_) => None,
        }
    }

    pub fn interrupt(&self) -> Option<&Interrupt> {
        match self {
            TurnOutcome::Completed { .. } => None,
            TurnOutcome::Interrupted(interrupt) => Some(interrupt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_accessors() {
        let done = TurnOutcome::Completed {
            reply: "hi".to_string(),
        };
        assert_eq!(done.reply(), Some("hi"));
        assert!(done.interrupt().is_none());

        let paused = TurnOutcome::Interrupted(Interrupt {
            id: "i1".to_string(),
            prompt: "confirm?".to_string(),
        });
        assert!(paused.reply().is_none());
        assert_eq!(paused.interrupt().map(|i| i.id.as_str()), Some("i1"));
    }

    #[test]
    fn test_outcome_wire_shape() {
        let paused = TurnOutcome::Interrupted(Interrupt {
            id: "i1".to_string(),
            prompt: "confirm?".to_string(),
        });
        assert_eq!(
            serde_json::to_value(&paused).unwrap(),
            serde_json::json!({"type": "interrupted", "id": "i1", "prompt": "confirm?"})
        );
    }

    #[test]
    fn test_resume_builder() {
        let resume = Resume::new("accept").for_interrupt("i1");
        assert_eq!(resume.value, "accept");
        assert_eq!(resume.interrupt_id.as_deref(), Some("i1"));
    }
}
