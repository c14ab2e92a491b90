//! Common types for completion requests

/// Completion request: instructions plus ordered conversation turns.
/// The last turn is the inbound message being answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub instructions: Option<String>,
    pub turns: Vec<Turn>,
}

/// Single turn in a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}
