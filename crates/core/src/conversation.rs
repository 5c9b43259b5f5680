//! Conversation turn and record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speaker of a dialogue turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

/// A single immutable turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub role: TurnRole,
    pub content: String,
    pub recorded_at: DateTime<Utc>,
}

impl DialogueTurn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Ordered history of one dialogue
///
/// `updated_at` is refreshed on every append. It is informational only; the
/// cache ranks and expires records on its own monotonic clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub turns: Vec<DialogueTurn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationRecord {
    /// Create an empty record
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a turn, then drop the oldest turns until at most `max_turns` remain.
    ///
    /// Turn timestamps never go backwards within a record, even if the wall
    /// clock does.
    pub fn push_turn(&mut self, role: TurnRole, content: impl Into<String>, max_turns: usize) {
        let mut turn = DialogueTurn::new(role, content);
        if let Some(last) = self.turns.last() {
            if turn.recorded_at < last.recorded_at {
                turn.recorded_at = last.recorded_at;
            }
        }
        self.updated_at = self.updated_at.max(turn.recorded_at);
        self.turns.push(turn);

        if self.turns.len() > max_turns {
            let excess = self.turns.len() - max_turns;
            self.turns.drain(..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last_turn(&self) -> Option<&DialogueTurn> {
        self.turns.last()
    }
}
