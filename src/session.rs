//! Session snapshot types.
//!
//! A [`Session`] is the single durable snapshot of one conversation plus the
//! artifacts its pipeline runs have produced so far. All mutation is
//! read-modify-write of the whole snapshot; readers never observe a partially
//! written artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::pipeline::IntentDecision;

/// Lifecycle status of a session.
///
/// Transitions: `New -> Running -> {NeedsClarification, Completed, Error}`,
/// with `NeedsClarification -> Running` on the next user message (re-entrant).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    New,
    Running,
    NeedsClarification,
    Completed,
    Error,
}

impl SessionStatus {
    /// Stable string form, matching the serialized representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::New => "new",
            SessionStatus::Running => "running",
            SessionStatus::NeedsClarification => "needs_clarification",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable snapshot of one session.
///
/// Artifact fields are each either absent or finalized; the pipeline never
/// persists a half-written value. `updated_at` is monotonically non-decreasing
/// because every mutation goes through [`Session::touch`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: SessionStatus,

    /// Conversation history, append-only.
    #[serde(default)]
    pub messages: Vec<Message>,

    // Pipeline artifacts.
    pub intent: Option<IntentDecision>,
    pub clarification_question: Option<String>,
    pub research_brief: Option<String>,
    pub research_summary: Option<String>,
    #[serde(default)]
    pub raw_notes: Vec<String>,
    pub final_report: Option<String>,

    /// Set only when `status == Error`.
    pub last_error: Option<String>,
}

impl Session {
    /// Create a fresh session in the `New` status.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            created_at: now,
            updated_at: now,
            status: SessionStatus::New,
            messages: Vec::new(),
            intent: None,
            clarification_question: None,
            research_brief: None,
            research_summary: None,
            raw_notes: Vec::new(),
            final_report: None,
            last_error: None,
        }
    }

    /// Bump `updated_at`, clamped so it never moves backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Append a user message and touch the snapshot.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
        self.touch();
    }

    /// Append an assistant message and touch the snapshot.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
        self.touch();
    }

    /// Last user message content, if any. Used for log previews.
    pub fn last_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.has_role(Message::USER))
            .map(|m| m.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&SessionStatus::NeedsClarification).unwrap();
        assert_eq!(json, "\"needs_clarification\"");
        assert_eq!(SessionStatus::NeedsClarification.as_str(), "needs_clarification");
    }

    #[test]
    fn touch_never_regresses() {
        let mut session = Session::new("s1");
        let before = session.updated_at;
        session.touch();
        assert!(session.updated_at >= before);
    }

    #[test]
    fn last_user_content_skips_assistant() {
        let mut session = Session::new("s1");
        session.push_user("first");
        session.push_assistant("which region?");
        assert_eq!(session.last_user_content(), Some("first"));
    }
}
