//! The opaque stage interface consumed by the engine.
//!
//! Each stage is a pure-input pure-output async call. The engine never
//! inspects stage internals; it persists their typed results and advances
//! state. Implementations doing CPU-bound or blocking work (model calls,
//! scraping) must off-load internally, e.g. via `tokio::task::spawn_blocking`,
//! so they never stall the runtime serving concurrent streams.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::Message;

/// Outcome of the classify stage: whether to proceed, and a short label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentDecision {
    /// Whether the conversation should enter the research workflow.
    pub proceed: bool,
    /// Short human-readable intent label.
    pub label: String,
}

/// Outcome of the scope stage.
///
/// Exactly one of `clarification_question` or `research_brief` is expected.
/// Both fields stay optional because the underlying reasoning engine can
/// legitimately produce neither; the engine treats that case as a fatal
/// stage-contract violation rather than papering over it here.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScopeOutcome {
    /// Question to put back to the user before research can start.
    pub clarification_question: Option<String>,
    /// Finalized research brief.
    pub research_brief: Option<String>,
    /// Optional assistant-visible note accompanying a brief (e.g. a
    /// verification summary), appended to the conversation.
    pub assistant_note: Option<String>,
}

impl ScopeOutcome {
    /// A scope outcome that asks the user to clarify.
    #[must_use]
    pub fn clarification(question: impl Into<String>) -> Self {
        Self {
            clarification_question: Some(question.into()),
            ..Self::default()
        }
    }

    /// A scope outcome with a finalized brief.
    #[must_use]
    pub fn brief(brief: impl Into<String>) -> Self {
        Self {
            research_brief: Some(brief.into()),
            ..Self::default()
        }
    }

    /// Attach an assistant note to a brief outcome.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.assistant_note = Some(note.into());
        self
    }
}

/// Outcome of the research stage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResearchFindings {
    /// Compressed research summary.
    pub summary: String,
    /// Raw notes accumulated along the way.
    pub notes: Vec<String>,
}

/// Opaque failure inside a stage implementation.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StageError {
    pub message: String,
}

impl StageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type StageResult<T> = Result<T, StageError>;

/// The four ordered reasoning stages of a pipeline run.
#[async_trait]
pub trait ResearchStages: Send + Sync {
    /// Decide whether the conversation should proceed into research.
    async fn classify(&self, conversation: &[Message]) -> StageResult<IntentDecision>;

    /// Either ask a clarification question or finalize a research brief.
    async fn scope(&self, conversation: &[Message]) -> StageResult<ScopeOutcome>;

    /// Execute the (potentially long-running) research for a brief.
    async fn research(&self, brief: &str) -> StageResult<ResearchFindings>;

    /// Produce the final report from the brief and research summary.
    async fn report(&self, brief: &str, summary: &str) -> StageResult<String>;
}
