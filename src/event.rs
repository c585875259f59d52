//! Durable event model.
//!
//! Every pipeline milestone becomes an [`EventRecord`]: an immutable record
//! with a per-session gapless id assigned by the event log at append time.
//! The id sequence is the ordering backbone for replay and live delivery.
//!
//! [`EventKind`] is a tagged union, one variant per milestone, each carrying
//! its own typed payload. Consumers matching on it get compile-time
//! exhaustiveness instead of probing loose payload maps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pipeline::IntentDecision;

/// Phase marker carried by `research_progress` events.
///
/// `Start` and `Complete` bracket the research stage; `Running` entries are
/// the periodic heartbeats emitted while it executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Start,
    Running,
    Complete,
}

/// A pipeline milestone with its typed payload.
///
/// Serializes as `{"type": "<snake_case name>", "payload": {…}}`; the type
/// string doubles as the SSE `event:` field via [`EventKind::name`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventKind {
    IntentDetected {
        intent: IntentDecision,
    },
    ScopeClarificationNeeded {
        question: String,
    },
    ResearchBriefReady {
        research_brief: String,
    },
    ResearchProgress {
        stage: ProgressPhase,
        elapsed_s: f64,
    },
    ResearchComplete {
        research_summary: String,
    },
    FinalReportReady {
        final_report: String,
    },
    Error {
        message: String,
    },
}

impl EventKind {
    /// Wire name of this event type.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::IntentDetected { .. } => "intent_detected",
            EventKind::ScopeClarificationNeeded { .. } => "scope_clarification_needed",
            EventKind::ResearchBriefReady { .. } => "research_brief_ready",
            EventKind::ResearchProgress { .. } => "research_progress",
            EventKind::ResearchComplete { .. } => "research_complete",
            EventKind::FinalReportReady { .. } => "final_report_ready",
            EventKind::Error { .. } => "error",
        }
    }

    /// The payload object on its own, without the type tag.
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        Ok(value
            .as_object_mut()
            .and_then(|obj| obj.remove("payload"))
            .unwrap_or(Value::Null))
    }

    /// Rebuild a kind from a stored `(type, payload)` pair.
    pub fn from_parts(name: &str, payload: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::json!({ "type": name, "payload": payload }))
    }
}

/// An immutable, durably ordered event for one session.
///
/// `id` starts at 1 per session, increases without gaps, and is assigned
/// atomically by the event log. `ts` is informational; id order is
/// authoritative and matches append order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: u64,
    pub session_id: String,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_match_wire_types() {
        let kind = EventKind::ScopeClarificationNeeded {
            question: "which market?".into(),
        };
        assert_eq!(kind.name(), "scope_clarification_needed");

        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value["type"], "scope_clarification_needed");
        assert_eq!(value["payload"]["question"], "which market?");
    }

    #[test]
    fn payload_and_from_parts_invert() {
        let kind = EventKind::ResearchProgress {
            stage: ProgressPhase::Running,
            elapsed_s: 4.0,
        };
        let payload = kind.payload().unwrap();
        assert_eq!(payload["stage"], "running");

        let rebuilt = EventKind::from_parts("research_progress", payload).unwrap();
        assert_eq!(rebuilt, kind);
    }

    #[test]
    fn record_serializes_flat() {
        let record = EventRecord {
            id: 3,
            session_id: "s1".into(),
            ts: Utc::now(),
            kind: EventKind::Error {
                message: "boom".into(),
            },
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], 3);
        assert_eq!(value["type"], "error");
        assert_eq!(value["payload"]["message"], "boom");
    }
}
