//! Pipeline state machine and the opaque stage seam.
//!
//! [`PipelineEngine`] drives one session through the ordered
//! classify/scope/research/report sequence, persisting artifacts and emitting
//! a durable milestone event per transition. The reasoning work itself lives
//! behind the [`ResearchStages`] trait, so the engine is fully unit-testable
//! with deterministic fakes.

pub mod engine;
pub mod stages;

pub use engine::{PipelineEngine, PipelineError};
pub use stages::{
    IntentDecision, ResearchFindings, ResearchStages, ScopeOutcome, StageError, StageResult,
};
