//! The pipeline state machine.

use std::sync::Arc;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;
use tokio::time::{Instant, interval_at};

use crate::bus::LiveBus;
use crate::event::{EventKind, EventRecord, ProgressPhase};
use crate::session::SessionStatus;
use crate::store::{EventLog, SessionStore, StoreError};

use super::stages::{ResearchStages, StageError};

/// Default heartbeat cadence while the research stage is in flight.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

/// Failures inside one pipeline run.
///
/// These never escape [`PipelineEngine::run_reported`]; they are converted to
/// a persisted `error` status plus an `error` event there.
#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error("{stage} stage failed: {source}")]
    #[diagnostic(code(session_relay::pipeline::stage))]
    Stage {
        stage: &'static str,
        #[source]
        source: StageError,
    },

    #[error("{stage} stage violated its contract: {message}")]
    #[diagnostic(
        code(session_relay::pipeline::stage_contract),
        help("The stage returned neither of its expected outcomes; fix the stage implementation.")
    )]
    StageContract {
        stage: &'static str,
        message: String,
    },
}

impl PipelineError {
    fn stage(stage: &'static str, source: StageError) -> Self {
        Self::Stage { stage, source }
    }
}

/// Runs the ordered stage sequence for one session.
///
/// The engine is the sole writer of session artifacts and the sole producer
/// of events. For a given session it issues appends serially, and every
/// milestone follows the same discipline: persist the artifact, append the
/// event to the durable log, then publish to live subscribers. A crash
/// between append and publish loses only the live notification; the durable
/// record survives.
pub struct PipelineEngine {
    store: Arc<dyn SessionStore>,
    log: Arc<dyn EventLog>,
    bus: Arc<LiveBus>,
    stages: Arc<dyn ResearchStages>,
    heartbeat_interval: Duration,
}

impl PipelineEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        log: Arc<dyn EventLog>,
        bus: Arc<LiveBus>,
        stages: Arc<dyn ResearchStages>,
    ) -> Self {
        Self {
            store,
            log,
            bus,
            stages,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    /// Override the research heartbeat cadence.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Append to the durable log, then publish to live subscribers.
    ///
    /// Append is on the critical path before publish: if it fails, nothing is
    /// published, so a live subscriber can never see an unlogged event.
    async fn emit(&self, session_id: &str, kind: EventKind) -> Result<EventRecord, PipelineError> {
        let record = self.log.append(session_id, kind, None).await?;
        let delivered = self.bus.publish(session_id, &record);
        tracing::debug!(
            session_id,
            event_id = record.id,
            kind = record.kind.name(),
            delivered,
            "milestone event emitted"
        );
        Ok(record)
    }

    /// Execute one full run for `session_id`, propagating the first failure.
    ///
    /// Most callers want [`run_reported`](Self::run_reported), which adds the
    /// outer error boundary.
    pub async fn run(&self, session_id: &str) -> Result<(), PipelineError> {
        let run_started = Instant::now();
        let mut session = self.store.load_session(session_id).await?;

        tracing::info!(
            session_id,
            status = %session.status,
            messages = session.messages.len(),
            "pipeline run start"
        );

        if session.status != SessionStatus::Running {
            session.status = SessionStatus::Running;
            session.touch();
            self.store.save_session(&session).await?;
        }

        // Classify: decides whether to proceed at all.
        let stage_started = Instant::now();
        let intent = self
            .stages
            .classify(&session.messages)
            .await
            .map_err(|e| PipelineError::stage("classify", e))?;
        tracing::info!(
            session_id,
            proceed = intent.proceed,
            label = %intent.label,
            duration_ms = stage_started.elapsed().as_millis() as u64,
            "classify done"
        );
        session.intent = Some(intent.clone());
        session.touch();
        self.store.save_session(&session).await?;
        self.emit(
            session_id,
            EventKind::IntentDetected {
                intent: intent.clone(),
            },
        )
        .await?;

        if !intent.proceed {
            session.status = SessionStatus::Completed;
            session.touch();
            self.store.save_session(&session).await?;
            tracing::info!(
                session_id,
                total_ms = run_started.elapsed().as_millis() as u64,
                "pipeline stop (non-research intent)"
            );
            return Ok(());
        }

        // Scope: clarification question or finalized brief.
        let scope = self
            .stages
            .scope(&session.messages)
            .await
            .map_err(|e| PipelineError::stage("scope", e))?;

        if let Some(question) = scope.clarification_question {
            session.push_assistant(question.clone());
            session.clarification_question = Some(question.clone());
            session.status = SessionStatus::NeedsClarification;
            self.store.save_session(&session).await?;
            self.emit(session_id, EventKind::ScopeClarificationNeeded { question })
                .await?;
            tracing::info!(
                session_id,
                total_ms = run_started.elapsed().as_millis() as u64,
                "pipeline paused for clarification"
            );
            return Ok(());
        }

        let brief = scope
            .research_brief
            .ok_or_else(|| PipelineError::StageContract {
                stage: "scope",
                message: "produced neither clarification question nor research brief".into(),
            })?;
        if let Some(note) = scope.assistant_note {
            session.push_assistant(note);
        }
        session.research_brief = Some(brief.clone());
        session.clarification_question = None;
        session.touch();
        self.store.save_session(&session).await?;
        self.emit(
            session_id,
            EventKind::ResearchBriefReady {
                research_brief: brief.clone(),
            },
        )
        .await?;

        // Research: long-running, with periodic heartbeats. The ticker lives
        // only as long as this loop, so stage completion immediately stops
        // the heartbeats.
        let research_started = Instant::now();
        self.emit(
            session_id,
            EventKind::ResearchProgress {
                stage: ProgressPhase::Start,
                elapsed_s: 0.0,
            },
        )
        .await?;

        let mut stage_fut = self.stages.research(&brief);
        let mut ticker = interval_at(
            Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        let findings = loop {
            tokio::select! {
                result = &mut stage_fut => {
                    break result.map_err(|e| PipelineError::stage("research", e))?;
                }
                _ = ticker.tick() => {
                    self.emit(
                        session_id,
                        EventKind::ResearchProgress {
                            stage: ProgressPhase::Running,
                            elapsed_s: round_elapsed(research_started),
                        },
                    )
                    .await?;
                }
            }
        };

        session.research_summary = Some(findings.summary.clone());
        session.raw_notes = findings.notes;
        session.touch();
        self.store.save_session(&session).await?;
        self.emit(
            session_id,
            EventKind::ResearchProgress {
                stage: ProgressPhase::Complete,
                elapsed_s: round_elapsed(research_started),
            },
        )
        .await?;
        self.emit(
            session_id,
            EventKind::ResearchComplete {
                research_summary: findings.summary.clone(),
            },
        )
        .await?;
        tracing::info!(
            session_id,
            duration_ms = research_started.elapsed().as_millis() as u64,
            notes = session.raw_notes.len(),
            "research done"
        );

        // Report: final artifact; terminal success transition.
        let report = self
            .stages
            .report(&brief, &findings.summary)
            .await
            .map_err(|e| PipelineError::stage("report", e))?;
        session.final_report = Some(report.clone());
        session.status = SessionStatus::Completed;
        session.touch();
        self.store.save_session(&session).await?;
        self.emit(
            session_id,
            EventKind::FinalReportReady {
                final_report: report,
            },
        )
        .await?;

        tracing::info!(
            session_id,
            total_ms = run_started.elapsed().as_millis() as u64,
            "pipeline run completed"
        );
        Ok(())
    }

    /// Run with the outer error boundary: any failure is caught exactly once,
    /// persisted as `error` status with `last_error`, reported as an `error`
    /// event, and never re-raised. Pipeline failures are terminal-but-reported.
    pub async fn run_reported(&self, session_id: &str) {
        if let Err(err) = self.run(session_id).await {
            tracing::error!(session_id, error = %err, "pipeline run failed");
            if let Err(report_err) = self.record_failure(session_id, &err).await {
                // Best effort only; there is no caller left to notify.
                tracing::warn!(
                    session_id,
                    error = %report_err,
                    "failed to record pipeline failure"
                );
            }
        }
    }

    async fn record_failure(
        &self,
        session_id: &str,
        err: &PipelineError,
    ) -> Result<(), PipelineError> {
        let mut session = self.store.load_session(session_id).await?;
        session.status = SessionStatus::Error;
        session.last_error = Some(err.to_string());
        session.touch();
        self.store.save_session(&session).await?;
        self.emit(
            session_id,
            EventKind::Error {
                message: err.to_string(),
            },
        )
        .await?;
        Ok(())
    }
}

impl std::fmt::Debug for PipelineEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineEngine")
            .field("heartbeat_interval", &self.heartbeat_interval)
            .finish()
    }
}

fn round_elapsed(since: Instant) -> f64 {
    (since.elapsed().as_secs_f64() * 10.0).round() / 10.0
}
