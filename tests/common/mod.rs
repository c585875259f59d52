#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use session_relay::bus::LiveBus;
use session_relay::event::{EventKind, EventRecord, ProgressPhase};
use session_relay::message::Message;
use session_relay::pipeline::{
    IntentDecision, PipelineEngine, ResearchFindings, ResearchStages, ScopeOutcome, StageError,
    StageResult,
};
use session_relay::service::SessionService;
use session_relay::store::MemoryStore;
use session_relay::stream::{ConnectionProbe, StreamOptions};

/// Deterministic stage fake with a scriptable scope outcome queue.
pub struct StubStages {
    pub intent: IntentDecision,
    pub scope_script: Mutex<VecDeque<ScopeOutcome>>,
    pub findings: ResearchFindings,
    pub report: String,
    pub research_delay: Duration,
    pub fail_stage: Option<&'static str>,
}

impl StubStages {
    /// Stages that proceed straight through to a final report.
    pub fn proceeding() -> Self {
        Self {
            intent: IntentDecision {
                proceed: true,
                label: "research".into(),
            },
            scope_script: Mutex::new(VecDeque::new()),
            findings: ResearchFindings {
                summary: "compressed findings".into(),
                notes: vec!["note a".into(), "note b".into()],
            },
            report: "# Final Report".into(),
            research_delay: Duration::ZERO,
            fail_stage: None,
        }
    }

    /// Classify declines to enter the research workflow.
    pub fn non_research() -> Self {
        let mut stages = Self::proceeding();
        stages.intent = IntentDecision {
            proceed: false,
            label: "smalltalk".into(),
        };
        stages
    }

    /// First run asks a clarification question, subsequent runs get a brief.
    pub fn clarify_then_brief(question: &str, brief: &str) -> Self {
        let stages = Self::proceeding();
        stages
            .scope_script
            .lock()
            .push_back(ScopeOutcome::clarification(question));
        stages
            .scope_script
            .lock()
            .push_back(ScopeOutcome::brief(brief));
        stages
    }

    /// Fail the named stage with a canned message.
    pub fn failing(stage: &'static str) -> Self {
        let mut stages = Self::proceeding();
        stages.fail_stage = Some(stage);
        stages
    }

    pub fn with_research_delay(mut self, delay: Duration) -> Self {
        self.research_delay = delay;
        self
    }

    pub fn with_scope(self, outcome: ScopeOutcome) -> Self {
        self.scope_script.lock().push_back(outcome);
        self
    }

    fn check_fail(&self, stage: &'static str) -> StageResult<()> {
        if self.fail_stage == Some(stage) {
            Err(StageError::new(format!("stub {stage} failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ResearchStages for StubStages {
    async fn classify(&self, _conversation: &[Message]) -> StageResult<IntentDecision> {
        self.check_fail("classify")?;
        Ok(self.intent.clone())
    }

    async fn scope(&self, _conversation: &[Message]) -> StageResult<ScopeOutcome> {
        self.check_fail("scope")?;
        Ok(self
            .scope_script
            .lock()
            .pop_front()
            .unwrap_or_else(|| ScopeOutcome::brief("default brief")))
    }

    async fn research(&self, brief: &str) -> StageResult<ResearchFindings> {
        self.check_fail("research")?;
        if !self.research_delay.is_zero() {
            tokio::time::sleep(self.research_delay).await;
        }
        let mut findings = self.findings.clone();
        findings.notes.push(format!("brief: {brief}"));
        Ok(findings)
    }

    async fn report(&self, _brief: &str, summary: &str) -> StageResult<String> {
        self.check_fail("report")?;
        Ok(format!("{}\n\n{summary}", self.report))
    }
}

/// Fully wired in-memory assembly for tests.
pub struct Rig {
    pub store: Arc<MemoryStore>,
    pub bus: Arc<LiveBus>,
    pub engine: Arc<PipelineEngine>,
    pub service: SessionService,
}

pub fn rig(stages: StubStages) -> Rig {
    rig_opts(stages, Duration::from_secs(2), 200, StreamOptions::default())
}

pub fn rig_opts(
    stages: StubStages,
    heartbeat: Duration,
    bus_capacity: usize,
    stream: StreamOptions,
) -> Rig {
    let store = Arc::new(MemoryStore::new());
    let bus = LiveBus::new(bus_capacity);
    let engine = Arc::new(
        PipelineEngine::new(
            store.clone(),
            store.clone(),
            bus.clone(),
            Arc::new(stages),
        )
        .with_heartbeat_interval(heartbeat),
    );
    let service = SessionService::new(store.clone(), store.clone(), bus.clone(), engine.clone(), stream);
    Rig {
        store,
        bus,
        engine,
        service,
    }
}

/// Event kind names in log order.
pub fn kind_names(events: &[EventRecord]) -> Vec<&'static str> {
    events.iter().map(|e| e.kind.name()).collect()
}

/// Indices of running-phase heartbeats within a slice of events.
pub fn running_heartbeats(events: &[EventRecord]) -> Vec<usize> {
    events
        .iter()
        .enumerate()
        .filter(|(_, e)| {
            matches!(
                e.kind,
                EventKind::ResearchProgress {
                    stage: ProgressPhase::Running,
                    ..
                }
            )
        })
        .map(|(i, _)| i)
        .collect()
}

/// Shared-flag connection probe for driving disconnects from tests.
#[derive(Clone, Default)]
pub struct FlagProbe {
    disconnected: Arc<AtomicBool>,
}

impl FlagProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionProbe for FlagProbe {
    async fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}
