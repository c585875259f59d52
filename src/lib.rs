//! # session-relay: durable session events with live fan-out
//!
//! This crate runs a long-lived, multi-stage research pipeline per user
//! session and lets any number of clients observe its progress in real time,
//! including clients that connect late or reconnect mid-flight.
//!
//! ## Core Concepts
//!
//! - **Event log**: durable, append-only, per-session log with gapless
//!   monotonic ids and range reads ([`store::EventLog`])
//! - **Live bus**: in-memory per-session fan-out with bounded subscriber
//!   queues and slow-consumer isolation ([`bus::LiveBus`])
//! - **Stream coordinator**: merges durable replay and live delivery into one
//!   ordered SSE-framed feed with keepalives ([`stream::StreamCoordinator`])
//! - **Pipeline engine**: the state machine driving classify/scope/research/
//!   report, persisting artifacts and emitting a milestone event per
//!   transition ([`pipeline::PipelineEngine`])
//!
//! The durable log is the source of truth: live delivery is best-effort and
//! at-most-once, and a client recovers anything it missed by reconnecting
//! with its last seen event id.
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use session_relay::bus::LiveBus;
//! use session_relay::config::RelayConfig;
//! use session_relay::message::Message;
//! use session_relay::pipeline::{
//!     IntentDecision, PipelineEngine, ResearchFindings, ResearchStages, ScopeOutcome,
//!     StageResult,
//! };
//! use session_relay::service::SessionService;
//! use session_relay::store::MemoryStore;
//! use async_trait::async_trait;
//!
//! struct EchoStages;
//!
//! #[async_trait]
//! impl ResearchStages for EchoStages {
//!     async fn classify(&self, _: &[Message]) -> StageResult<IntentDecision> {
//!         Ok(IntentDecision { proceed: true, label: "demo".into() })
//!     }
//!     async fn scope(&self, _: &[Message]) -> StageResult<ScopeOutcome> {
//!         Ok(ScopeOutcome::brief("demo brief"))
//!     }
//!     async fn research(&self, brief: &str) -> StageResult<ResearchFindings> {
//!         Ok(ResearchFindings { summary: format!("findings for {brief}"), notes: vec![] })
//!     }
//!     async fn report(&self, _: &str, summary: &str) -> StageResult<String> {
//!         Ok(format!("# Report\n\n{summary}"))
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let config = RelayConfig::default();
//! let store = Arc::new(MemoryStore::new());
//! let bus = LiveBus::new(config.bus_capacity);
//! let engine = Arc::new(PipelineEngine::new(
//!     store.clone(),
//!     store.clone(),
//!     bus.clone(),
//!     Arc::new(EchoStages),
//! ));
//! let service = SessionService::new(store.clone(), store, bus, engine, config.stream);
//!
//! let session = service.create_session().await.unwrap();
//! let run = service.post_message(&session.session_id, "look into rust crates").await.unwrap();
//! run.join().await.unwrap();
//!
//! let done = service.read_session(&session.session_id).await.unwrap();
//! assert!(done.final_report.is_some());
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`session`] / [`message`] - session snapshots and conversation entries
//! - [`event`] - typed event records with gapless per-session ids
//! - [`store`] - `SessionStore`/`EventLog` traits, memory and SQLite backends
//! - [`bus`] - in-memory live fan-out
//! - [`stream`] - SSE framing and the replay+live coordinator
//! - [`pipeline`] - stage seam and the pipeline state machine
//! - [`service`] - the facade a transport layer calls into
//! - [`config`] / [`telemetry`] - process wiring

pub mod bus;
pub mod config;
pub mod event;
pub mod message;
pub mod pipeline;
pub mod service;
pub mod session;
pub mod store;
pub mod stream;
pub mod telemetry;
