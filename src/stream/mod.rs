//! Ordered event streaming for one client connection.
//!
//! [`StreamCoordinator`] stitches a bounded replay from the durable log and a
//! continuing live feed from the bus into a single monotonically ordered
//! sequence of [`SseFrame`]s. Transport integration happens through the
//! [`FrameSink`] and [`ConnectionProbe`] seams, so the coordinator can be
//! driven by an HTTP handler or exercised directly in tests.

pub mod coordinator;
pub mod frame;

pub use coordinator::{StreamCoordinator, StreamError, StreamOptions};
pub use frame::{AlwaysConnected, ConnectionProbe, FrameSink, SinkClosed, SseFrame};
