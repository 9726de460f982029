//! Live and batch telemetry ingestion.

pub mod batch;
pub mod channel;
pub mod service;
pub mod socket;
pub mod telemetry;
pub mod timers;

pub use batch::{BatchEvent, BatchOutcome, BatchRequest, ingest_batch};
pub use channel::{ChannelKey, ChannelState, Decision, SkipReason, WriteReason};
pub use service::{IngestService, IngestStats};
pub use telemetry::{ChannelSample, TelemetryEvent};
pub use timers::StopTimers;
