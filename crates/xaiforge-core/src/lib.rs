//! Xaiforge Core - Events, trace storage, replay verification, and metrics

pub mod diff;
pub mod error;
pub mod events;
pub mod metrics;
pub mod query;
pub mod replay;
pub mod report;
pub mod run_metrics;
pub mod store;

pub use error::{Error, Result};
pub use events::{event_schema, Event, EventMeta, Role, RollingHasher, RunStatus};
pub use replay::{verify_trace, ReplayResult};
pub use store::{list_manifests, ManifestSummary, TraceManifest, TraceReader, TraceStore};
