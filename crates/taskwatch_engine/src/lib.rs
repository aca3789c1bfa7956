//! Taskwatch engine: HTTP transports and the async tracking loop.
mod sse;
mod submit;
mod tracker;
mod transport;
mod types;

pub use sse::{SseEvent, SseParser};
pub use submit::{QueryRequest, Submission};
pub use tracker::{
    CallbackSink, ChannelTrackingSink, TaskTracker, TrackOptions, TrackingHandle, TrackingSink,
    DEFAULT_POLL_INTERVAL,
};
pub use transport::{
    ReqwestTransport, SnapshotStream, StatusTransport, TransportSettings, DEFAULT_BASE_URL,
};
pub use types::{FailureKind, TrackError, TrackerEvent};
