use crate::StatusSnapshot;

/// Inputs that advance a [`crate::TrackingSession`].
#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Tracking begins; selects the first transport.
    Start { prefer_stream: bool },
    /// The push stream was opened successfully.
    StreamOpened,
    /// The push stream could not be opened.
    StreamUnavailable { reason: String },
    /// A snapshot arrived from either transport.
    Snapshot(StatusSnapshot),
    /// The push stream errored or closed on its own.
    StreamInterrupted { reason: String },
    /// A status request failed, or a pushed payload could not be decoded.
    RequestFailed { error: String },
    /// The poll interval elapsed.
    PollDue,
    /// The caller cancelled tracking.
    Cancel,
}
