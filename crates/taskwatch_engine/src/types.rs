use std::fmt;

use taskwatch_core::{StatusUpdate, TaskId};

/// Events emitted by [`crate::ChannelTrackingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    Update { task_id: TaskId, update: StatusUpdate },
    Completed { task_id: TaskId, update: StatusUpdate },
}

impl TrackerEvent {
    pub fn task_id(&self) -> &TaskId {
        match self {
            TrackerEvent::Update { task_id, .. } | TrackerEvent::Completed { task_id, .. } => {
                task_id
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TrackError {
    pub kind: FailureKind,
    pub message: String,
}

impl TrackError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The server answered, but with something this client cannot read.
    pub fn is_protocol(&self) -> bool {
        self.kind.is_protocol()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    Network,
    UnsupportedContentType { content_type: String },
    MalformedPayload,
    InvalidOptions,
    NoRuntime,
}

impl FailureKind {
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            FailureKind::MalformedPayload | FailureKind::UnsupportedContentType { .. }
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FailureKind::MalformedPayload => write!(f, "malformed payload"),
            FailureKind::InvalidOptions => write!(f, "invalid tracking options"),
            FailureKind::NoRuntime => write!(f, "no async runtime"),
        }
    }
}
