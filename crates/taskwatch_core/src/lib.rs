//! Taskwatch core: task status model, pure tracking state machine and text formatting.
mod effect;
pub mod format;
mod msg;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use format::{
    download_path, format, DownloadLink, FormattedBlock, Inline, RichText, Table, TextFormatter,
};
pub use msg::Msg;
pub use state::{
    SessionPhase, StatusSnapshot, StatusUpdate, TaskId, TaskStatus, TrackingSession,
    TransportMode,
};
pub use update::{update, CONNECTION_INTERRUPTED};
pub use view_model::{display_text, DownloadTarget, SnapshotView};
