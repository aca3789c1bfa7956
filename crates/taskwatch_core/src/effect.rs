use crate::StatusUpdate;

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open the push stream for the task.
    OpenStream,
    /// Request the current snapshot once, now.
    Poll,
    /// Arm the poll timer for one interval from now.
    SchedulePoll,
    /// Hand a snapshot to the caller's update callback.
    DeliverUpdate(StatusUpdate),
    /// Hand the terminal snapshot to the caller's completion callback.
    DeliverComplete(StatusUpdate),
    /// Release the active timer or stream.
    CloseTransport,
}
