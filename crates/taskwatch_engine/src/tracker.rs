use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use taskwatch_core::{update, Effect, Msg, StatusSnapshot, StatusUpdate, TaskId, TrackingSession};
use taskwatch_logging::{track_debug, track_info, track_warn};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::transport::{SnapshotStream, StatusTransport};
use crate::{FailureKind, TrackError, TrackerEvent};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackOptions {
    /// Delay between the end of one poll and the start of the next.
    pub poll_interval: Duration,
    /// Try the push channel first and fall back to polling.
    pub prefer_stream: bool,
}

impl Default for TrackOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            prefer_stream: true,
        }
    }
}

/// Receives the timeline of one tracked task.
///
/// Calls for a session never overlap. `on_complete` is called at most once
/// and always after the `on_update` carrying the same terminal snapshot.
pub trait TrackingSink: Send + Sync {
    fn on_update(&self, task_id: &TaskId, update: &StatusUpdate);
    fn on_complete(&self, task_id: &TaskId, update: &StatusUpdate);
}

pub struct ChannelTrackingSink {
    tx: mpsc::Sender<TrackerEvent>,
}

impl ChannelTrackingSink {
    pub fn new(tx: mpsc::Sender<TrackerEvent>) -> Self {
        Self { tx }
    }
}

impl TrackingSink for ChannelTrackingSink {
    fn on_update(&self, task_id: &TaskId, update: &StatusUpdate) {
        let _ = self.tx.send(TrackerEvent::Update {
            task_id: task_id.clone(),
            update: update.clone(),
        });
    }

    fn on_complete(&self, task_id: &TaskId, update: &StatusUpdate) {
        let _ = self.tx.send(TrackerEvent::Completed {
            task_id: task_id.clone(),
            update: update.clone(),
        });
    }
}

/// Adapts a pair of closures to [`TrackingSink`].
pub struct CallbackSink<U, C> {
    on_update: U,
    on_complete: C,
}

impl<U, C> CallbackSink<U, C>
where
    U: Fn(&TaskId, &StatusUpdate) + Send + Sync,
    C: Fn(&TaskId, &StatusUpdate) + Send + Sync,
{
    pub fn new(on_update: U, on_complete: C) -> Self {
        Self {
            on_update,
            on_complete,
        }
    }
}

impl<U, C> TrackingSink for CallbackSink<U, C>
where
    U: Fn(&TaskId, &StatusUpdate) + Send + Sync,
    C: Fn(&TaskId, &StatusUpdate) + Send + Sync,
{
    fn on_update(&self, task_id: &TaskId, update: &StatusUpdate) {
        (self.on_update)(task_id, update)
    }

    fn on_complete(&self, task_id: &TaskId, update: &StatusUpdate) {
        (self.on_complete)(task_id, update)
    }
}

/// Starts tracking sessions on the current tokio runtime.
#[derive(Clone)]
pub struct TaskTracker {
    transport: Arc<dyn StatusTransport>,
}

impl TaskTracker {
    pub fn new(transport: Arc<dyn StatusTransport>) -> Self {
        Self { transport }
    }

    /// Begin tracking `task_id`. Must be called from within a tokio runtime.
    pub fn start_tracking(
        &self,
        task_id: TaskId,
        sink: Arc<dyn TrackingSink>,
        options: TrackOptions,
    ) -> Result<TrackingHandle, TrackError> {
        if options.poll_interval.is_zero() {
            return Err(TrackError::new(
                FailureKind::InvalidOptions,
                "poll interval must be positive",
            ));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| TrackError::new(FailureKind::NoRuntime, err.to_string()))?;

        let gate = Arc::new(DeliveryGate::new());
        let token = CancellationToken::new();
        let runner = SessionRunner {
            task_id: task_id.clone(),
            transport: self.transport.clone(),
            sink,
            gate: gate.clone(),
            token: token.clone(),
            options,
        };
        track_info!(
            "Tracking task {task_id} ({})",
            if options.prefer_stream { "stream" } else { "poll" }
        );
        let task = runtime.spawn(runner.run());

        Ok(TrackingHandle {
            task_id,
            gate,
            token,
            task: Some(task),
        })
    }
}

/// Control over one running session.
pub struct TrackingHandle {
    task_id: TaskId,
    gate: Arc<DeliveryGate>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TrackingHandle {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Stop the session. Once this returns no callback is running or will run,
    /// unless it is called from inside one of this session's callbacks, in
    /// which case that callback is the last.
    pub fn cancel(&self) {
        if !self.gate.is_closed() {
            track_info!("Cancelling tracking of task {}", self.task_id);
        }
        self.gate.close();
        self.token.cancel();
    }

    /// True once the session completed or was cancelled.
    pub fn is_terminated(&self) -> bool {
        self.gate.is_closed()
    }

    /// Wait for the background task to wind down. Safe to race against
    /// other futures: if dropped early, a later call waits again.
    pub async fn finished(&mut self) {
        let Some(task) = self.task.as_mut() else {
            return;
        };
        let result = task.await;
        self.task = None;
        if let Err(err) = result {
            track_warn!("Tracking task {} ended abnormally: {err}", self.task_id);
        }
    }
}

static NEXT_GATE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static DELIVERING: Cell<u64> = const { Cell::new(0) };
}

/// Serializes callbacks and makes cancellation wait for an in-flight one.
struct DeliveryGate {
    id: u64,
    closed: AtomicBool,
    delivery: Mutex<()>,
}

impl DeliveryGate {
    fn new() -> Self {
        Self {
            id: NEXT_GATE_ID.fetch_add(1, Ordering::Relaxed),
            closed: AtomicBool::new(false),
            delivery: Mutex::new(()),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn deliver(&self, callback: impl FnOnce()) -> bool {
        self.run(callback, false)
    }

    /// Deliver the final callback and close.
    fn finish(&self, callback: impl FnOnce()) -> bool {
        self.run(callback, true)
    }

    fn run(&self, callback: impl FnOnce(), last: bool) -> bool {
        let _guard = self
            .delivery
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            return false;
        }
        {
            let _marker = DeliveringMarker::enter(self.id);
            callback();
        }
        if last {
            self.closed.store(true, Ordering::Release);
        }
        true
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if DELIVERING.with(Cell::get) == self.id {
            // Called from our own callback, which already holds the lock.
            return;
        }
        drop(
            self.delivery
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
    }
}

struct DeliveringMarker {
    previous: u64,
}

impl DeliveringMarker {
    fn enter(id: u64) -> Self {
        let previous = DELIVERING.with(|current| current.replace(id));
        Self { previous }
    }
}

impl Drop for DeliveringMarker {
    fn drop(&mut self) {
        DELIVERING.with(|current| current.set(self.previous));
    }
}

enum ActiveTransport {
    Poll { due: Instant },
    Stream(SnapshotStream),
}

struct SessionRunner {
    task_id: TaskId,
    transport: Arc<dyn StatusTransport>,
    sink: Arc<dyn TrackingSink>,
    gate: Arc<DeliveryGate>,
    token: CancellationToken,
    options: TrackOptions,
}

impl SessionRunner {
    async fn run(self) {
        let (mut session, effects) = update(
            TrackingSession::new(self.task_id.clone()),
            Msg::Start {
                prefer_stream: self.options.prefer_stream,
            },
        );
        let mut queue: VecDeque<Effect> = effects.into();
        let mut active: Option<ActiveTransport> = None;

        'session: loop {
            while let Some(effect) = queue.pop_front() {
                let msg = match effect {
                    Effect::OpenStream => match self.open_stream().await {
                        Some(Ok(stream)) => {
                            active = Some(ActiveTransport::Stream(stream));
                            Msg::StreamOpened
                        }
                        Some(Err(err)) => {
                            track_warn!("Stream for task {} unavailable: {err}", self.task_id);
                            Msg::StreamUnavailable {
                                reason: err.to_string(),
                            }
                        }
                        None => break 'session,
                    },
                    Effect::Poll => match self.poll_once().await {
                        Some(msg) => msg,
                        None => break 'session,
                    },
                    Effect::SchedulePoll => {
                        active = Some(ActiveTransport::Poll {
                            due: Instant::now() + self.options.poll_interval,
                        });
                        continue;
                    }
                    Effect::DeliverUpdate(status) => {
                        self.gate
                            .deliver(|| self.sink.on_update(&self.task_id, &status));
                        continue;
                    }
                    Effect::DeliverComplete(status) => {
                        if self
                            .gate
                            .finish(|| self.sink.on_complete(&self.task_id, &status))
                        {
                            track_info!(
                                "Task {} finished as {}",
                                self.task_id,
                                status.snapshot.status
                            );
                        }
                        continue;
                    }
                    Effect::CloseTransport => {
                        active = None;
                        continue;
                    }
                };
                let (next, effects) = update(session, msg);
                session = next;
                queue.extend(effects);
            }

            if !session.is_active() || self.gate.is_closed() {
                break;
            }

            let msg = match active.as_mut() {
                Some(ActiveTransport::Poll { due }) => {
                    let due = *due;
                    tokio::select! {
                        biased;
                        _ = self.token.cancelled() => break,
                        _ = tokio::time::sleep_until(due) => Msg::PollDue,
                    }
                }
                Some(ActiveTransport::Stream(stream)) => {
                    tokio::select! {
                        biased;
                        _ = self.token.cancelled() => break,
                        next = stream.next() => stream_message(next),
                    }
                }
                None => {
                    track_warn!("Task {} has no active transport", self.task_id);
                    break;
                }
            };
            let (next, effects) = update(session, msg);
            session = next;
            queue.extend(effects);
        }

        if session.is_active() {
            let (cancelled, _) = update(session, Msg::Cancel);
            session = cancelled;
        }
        track_debug!(
            "Session for task {} ended {:?} after {} updates ({} dropped)",
            self.task_id,
            session.phase(),
            session.delivered(),
            session.dropped()
        );
    }

    async fn open_stream(&self) -> Option<Result<SnapshotStream, TrackError>> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            result = self.transport.open_stream(&self.task_id) => Some(result),
        }
    }

    async fn poll_once(&self) -> Option<Msg> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            result = self.transport.fetch_status(&self.task_id) => Some(match result {
                Ok(snapshot) => Msg::Snapshot(snapshot),
                Err(err) => {
                    track_warn!("Status request for task {} failed: {err}", self.task_id);
                    Msg::RequestFailed {
                        error: err.to_string(),
                    }
                }
            }),
        }
    }
}

fn stream_message(next: Option<Result<StatusSnapshot, TrackError>>) -> Msg {
    match next {
        Some(Ok(snapshot)) => Msg::Snapshot(snapshot),
        Some(Err(err)) if err.is_protocol() => Msg::RequestFailed {
            error: err.to_string(),
        },
        Some(Err(err)) => Msg::StreamInterrupted {
            reason: err.to_string(),
        },
        None => Msg::StreamInterrupted {
            reason: "stream closed by server".to_string(),
        },
    }
}
