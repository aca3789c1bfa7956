use taskwatch_core::{
    update, Effect, Msg, SessionPhase, StatusSnapshot, StatusUpdate, TaskId, TaskStatus,
    TrackingSession, TransportMode, CONNECTION_INTERRUPTED,
};

fn init_logging() {
    taskwatch_logging::initialize_for_tests();
}

fn start(prefer_stream: bool) -> (TrackingSession, Vec<Effect>) {
    update(
        TrackingSession::new(TaskId::from("job-42")),
        Msg::Start { prefer_stream },
    )
}

fn snapshot(status: TaskStatus, message: &str) -> Msg {
    Msg::Snapshot(StatusSnapshot::new(status, message))
}

fn delivered(effects: &[Effect]) -> Vec<StatusUpdate> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::DeliverUpdate(update) => Some(update.clone()),
            _ => None,
        })
        .collect()
}

fn completions(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|effect| matches!(effect, Effect::DeliverComplete(_)))
        .count()
}

#[test]
fn polling_session_runs_to_completion() {
    init_logging();
    let (session, effects) = start(false);
    assert_eq!(effects, vec![Effect::Poll]);
    assert_eq!(session.mode(), TransportMode::Polling);

    let (session, effects) = update(session, snapshot(TaskStatus::Pending, "queued"));
    assert_eq!(delivered(&effects)[0].seq, 1);
    assert_eq!(effects.last(), Some(&Effect::SchedulePoll));

    let (session, effects) = update(session, Msg::PollDue);
    assert_eq!(effects, vec![Effect::Poll]);

    let (session, effects) = update(session, snapshot(TaskStatus::Processing, "working"));
    assert_eq!(delivered(&effects)[0].seq, 2);
    assert_eq!(effects.last(), Some(&Effect::SchedulePoll));

    let (session, effects) = update(session, snapshot(TaskStatus::Completed, "done"));
    let updates = delivered(&effects);
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].seq, 3);
    assert!(!updates[0].synthesized);
    assert_eq!(completions(&effects), 1);
    assert_eq!(effects.last(), Some(&Effect::CloseTransport));
    assert!(!effects.contains(&Effect::SchedulePoll));
    assert_eq!(session.phase(), SessionPhase::Completed);
    assert_eq!(session.delivered(), 3);
}

#[test]
fn completion_follows_the_last_update() {
    let (session, _) = start(false);
    let (_, effects) = update(session, snapshot(TaskStatus::Failed, "nope"));

    let update_pos = effects
        .iter()
        .position(|e| matches!(e, Effect::DeliverUpdate(_)))
        .unwrap();
    let complete_pos = effects
        .iter()
        .position(|e| matches!(e, Effect::DeliverComplete(_)))
        .unwrap();
    assert!(update_pos < complete_pos);
}

#[test]
fn poll_failure_synthesizes_one_failed_snapshot() {
    let (session, _) = start(false);
    let (session, effects) = update(
        session,
        Msg::RequestFailed {
            error: "network error: connection refused".into(),
        },
    );

    let updates = delivered(&effects);
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].snapshot.status, TaskStatus::Failed);
    assert_eq!(
        updates[0].snapshot.message,
        "network error: connection refused"
    );
    assert!(updates[0].synthesized);
    assert_eq!(completions(&effects), 1);
    assert!(!effects.contains(&Effect::SchedulePoll));
    assert!(!session.is_active());
}

#[test]
fn stream_unavailable_falls_back_to_polling_once() {
    let (session, effects) = start(true);
    assert_eq!(effects, vec![Effect::OpenStream]);
    assert_eq!(session.mode(), TransportMode::Connecting);

    let (session, effects) = update(
        session,
        Msg::StreamUnavailable {
            reason: "http status 404".into(),
        },
    );
    assert_eq!(effects, vec![Effect::CloseTransport, Effect::Poll]);
    assert_eq!(session.mode(), TransportMode::Polling);

    // A late stream failure must not restart anything.
    let (session, effects) = update(
        session,
        Msg::StreamInterrupted {
            reason: "late".into(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(session.mode(), TransportMode::Polling);
}

#[test]
fn stream_error_before_any_event_falls_back() {
    let (session, _) = start(true);
    let (session, _) = update(session, Msg::StreamOpened);
    assert_eq!(session.mode(), TransportMode::Streaming);

    let (session, effects) = update(
        session,
        Msg::StreamInterrupted {
            reason: "closed".into(),
        },
    );
    assert_eq!(effects, vec![Effect::CloseTransport, Effect::Poll]);
    assert_eq!(session.mode(), TransportMode::Polling);
    assert!(session.is_active());
}

#[test]
fn stream_error_after_events_reports_interruption() {
    let (session, _) = start(true);
    let (session, _) = update(session, Msg::StreamOpened);
    let (session, effects) = update(session, snapshot(TaskStatus::Processing, "step 1"));
    assert_eq!(delivered(&effects).len(), 1);
    assert!(!effects.contains(&Effect::SchedulePoll));

    let (session, effects) = update(
        session,
        Msg::StreamInterrupted {
            reason: "reset by peer".into(),
        },
    );
    let updates = delivered(&effects);
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].seq, 2);
    assert_eq!(updates[0].snapshot, StatusSnapshot::failed(CONNECTION_INTERRUPTED));
    assert_eq!(completions(&effects), 1);
    assert_eq!(session.phase(), SessionPhase::Completed);
}

#[test]
fn streamed_terminal_snapshot_closes_the_stream() {
    let (session, _) = start(true);
    let (session, _) = update(session, Msg::StreamOpened);
    let (session, effects) = update(session, snapshot(TaskStatus::Completed, "all done"));

    assert_eq!(completions(&effects), 1);
    assert_eq!(effects.last(), Some(&Effect::CloseTransport));
    assert!(!session.is_active());
}

#[test]
fn backwards_transitions_are_dropped() {
    let (session, _) = start(false);
    let (session, _) = update(session, snapshot(TaskStatus::Processing, "working"));
    let (session, effects) = update(session, snapshot(TaskStatus::Pending, "queued again"));

    assert!(delivered(&effects).is_empty());
    // Polling continues even though the snapshot was discarded.
    assert_eq!(effects, vec![Effect::SchedulePoll]);
    assert_eq!(session.dropped(), 1);
    assert_eq!(session.last_status(), Some(TaskStatus::Processing));

    let (session, effects) = update(session, snapshot(TaskStatus::Processing, "still working"));
    assert_eq!(delivered(&effects)[0].seq, 2);
    assert_eq!(session.delivered(), 2);
}

#[test]
fn timeline_is_non_decreasing_with_single_terminal() {
    let inputs = [
        TaskStatus::Pending,
        TaskStatus::Processing,
        TaskStatus::Pending,
        TaskStatus::Processing,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Processing,
    ];

    let (mut session, _) = start(false);
    let mut statuses = Vec::new();
    let mut terminal_calls = 0;
    for status in inputs {
        let (next, effects) = update(session, snapshot(status, "tick"));
        session = next;
        statuses.extend(delivered(&effects).into_iter().map(|u| u.snapshot.status));
        terminal_calls += completions(&effects);
    }

    assert!(statuses.windows(2).all(|w| w[0].rank() <= w[1].rank()));
    assert_eq!(terminal_calls, 1);
    assert_eq!(statuses.last(), Some(&TaskStatus::Completed));
}

#[test]
fn cancel_closes_transport_without_completion() {
    let (session, _) = start(true);
    let (session, _) = update(session, Msg::StreamOpened);
    let (session, effects) = update(session, Msg::Cancel);

    assert_eq!(effects, vec![Effect::CloseTransport]);
    assert_eq!(session.phase(), SessionPhase::Cancelled);
}

#[test]
fn poll_due_is_ignored_while_streaming() {
    let (session, _) = start(true);
    let (session, _) = update(session, Msg::StreamOpened);
    let (_, effects) = update(session, Msg::PollDue);
    assert!(effects.is_empty());
}
