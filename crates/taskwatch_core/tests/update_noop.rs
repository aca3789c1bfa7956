use taskwatch_core::{update, Msg, StatusSnapshot, TaskId, TaskStatus, TrackingSession};

#[test]
fn messages_after_cancel_are_ignored() {
    let session = TrackingSession::new(TaskId::from("t-1"));
    let (session, _) = update(session, Msg::Start { prefer_stream: false });
    let (session, _) = update(session, Msg::Cancel);

    for msg in [
        Msg::PollDue,
        Msg::Snapshot(StatusSnapshot::new(TaskStatus::Completed, "done")),
        Msg::RequestFailed {
            error: "boom".into(),
        },
        Msg::Cancel,
    ] {
        let (next, effects) = update(session.clone(), msg);
        assert_eq!(session, next);
        assert!(effects.is_empty());
    }
}

#[test]
fn second_start_is_noop() {
    let session = TrackingSession::new(TaskId::from("t-1"));
    let (session, _) = update(session, Msg::Start { prefer_stream: true });
    let (next, effects) = update(session.clone(), Msg::Start { prefer_stream: false });

    assert_eq!(session, next);
    assert!(effects.is_empty());
}
