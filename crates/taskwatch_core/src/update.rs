use crate::{Effect, Msg, StatusSnapshot, TrackingSession, TransportMode};

/// Message of the snapshot synthesized when an established push stream breaks.
pub const CONNECTION_INTERRUPTED: &str = "The live connection to the server was interrupted.";

/// Pure update function: applies a message to a session and returns the effects to run.
///
/// Once the session has completed or been cancelled every message is ignored.
pub fn update(mut session: TrackingSession, msg: Msg) -> (TrackingSession, Vec<Effect>) {
    if !session.is_active() {
        return (session, Vec::new());
    }

    let effects = match msg {
        Msg::Start { prefer_stream } => {
            if session.mode() != TransportMode::Idle {
                return (session, Vec::new());
            }
            if prefer_stream {
                session.set_mode(TransportMode::Connecting);
                vec![Effect::OpenStream]
            } else {
                session.set_mode(TransportMode::Polling);
                vec![Effect::Poll]
            }
        }
        Msg::StreamOpened => {
            if session.mode() == TransportMode::Connecting {
                session.set_mode(TransportMode::Streaming);
            }
            Vec::new()
        }
        Msg::StreamUnavailable { .. } => match session.mode() {
            TransportMode::Connecting => fall_back_to_polling(&mut session),
            _ => Vec::new(),
        },
        Msg::StreamInterrupted { .. } => match session.mode() {
            TransportMode::Connecting => fall_back_to_polling(&mut session),
            TransportMode::Streaming if session.stream_events() == 0 => {
                fall_back_to_polling(&mut session)
            }
            TransportMode::Streaming => {
                finish_with_failure(&mut session, StatusSnapshot::failed(CONNECTION_INTERRUPTED))
            }
            TransportMode::Idle | TransportMode::Polling => Vec::new(),
        },
        Msg::Snapshot(snapshot) => {
            if session.mode() == TransportMode::Connecting {
                session.set_mode(TransportMode::Streaming);
            }
            if !session.accepts(snapshot.status) {
                session.note_dropped();
                let effects = poll_again(&session);
                return (session, effects);
            }
            let terminal = snapshot.status.is_terminal();
            let delivered = session.record(snapshot, false);
            let mut effects = vec![Effect::DeliverUpdate(delivered.clone())];
            if terminal {
                effects.push(Effect::DeliverComplete(delivered));
                effects.push(Effect::CloseTransport);
            } else {
                effects.extend(poll_again(&session));
            }
            effects
        }
        Msg::RequestFailed { error } => {
            finish_with_failure(&mut session, StatusSnapshot::failed(error))
        }
        Msg::PollDue => match session.mode() {
            TransportMode::Polling => vec![Effect::Poll],
            _ => Vec::new(),
        },
        Msg::Cancel => {
            session.cancel();
            vec![Effect::CloseTransport]
        }
    };

    (session, effects)
}

fn fall_back_to_polling(session: &mut TrackingSession) -> Vec<Effect> {
    session.set_mode(TransportMode::Polling);
    vec![Effect::CloseTransport, Effect::Poll]
}

fn finish_with_failure(session: &mut TrackingSession, snapshot: StatusSnapshot) -> Vec<Effect> {
    let delivered = session.record(snapshot, true);
    vec![
        Effect::DeliverUpdate(delivered.clone()),
        Effect::DeliverComplete(delivered),
        Effect::CloseTransport,
    ]
}

fn poll_again(session: &TrackingSession) -> Vec<Effect> {
    match session.mode() {
        TransportMode::Polling => vec![Effect::SchedulePoll],
        _ => Vec::new(),
    }
}
