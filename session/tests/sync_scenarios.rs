//! End-to-end convergence scenarios driven through the public client API
//! with scripted server traffic.

use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use document::{
    Composition, Document, Drawing, EventChanges, Layer, Operation, OperationKind, Stroke,
    StrokePoint, TimedEvent, Track,
};
use protocol::{
    ClientMessage, Participant, Role, ServerError, ServerMessage, SessionSnapshot,
};
use session::{SessionClient, SessionConfig, TransportEvent};

fn track_id() -> Uuid {
    Uuid::from_u128(10)
}

fn layer_id() -> Uuid {
    Uuid::from_u128(20)
}

fn timed_event(id: u128, start: f64, pitch: u8) -> TimedEvent {
    TimedEvent {
        id: Uuid::from_u128(id),
        start,
        duration: 1.0,
        pitch,
        velocity: 100,
    }
}

fn stroke(id: u128) -> Stroke {
    Stroke {
        id: Uuid::from_u128(id),
        points: vec![StrokePoint { x: 0.0, y: 0.0 }, StrokePoint { x: 5.0, y: 5.0 }],
        color: "#1a1a2e".to_owned(),
        width: 2.0,
    }
}

fn participant(id: u128, username: &str) -> Participant {
    Participant {
        id: Uuid::from_u128(id),
        username: username.to_owned(),
        role: Role::Composer,
        online: true,
    }
}

fn composition_snapshot(sequence: u64, events: Vec<TimedEvent>) -> SessionSnapshot {
    SessionSnapshot {
        session_id: Uuid::from_u128(1),
        name: "jam".to_owned(),
        document: Document::Composition(Composition {
            tracks: vec![Track {
                id: track_id(),
                name: "Lead".to_owned(),
                polyphonic: false,
                events,
            }],
        }),
        participants: vec![participant(42, "alice"), participant(43, "bob")],
        sequence,
    }
}

fn drawing_snapshot(sequence: u64, strokes: Vec<Stroke>) -> SessionSnapshot {
    SessionSnapshot {
        session_id: Uuid::from_u128(1),
        name: "sketch".to_owned(),
        document: Document::Drawing(Drawing {
            layers: vec![Layer {
                id: layer_id(),
                name: "Background".to_owned(),
                visible: true,
                opacity: 1.0,
                locked: false,
                strokes,
            }],
        }),
        participants: vec![participant(42, "alice")],
        sequence,
    }
}

fn new_client(actor: u128) -> (SessionClient, mpsc::UnboundedReceiver<ClientMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        SessionClient::new(Uuid::from_u128(actor), SessionConfig::default(), tx),
        rx,
    )
}

fn deliver(client: &mut SessionClient, message: ServerMessage) {
    client.handle_event(TransportEvent::Message(message));
}

fn remote_op(op_id: u128, actor: u128, sequence: u64, kind: OperationKind) -> ServerMessage {
    ServerMessage::Edit {
        operation: Operation {
            id: Uuid::from_u128(op_id),
            session_id: Uuid::from_u128(1),
            sequence: Some(sequence),
            actor_id: Uuid::from_u128(actor),
            client_timestamp_ms: 0,
            kind,
        },
    }
}

fn pitch_of(document: &Document, event_id: u128) -> u8 {
    let Document::Composition(comp) = document else {
        panic!("expected composition");
    };
    comp.tracks[0]
        .events
        .iter()
        .find(|e| e.id == Uuid::from_u128(event_id))
        .expect("event present")
        .pitch
}

fn stroke_ids(document: &Document) -> Vec<Uuid> {
    let Document::Drawing(drawing) = document else {
        panic!("expected drawing");
    };
    drawing.layers[0].strokes.iter().map(|s| s.id).collect()
}

fn sent_edit(rx: &mut mpsc::UnboundedReceiver<ClientMessage>) -> Operation {
    loop {
        match rx.try_recv().expect("an outbound message") {
            ClientMessage::Edit { operation } => return operation,
            _ => continue,
        }
    }
}

// Two participants edit the same note. The server accepts one and rejects
// the other; the losing client must end up rendering the winner's value.
#[test]
fn rejected_optimistic_edit_converges_on_the_accepted_value() {
    let (mut alice, mut alice_out) = new_client(42);
    deliver(
        &mut alice,
        ServerMessage::SessionState(composition_snapshot(0, vec![timed_event(5, 0.0, 60)])),
    );

    // Alice optimistically sets pitch 64 and sees it immediately.
    let pending = alice
        .apply_local_edit(OperationKind::EditEvent {
            track_id: track_id(),
            event_id: Uuid::from_u128(5),
            changes: EventChanges {
                pitch: Some(64),
                ..EventChanges::default()
            },
        })
        .expect("local edit");
    sent_edit(&mut alice_out);
    assert_eq!(pitch_of(alice.document().expect("doc"), 5), 64);

    // Bob's conflicting edit wins the race and is sequenced first.
    deliver(
        &mut alice,
        remote_op(
            200,
            43,
            1,
            OperationKind::EditEvent {
                track_id: track_id(),
                event_id: Uuid::from_u128(5),
                changes: EventChanges {
                    pitch: Some(66),
                    ..EventChanges::default()
                },
            },
        ),
    );
    // Alice's pending edit still rides on top of the view.
    assert_eq!(pitch_of(alice.document().expect("doc"), 5), 64);

    // The server rejects Alice's edit; her view falls back to Bob's value.
    deliver(
        &mut alice,
        ServerMessage::Error(ServerError {
            message: "conflict".to_owned(),
            correlation_id: Some(pending),
        }),
    );
    assert_eq!(alice.pending_count(), 0);
    assert_eq!(pitch_of(alice.document().expect("doc"), 5), 66);
    assert_eq!(pitch_of(alice.canonical_document().expect("doc"), 5), 66);
}

// Same operation stream, different arrival pattern: one client sees both
// strokes in order, the other hits a gap, resyncs, and converges anyway.
#[test]
fn gap_and_resync_converge_with_the_in_order_client() {
    let first = OperationKind::StrokeSegment {
        layer_id: layer_id(),
        stroke: stroke(101),
    };
    let second = OperationKind::StrokeSegment {
        layer_id: layer_id(),
        stroke: stroke(102),
    };

    let (mut in_order, _out_a) = new_client(42);
    deliver(
        &mut in_order,
        ServerMessage::SessionState(drawing_snapshot(9, vec![])),
    );
    deliver(&mut in_order, remote_op(101, 43, 10, first.clone()));
    deliver(&mut in_order, remote_op(102, 43, 11, second.clone()));

    let (mut gapped, mut out_b) = new_client(44);
    deliver(
        &mut gapped,
        ServerMessage::SessionState(drawing_snapshot(9, vec![])),
    );
    // Sequence 10 never arrives; 11 exposes the gap.
    deliver(&mut gapped, remote_op(102, 43, 11, second));
    assert_eq!(gapped.sequence(), Some(9));
    assert!(matches!(out_b.try_recv(), Ok(ClientMessage::Resync)));

    // The server answers with a snapshot that folds both strokes in.
    deliver(
        &mut gapped,
        ServerMessage::SessionState(drawing_snapshot(11, vec![stroke(101), stroke(102)])),
    );

    assert_eq!(in_order.sequence(), Some(11));
    assert_eq!(gapped.sequence(), Some(11));
    assert_eq!(
        stroke_ids(in_order.document().expect("doc")),
        stroke_ids(gapped.document().expect("doc"))
    );
    // The gap path never partially applied anything out of order.
    deliver(&mut gapped, remote_op(103, 43, 12, OperationKind::StrokeSegment {
        layer_id: layer_id(),
        stroke: stroke(103),
    }));
    assert_eq!(gapped.sequence(), Some(12));
}

// A resync must keep unconfirmed local work where it still applies and
// silently drop entries the fresh state makes impossible.
#[test]
fn resync_replays_surviving_pending_edits_only() {
    let (mut client, mut out) = new_client(42);
    deliver(
        &mut client,
        ServerMessage::SessionState(composition_snapshot(0, vec![])),
    );

    client
        .apply_local_edit(OperationKind::InsertEvent {
            track_id: track_id(),
            event: timed_event(1, 0.0, 60),
        })
        .expect("edit");
    client
        .apply_local_edit(OperationKind::InsertEvent {
            track_id: track_id(),
            event: timed_event(2, 4.0, 62),
        })
        .expect("edit");
    sent_edit(&mut out);
    sent_edit(&mut out);

    // The fresh snapshot already has a note overlapping the first pending
    // insert on this monophonic track.
    deliver(
        &mut client,
        ServerMessage::SessionState(composition_snapshot(30, vec![timed_event(9, 0.5, 70)])),
    );

    assert_eq!(client.sequence(), Some(30));
    assert_eq!(client.pending_count(), 2);
    let Some(Document::Composition(comp)) = client.document() else {
        panic!("expected composition");
    };
    let ids: Vec<_> = comp.tracks[0].events.iter().map(|e| e.id).collect();
    // The overlapping pending insert is skipped; the other survives.
    assert_eq!(ids, vec![Uuid::from_u128(9), Uuid::from_u128(2)]);
}

// Redelivered traffic must be a no-op, including the client's own echo.
#[test]
fn redelivery_of_any_operation_is_idempotent() {
    let (mut client, mut out) = new_client(42);
    deliver(
        &mut client,
        ServerMessage::SessionState(composition_snapshot(0, vec![])),
    );

    client
        .apply_local_edit(OperationKind::InsertEvent {
            track_id: track_id(),
            event: timed_event(1, 0.0, 60),
        })
        .expect("edit");
    let mut echoed = sent_edit(&mut out);
    echoed.sequence = Some(1);

    deliver(&mut client, ServerMessage::Edit { operation: echoed.clone() });
    deliver(&mut client, ServerMessage::Edit { operation: echoed });
    deliver(&mut client, remote_op(300, 43, 2, OperationKind::InsertEvent {
        track_id: track_id(),
        event: timed_event(3, 4.0, 62),
    }));
    deliver(&mut client, remote_op(300, 43, 2, OperationKind::InsertEvent {
        track_id: track_id(),
        event: timed_event(3, 4.0, 62),
    }));

    let Some(Document::Composition(comp)) = client.canonical_document() else {
        panic!("expected composition");
    };
    assert_eq!(comp.tracks[0].events.len(), 2);
    assert_eq!(client.sequence(), Some(2));
}

// Clients that saw different local traffic still agree once the canonical
// stream has been fully delivered to both.
#[test]
fn canonical_stream_drives_both_replicas_to_the_same_document() {
    let (mut alice, mut alice_out) = new_client(42);
    let (mut bob, _bob_out) = new_client(43);
    for client in [&mut alice, &mut bob] {
        deliver(
            client,
            ServerMessage::SessionState(composition_snapshot(0, vec![])),
        );
    }

    // Alice issues an edit; the server sequences it at 2, after Bob's.
    alice
        .apply_local_edit(OperationKind::InsertEvent {
            track_id: track_id(),
            event: timed_event(1, 0.0, 60),
        })
        .expect("edit");
    let mut alice_op = sent_edit(&mut alice_out);
    alice_op.sequence = Some(2);

    let bob_op = remote_op(400, 43, 1, OperationKind::InsertEvent {
        track_id: track_id(),
        event: timed_event(2, 4.0, 64),
    });

    deliver(&mut alice, bob_op.clone());
    deliver(&mut alice, ServerMessage::Edit { operation: alice_op.clone() });
    deliver(&mut bob, bob_op);
    deliver(&mut bob, ServerMessage::Edit { operation: alice_op });

    assert_eq!(alice.canonical_document(), bob.canonical_document());
    assert_eq!(alice.document(), bob.document());
    assert_eq!(alice.sequence(), bob.sequence());
}

// Timeout is the fallback when neither echo nor rejection arrives.
#[test]
fn unacknowledged_edit_times_out_and_rolls_back() {
    let (mut client, mut out) = new_client(42);
    deliver(
        &mut client,
        ServerMessage::SessionState(composition_snapshot(0, vec![])),
    );
    client
        .apply_local_edit(OperationKind::InsertEvent {
            track_id: track_id(),
            event: timed_event(1, 0.0, 60),
        })
        .expect("edit");
    sent_edit(&mut out);

    client.tick(std::time::Instant::now() + Duration::from_secs(6));

    assert_eq!(client.pending_count(), 0);
    let Some(Document::Composition(comp)) = client.document() else {
        panic!("expected composition");
    };
    assert!(comp.tracks[0].events.is_empty());
}
