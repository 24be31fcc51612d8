use super::*;

fn note(start: f64, duration: f64, pitch: u8) -> TimedEvent {
    TimedEvent {
        id: Uuid::new_v4(),
        start,
        duration,
        pitch,
        velocity: 96,
    }
}

fn mono_track(events: Vec<TimedEvent>) -> Track {
    let mut track = Track {
        id: Uuid::new_v4(),
        name: "Lead".to_owned(),
        polyphonic: false,
        events: Vec::new(),
    };
    for event in events {
        track.insert_sorted(event);
    }
    track
}

#[test]
fn event_end_is_start_plus_duration() {
    let event = note(2.0, 1.5, 60);
    assert!((event.end() - 3.5).abs() < f64::EPSILON);
}

#[test]
fn touching_events_do_not_overlap() {
    let a = note(0.0, 1.0, 60);
    let b = note(1.0, 1.0, 62);
    assert!(!a.overlaps(&b));
    assert!(!b.overlaps(&a));
}

#[test]
fn intersecting_events_overlap() {
    let a = note(0.0, 2.0, 60);
    let b = note(1.0, 2.0, 62);
    assert!(a.overlaps(&b));
    assert!(b.overlaps(&a));
}

#[test]
fn insert_sorted_keeps_start_order() {
    let track = mono_track(vec![note(4.0, 1.0, 64), note(0.0, 1.0, 60), note(2.0, 1.0, 62)]);
    let starts: Vec<f64> = track.events.iter().map(|e| e.start).collect();
    assert_eq!(starts, vec![0.0, 2.0, 4.0]);
}

#[test]
fn insert_sorted_breaks_start_ties_by_id() {
    let mut a = note(1.0, 0.5, 60);
    let mut b = note(1.0, 0.5, 62);
    // Force a known id ordering.
    a.id = Uuid::from_u128(1);
    b.id = Uuid::from_u128(2);

    let mut track = mono_track(Vec::new());
    track.polyphonic = true;
    track.insert_sorted(b.clone());
    track.insert_sorted(a.clone());
    assert_eq!(track.events[0].id, a.id);
    assert_eq!(track.events[1].id, b.id);
}

#[test]
fn conflicts_detects_overlap_on_monophonic_track() {
    let track = mono_track(vec![note(0.0, 2.0, 60)]);
    assert!(track.conflicts(&note(1.0, 1.0, 62), None));
    assert!(!track.conflicts(&note(2.0, 1.0, 62), None));
}

#[test]
fn conflicts_ignores_the_named_event() {
    let existing = note(0.0, 2.0, 60);
    let track = mono_track(vec![existing.clone()]);

    let mut moved = existing.clone();
    moved.start = 0.5;
    assert!(!track.conflicts(&moved, Some(&existing.id)));
}

#[test]
fn conflicts_always_false_on_polyphonic_track() {
    let mut track = mono_track(vec![note(0.0, 2.0, 60)]);
    track.polyphonic = true;
    assert!(!track.conflicts(&note(0.0, 2.0, 64), None));
}

#[test]
fn remove_returns_the_event_and_drops_it() {
    let event = note(0.0, 1.0, 60);
    let mut track = mono_track(vec![event.clone()]);

    let removed = track.remove(&event.id).expect("event should be present");
    assert_eq!(removed.id, event.id);
    assert!(track.events.is_empty());
    assert!(track.remove(&event.id).is_none());
}

#[test]
fn composition_track_lookup() {
    let track = mono_track(vec![]);
    let id = track.id;
    let comp = Composition { tracks: vec![track] };

    assert!(comp.track(&id).is_some());
    assert!(comp.track(&Uuid::new_v4()).is_none());
}
