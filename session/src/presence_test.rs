use super::*;

fn participant(id: u128, username: &str, role: Role, online: bool) -> Participant {
    Participant {
        id: Uuid::from_u128(id),
        username: username.to_owned(),
        role,
        online,
    }
}

#[test]
fn first_roster_reports_everyone_as_joined() {
    let mut tracker = PresenceTracker::new();
    let diffs = tracker.apply_roster(&[
        participant(1, "alice", Role::Producer, true),
        participant(2, "bob", Role::Viewer, true),
    ]);

    assert_eq!(diffs.len(), 2);
    assert!(matches!(&diffs[0], PresenceDiff::Joined(p) if p.username == "alice"));
    assert!(matches!(&diffs[1], PresenceDiff::Joined(p) if p.username == "bob"));
    assert_eq!(tracker.len(), 2);
}

#[test]
fn unchanged_roster_reports_nothing() {
    let mut tracker = PresenceTracker::new();
    let roster = vec![participant(1, "alice", Role::Producer, true)];
    tracker.apply_roster(&roster);

    assert!(tracker.apply_roster(&roster).is_empty());
}

#[test]
fn missing_participant_reports_exactly_one_leave() {
    let mut tracker = PresenceTracker::new();
    tracker.apply_roster(&[
        participant(1, "alice", Role::Producer, true),
        participant(2, "bob", Role::Viewer, true),
    ]);

    let diffs = tracker.apply_roster(&[participant(2, "bob", Role::Viewer, true)]);
    assert_eq!(diffs.len(), 1);
    assert!(matches!(&diffs[0], PresenceDiff::Left(p) if p.username == "alice"));
    assert!(tracker.participant(&Uuid::from_u128(1)).is_none());

    // A repeat of the same roster must not report the leave again.
    assert!(tracker.apply_roster(&[participant(2, "bob", Role::Viewer, true)]).is_empty());
}

#[test]
fn role_and_status_changes_are_distinct_diffs() {
    let mut tracker = PresenceTracker::new();
    tracker.apply_roster(&[participant(1, "alice", Role::Viewer, true)]);

    let diffs = tracker.apply_roster(&[participant(1, "alice", Role::Composer, false)]);
    assert_eq!(diffs.len(), 2);
    assert!(matches!(
        &diffs[0],
        PresenceDiff::RoleChanged { participant: p, previous: Role::Viewer }
            if p.role == Role::Composer
    ));
    assert!(matches!(&diffs[1], PresenceDiff::StatusChanged(p) if !p.online));
}

#[test]
fn leaves_are_sorted_by_username() {
    let mut tracker = PresenceTracker::new();
    tracker.apply_roster(&[
        participant(1, "zoe", Role::Viewer, true),
        participant(2, "amy", Role::Viewer, true),
        participant(3, "mia", Role::Viewer, true),
    ]);

    let diffs = tracker.apply_roster(&[]);
    let names: Vec<_> = diffs
        .iter()
        .map(|d| {
            let PresenceDiff::Left(p) = d else {
                panic!("expected leave");
            };
            p.username.clone()
        })
        .collect();
    assert_eq!(names, vec!["amy", "mia", "zoe"]);
}

#[test]
fn participants_are_sorted_by_username() {
    let mut tracker = PresenceTracker::new();
    tracker.apply_roster(&[
        participant(1, "zoe", Role::Viewer, true),
        participant(2, "amy", Role::Producer, true),
    ]);

    let names: Vec<_> = tracker.participants().iter().map(|p| p.username.clone()).collect();
    assert_eq!(names, vec!["amy", "zoe"]);
}
