use super::*;

fn op(id: u128) -> Operation {
    Operation {
        id: Uuid::from_u128(id),
        session_id: Uuid::from_u128(1),
        sequence: None,
        actor_id: Uuid::from_u128(2),
        client_timestamp_ms: 0,
        kind: OperationKind::ChatMessage {
            text: "x".to_owned(),
        },
    }
}

fn echo() -> LocalEcho {
    LocalEcho::new(Duration::from_secs(5))
}

#[test]
fn confirm_removes_the_matching_entry_only() {
    let mut echo = echo();
    let now = Instant::now();
    echo.push(op(1), None, now);
    echo.push(op(2), None, now);

    let confirmed = echo.confirm(&Uuid::from_u128(1)).expect("entry");
    assert_eq!(confirmed.operation.id, Uuid::from_u128(1));
    assert_eq!(echo.len(), 1);
    assert!(echo.contains(&Uuid::from_u128(2)));
    assert!(echo.confirm(&Uuid::from_u128(1)).is_none());
}

#[test]
fn reject_removes_the_matching_entry_wherever_it_sits() {
    let mut echo = echo();
    let now = Instant::now();
    echo.push(op(1), None, now);
    echo.push(op(2), None, now);
    echo.push(op(3), None, now);

    let rejected = echo.reject(&Uuid::from_u128(2)).expect("entry");
    assert_eq!(rejected.operation.id, Uuid::from_u128(2));
    assert_eq!(echo.len(), 2);
    assert!(!echo.contains(&Uuid::from_u128(2)));
    assert!(echo.reject(&Uuid::from_u128(2)).is_none());

    let ids: Vec<_> = echo.operations().map(|o| o.id).collect();
    assert_eq!(ids, vec![Uuid::from_u128(1), Uuid::from_u128(3)]);
}

#[test]
fn operations_iterate_in_issue_order() {
    let mut echo = echo();
    let now = Instant::now();
    echo.push(op(3), None, now);
    echo.push(op(1), None, now);
    echo.push(op(2), None, now);

    let ids: Vec<_> = echo.operations().map(|o| o.id).collect();
    assert_eq!(
        ids,
        vec![Uuid::from_u128(3), Uuid::from_u128(1), Uuid::from_u128(2)]
    );
}

#[test]
fn expired_ids_respect_the_timeout() {
    let mut echo = echo();
    let start = Instant::now();
    echo.push(op(1), None, start);
    echo.push(op(2), None, start + Duration::from_secs(3));

    assert!(echo.expired_ids(start).is_empty());

    let expired = echo.expired_ids(start + Duration::from_secs(5));
    assert_eq!(expired, vec![Uuid::from_u128(1)]);

    let expired = echo.expired_ids(start + Duration::from_secs(9));
    assert_eq!(expired, vec![Uuid::from_u128(1), Uuid::from_u128(2)]);
}
