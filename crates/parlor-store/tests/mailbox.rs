//! Integration tests for the mailbox protocol and lookups on `MemoryStore`.

use std::time::Duration;

use chrono::Utc;
use parlor_protocol::{Envelope, EventKind, GameId, RoomId, UserId, UserRoom};
use parlor_room::Room;
use parlor_store::{Dequeued, GameRecord, MailboxKeys, MemoryStore, RoomStore};
use serde_json::json;

// =========================================================================
// Helpers
// =========================================================================

fn game() -> GameId {
    GameId::new("chess")
}

fn keys(room: &str) -> MailboxKeys {
    MailboxKeys::new(&game(), &RoomId::new(room))
}

fn turn(n: u64) -> Envelope {
    Envelope::from_user(EventKind::Turn, game(), UserId::new("a"), json!({ "n": n }))
}

fn seq(dequeued: &Dequeued) -> Option<u64> {
    match dequeued {
        Dequeued::Fresh(env) | Dequeued::InFlight(env) => env.data["n"].as_u64(),
        Dequeued::Empty => None,
    }
}

// =========================================================================
// Mailbox
// =========================================================================

#[tokio::test]
async fn test_dequeue_empty_mailbox_reports_empty() {
    let store = MemoryStore::new();
    assert_eq!(store.list_dequeue_to_slot(&keys("r")).await.unwrap(), Dequeued::Empty);
}

#[tokio::test]
async fn test_dequeue_occupied_slot_returns_occupant_without_popping() {
    let store = MemoryStore::new();
    let k = keys("r");
    store.list_append(&k, &turn(1)).await.unwrap();
    store.list_append(&k, &turn(2)).await.unwrap();

    let first = store.list_dequeue_to_slot(&k).await.unwrap();
    assert!(matches!(first, Dequeued::Fresh(_)));
    assert_eq!(seq(&first), Some(1));

    let retry = store.list_dequeue_to_slot(&k).await.unwrap();
    assert!(matches!(retry, Dequeued::InFlight(_)));
    assert_eq!(seq(&retry), Some(1));
    assert_eq!(store.pending(&k).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_acknowledge_then_dequeue_is_fifo() {
    let store = MemoryStore::new();
    let k = keys("r");
    for n in 1..=3 {
        store.list_append(&k, &turn(n)).await.unwrap();
    }

    let mut seen = Vec::new();
    loop {
        let next = store.list_dequeue_to_slot(&k).await.unwrap();
        if next == Dequeued::Empty {
            break;
        }
        seen.push(seq(&next).unwrap());
        store.delete_slot(&k).await.unwrap();
        assert_eq!(store.peek_slot(&k).await.unwrap(), None);
    }

    assert_eq!(seen, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_mailboxes_of_different_rooms_are_independent() {
    let store = MemoryStore::new();
    store.list_append(&keys("r1"), &turn(1)).await.unwrap();
    store.list_append(&keys("r2"), &turn(2)).await.unwrap();

    store.list_dequeue_to_slot(&keys("r1")).await.unwrap();
    let other = store.list_dequeue_to_slot(&keys("r2")).await.unwrap();
    assert!(matches!(other, Dequeued::Fresh(_)));
    assert_eq!(seq(&other), Some(2));
}

#[tokio::test]
async fn test_in_flight_rooms_lists_occupied_slots_of_game() {
    let store = MemoryStore::new();
    store.list_append(&keys("r2"), &turn(1)).await.unwrap();
    store.list_append(&keys("r1"), &turn(1)).await.unwrap();
    store.list_append(&keys("idle"), &turn(1)).await.unwrap();
    store.list_dequeue_to_slot(&keys("r2")).await.unwrap();
    store.list_dequeue_to_slot(&keys("r1")).await.unwrap();

    let other_game = MailboxKeys::new(&GameId::new("go"), &RoomId::new("r9"));
    store.list_append(&other_game, &turn(1)).await.unwrap();
    store.list_dequeue_to_slot(&other_game).await.unwrap();

    let rooms = store.in_flight_rooms(&game()).await.unwrap();
    assert_eq!(rooms, vec![RoomId::new("r1"), RoomId::new("r2")]);
}

// =========================================================================
// Rooms and lookups
// =========================================================================

#[tokio::test]
async fn test_room_save_and_load() {
    let store = MemoryStore::new();
    let mut room = Room::new(
        RoomId::new("r"),
        game(),
        "blitz",
        vec![UserId::new("a"), UserId::new("b")],
        Duration::from_secs(10),
    )
    .unwrap();
    assert_eq!(store.load_room(&game(), &room.id).await.unwrap(), None);

    room.state = json!({ "board": "x........" });
    store.save_room(&room).await.unwrap();
    assert_eq!(store.load_room(&game(), &room.id).await.unwrap(), Some(room));
}

#[tokio::test]
async fn test_save_room_with_failing_writes_is_error() {
    let store = MemoryStore::new();
    let room = Room::new(RoomId::new("r"), game(), "m", vec![], Duration::ZERO).unwrap();
    store.set_fail_writes(true).await;
    assert!(store.save_room(&room).await.is_err());
    store.set_fail_writes(false).await;
    store.save_room(&room).await.unwrap();
}

#[tokio::test]
async fn test_user_room_and_socket_lookups() {
    let store = MemoryStore::new();
    let user = UserId::new("a");
    assert_eq!(store.get_user_room(&user, &game()).await.unwrap(), None);

    let assignment = UserRoom::spectator(RoomId::new("r"));
    store.assign_user(&game(), &user, &assignment).await.unwrap();
    assert_eq!(store.get_user_room(&user, &game()).await.unwrap(), Some(assignment));

    store.connect_user(&game(), &user, "conn-1").await.unwrap();
    assert!(store.get_user_socket(&game(), &user).await.unwrap().is_some());
    store.disconnect_user(&game(), &user).await;
    assert!(store.get_user_socket(&game(), &user).await.unwrap().is_none());

    store.unassign_user(&game(), &user).await;
    assert_eq!(store.get_user_room(&user, &game()).await.unwrap(), None);
}

#[tokio::test]
async fn test_ratings_and_history_are_appended() {
    let store = MemoryStore::new();
    store.update_user_rating(&game(), "blitz", &UserId::new("a")).await.unwrap();
    store.update_user_rating(&game(), "blitz", &UserId::new("b")).await.unwrap();

    let record = GameRecord {
        game: game(),
        mode: "blitz".into(),
        room_id: RoomId::new("r"),
        players: vec![UserId::new("a"), UserId::new("b")],
        result: json!({ "winner": "a" }),
        finished_at: Utc::now(),
    };
    store.save_game_record(&record).await.unwrap();

    assert_eq!(
        store.rating_updates(&game(), "blitz").await.unwrap(),
        vec![UserId::new("a"), UserId::new("b")]
    );
    assert_eq!(store.game_records(&game()).await.unwrap(), vec![record]);
}
