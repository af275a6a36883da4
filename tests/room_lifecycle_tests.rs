//! Room and seat lifecycle: join, reserve, reclaim, expire, host transfer,
//! hibernation round trips.

mod test_helpers;

use test_helpers::{cmd_with, RoomHarness, ROOM_CODE};
use uuid::Uuid;

use rollhouse_server::alarm::AlarmKind;
use rollhouse_server::clock::Clock;
use rollhouse_server::game::Category;
use rollhouse_server::lobby::{LobbyNotification, UserRoomEvent};
use rollhouse_server::protocol::{ErrorCode, ReclaimRejectReason, Role, RoomStatus};

#[tokio::test]
async fn first_connect_creates_room_and_seats_host() {
    let mut harness = RoomHarness::new().await;
    let host = Uuid::new_v4();
    let mut socket = harness.connect(host, "hostess").await;

    assert_eq!(socket.attachment.role, Role::Player);
    assert_eq!(harness.status(), RoomStatus::Waiting);
    let record = harness.actor.room_record().unwrap();
    assert_eq!(record.host_id, host);
    assert_eq!(record.code, ROOM_CODE);

    let connected = &socket.frames_of("CONNECTED")[0];
    assert_eq!(connected["payload"]["roomCode"], ROOM_CODE);
    assert_eq!(connected["payload"]["yourRole"], "player");
    assert_eq!(connected["payload"]["players"][0]["isHost"], true);
    harness.assert_invariants();
}

#[tokio::test]
async fn second_player_joins_and_first_is_notified() {
    let mut harness = RoomHarness::new().await;
    let host = Uuid::new_v4();
    let guest = Uuid::new_v4();
    let mut host_socket = harness.connect(host, "hostess").await;
    host_socket.frames();

    harness.connect(guest, "guest").await;
    let joined = host_socket.frames_of("PLAYER_JOINED");
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0]["payload"]["player"]["turnOrder"], 1);
    assert_eq!(harness.seat_count(), 2);
    harness.assert_invariants();
}

#[tokio::test]
async fn full_waiting_room_overflows_to_spectator_then_rejects() {
    let mut harness = RoomHarness::with_config(|c| {
        c.room.max_players = 2;
        c.room.max_spectators = 1;
    })
    .await;
    harness.connect(Uuid::new_v4(), "a").await;
    harness.connect(Uuid::new_v4(), "b").await;

    let spectator = harness.connect(Uuid::new_v4(), "c").await;
    assert_eq!(spectator.attachment.role, Role::Spectator);

    let rejected = harness.try_connect(Uuid::new_v4(), "d").await;
    assert!(matches!(rejected, Err(ErrorCode::RoomFull)));
    harness.assert_invariants();
}

#[tokio::test]
async fn disconnect_reserves_seat_and_schedules_expiration() {
    let mut harness = RoomHarness::new().await;
    let host = Uuid::new_v4();
    let guest = Uuid::new_v4();
    let host_socket = harness.connect(host, "hostess").await;
    let mut guest_socket = harness.connect(guest, "guest").await;
    guest_socket.frames();

    harness.close(&host_socket, 1001).await;

    // The seat survives the socket
    assert_eq!(harness.seat_count(), 2);
    let seat = harness.actor.seat_registry().get(host).unwrap();
    assert!(!seat.is_connected);
    let deadline = seat.reconnect_deadline.unwrap();
    let expected = harness.clock.now() + chrono::Duration::milliseconds(300_000);
    assert_eq!(deadline, expected);

    let disconnected = guest_socket.frames_of("PLAYER_DISCONNECTED");
    assert_eq!(disconnected.len(), 1);
    assert_eq!(harness.alarm_kinds()[&AlarmKind::SeatExpiration], 1);
    harness.assert_invariants();

    // The lobby hears "disconnected", never "left"; delivery rides on
    // spawned dispatcher tasks, so wait for it
    let saw_disconnected = tokio::time::timeout(std::time::Duration::from_secs(1), async {
        loop {
            match harness.lobby_rx.recv().await {
                Some(LobbyNotification::UserRoomStatus { user_id, event, .. }) => {
                    assert_ne!(
                        (user_id, event),
                        (host, UserRoomEvent::Left),
                        "reserved seat must not read as left"
                    );
                    if user_id == host && event == UserRoomEvent::Disconnected {
                        break true;
                    }
                }
                Some(_) => {}
                None => break false,
            }
        }
    })
    .await
    .unwrap_or(false);
    assert!(saw_disconnected);
}

#[tokio::test]
async fn reclaim_within_window_restores_exact_seat() {
    let mut harness = RoomHarness::new().await;
    let host = Uuid::new_v4();
    let guest = Uuid::new_v4();
    let host_socket = harness.connect(host, "hostess").await;
    harness.connect(guest, "guest").await;

    let original_order = harness.actor.seat_registry().get(host).unwrap().turn_order;
    harness.close(&host_socket, 1001).await;

    harness.clock.advance_ms(60_000);
    let mut socket = harness.connect(host, "hostess").await;
    assert_eq!(socket.attachment.role, Role::Player);

    let seat = harness.actor.seat_registry().get(host).unwrap();
    assert!(seat.is_connected);
    assert!(seat.reconnect_deadline.is_none());
    assert_eq!(seat.turn_order, original_order);
    // The expiration alarm is gone
    assert_eq!(
        harness.alarm_kinds().get(&AlarmKind::SeatExpiration),
        None
    );
    let connected = socket.frames_of("CONNECTED");
    assert_eq!(connected.len(), 1);
    harness.assert_invariants();
}

#[tokio::test]
async fn reclaim_at_exact_deadline_joins_as_spectator() {
    let mut harness = RoomHarness::with_config(|c| c.room.reclaim_window_ms = 60_000).await;
    let host = Uuid::new_v4();
    let guest = Uuid::new_v4();
    let host_socket = harness.connect(host, "hostess").await;
    harness.connect(guest, "guest").await;
    harness.close(&host_socket, 1001).await;

    // Exactly at the deadline: half-open interval, reclaim rejected.
    // The expiration alarm has not dispatched yet, so the seat still exists.
    harness.clock.advance_ms(60_000);
    let socket = harness.connect(host, "hostess").await;
    assert_eq!(socket.attachment.role, Role::Spectator);
    let _ = ReclaimRejectReason::DeadlinePassed;
}

#[tokio::test]
async fn seat_expiration_releases_seat_and_broadcasts_left() {
    let mut harness = RoomHarness::with_config(|c| c.room.reclaim_window_ms = 60_000).await;
    let host = Uuid::new_v4();
    let guest = Uuid::new_v4();
    let host_socket = harness.connect(host, "hostess").await;
    let mut guest_socket = harness.connect(guest, "guest").await;
    harness.close(&host_socket, 1001).await;
    guest_socket.frames();

    // t = 65 s: the alarm has fired at t = 60 s
    harness.advance_and_fire(65_000).await;

    assert!(harness.actor.seat_registry().get(host).is_none());
    let left = guest_socket.frames_of("PLAYER_LEFT");
    assert_eq!(left.len(), 1);
    assert_eq!(left[0]["payload"]["cause"], "timeout");
    harness.assert_invariants();

    // A late reconnect lands as spectator with no seat
    let socket = harness.connect(host, "hostess").await;
    assert_eq!(socket.attachment.role, Role::Spectator);
}

#[tokio::test]
async fn host_expiry_transfers_host_to_next_human() {
    let mut harness = RoomHarness::with_config(|c| c.room.reclaim_window_ms = 60_000).await;
    let host = Uuid::new_v4();
    let guest = Uuid::new_v4();
    let host_socket = harness.connect(host, "hostess").await;
    harness.connect(guest, "guest").await;
    harness.close(&host_socket, 1001).await;

    harness.advance_and_fire(61_000).await;

    let record = harness.actor.room_record().unwrap();
    assert_eq!(record.host_id, guest, "earliest remaining human inherits host");
    assert_eq!(harness.status(), RoomStatus::Waiting);
}

#[tokio::test]
async fn waiting_room_abandons_when_last_seat_expires() {
    let mut harness = RoomHarness::with_config(|c| c.room.reclaim_window_ms = 60_000).await;
    let host = Uuid::new_v4();
    let host_socket = harness.connect(host, "hostess").await;
    harness.close(&host_socket, 1001).await;

    harness.advance_and_fire(61_000).await;

    assert!(harness.actor.is_retired());
    // Storage is wiped so the code can host a fresh room later
    assert!(harness.backend.is_empty().await);
}

#[tokio::test]
async fn duplicate_connection_for_seated_user_becomes_spectator() {
    let mut harness = RoomHarness::new().await;
    let host = Uuid::new_v4();
    harness.connect(host, "hostess").await;

    let second = harness.connect(host, "hostess").await;
    assert_eq!(second.attachment.role, Role::Spectator);
    assert_eq!(harness.seat_count(), 1);
}

#[tokio::test]
async fn hibernation_round_trip_preserves_room_seats_and_alarms() {
    let mut harness = RoomHarness::with_config(|c| c.room.reclaim_window_ms = 60_000).await;
    let host = Uuid::new_v4();
    let guest = Uuid::new_v4();
    let host_socket = harness.connect(host, "hostess").await;
    harness.connect(guest, "guest").await;
    harness.close(&host_socket, 1001).await;
    let deadline_before = harness.deadline_of(host).unwrap();

    // Actor dies; a new incarnation rebuilds everything from storage
    harness.rehydrate().await;

    assert_eq!(harness.status(), RoomStatus::Waiting);
    assert_eq!(harness.seat_count(), 2);
    assert_eq!(harness.deadline_of(host), Some(deadline_before));
    assert_eq!(harness.alarm_kinds()[&AlarmKind::SeatExpiration], 1);
    harness.assert_invariants();

    // The revived actor still expires the seat on time
    harness.advance_and_fire(61_000).await;
    assert!(harness.actor.seat_registry().get(host).is_none());
}

#[tokio::test]
async fn mid_game_disconnect_reclaim_restores_scorecard() {
    let (mut harness, host_socket, _guest_socket, host, _guest) =
        test_helpers::playing_room(&[4]).await;

    // Host rolls and scores fours: 20 points on the card
    harness
        .send(&host_socket, cmd_with("DICE_ROLL", serde_json::json!({"kept": [false, false, false, false, false]})))
        .await;
    harness
        .send(&host_socket, cmd_with("CATEGORY_SCORE", serde_json::json!({"category": "fours"})))
        .await;
    let total_before = harness
        .actor
        .game_state()
        .unwrap()
        .scorecard(host)
        .unwrap()
        .grand_total();
    assert_eq!(total_before, 20);

    harness.close(&host_socket, 1006).await;
    harness.clock.advance_ms(10_000);
    let socket = harness.connect(host, "hostess").await;
    assert_eq!(socket.attachment.role, Role::Player);

    let total_after = harness
        .actor
        .game_state()
        .unwrap()
        .scorecard(host)
        .unwrap()
        .grand_total();
    assert_eq!(total_after, total_before, "scorecard survives the reclaim");
    assert_eq!(
        harness.actor.game_state().unwrap().scorecard(host).unwrap().get(Category::Fours),
        Some(20)
    );
    harness.assert_invariants();
}
