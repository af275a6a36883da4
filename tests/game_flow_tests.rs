//! Game command flow: start, rolls, scores, rematch, AI seats, chat,
//! invites, rate limiting.

mod test_helpers;

use test_helpers::{cmd, cmd_corr, cmd_with, playing_room, RoomHarness};
use uuid::Uuid;

use rollhouse_server::alarm::AlarmKind;
use rollhouse_server::protocol::{InviteStatus, RoomStatus};

fn roll_none() -> serde_json::Value {
    cmd_with("DICE_ROLL", serde_json::json!({"kept": [false, false, false, false, false]}))
}

fn score(category: &str) -> serde_json::Value {
    cmd_with("CATEGORY_SCORE", serde_json::json!({"category": category}))
}

#[tokio::test]
async fn start_game_requires_host_and_two_seats() {
    let mut harness = RoomHarness::new().await;
    let host = Uuid::new_v4();
    let mut host_socket = harness.connect(host, "hostess").await;
    host_socket.frames();

    // One seat: rejected
    harness.send(&host_socket, cmd("START_GAME")).await;
    let errors = host_socket.frames_of("ERROR");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["payload"]["code"], "INVALID_STATE");
    assert_eq!(harness.status(), RoomStatus::Waiting);

    // Non-host: rejected
    let guest = Uuid::new_v4();
    let mut guest_socket = harness.connect(guest, "guest").await;
    guest_socket.frames();
    harness.send(&guest_socket, cmd("START_GAME")).await;
    let errors = guest_socket.frames_of("ERROR");
    assert_eq!(errors[0]["payload"]["code"], "NOT_HOST");

    // Host with two seats: the room starts
    harness.send(&host_socket, cmd("START_GAME")).await;
    assert_eq!(harness.status(), RoomStatus::Playing);
    let types: Vec<String> = host_socket
        .frames()
        .iter()
        .map(|f| f["type"].as_str().unwrap_or_default().to_string())
        .collect();
    assert!(types.contains(&"GAME_STARTING".to_string()));
    assert!(types.contains(&"GAME_STARTED".to_string()));
    assert!(types.contains(&"TURN_STARTED".to_string()));
    assert_eq!(harness.alarm_kinds()[&AlarmKind::TurnTimeout], 1);
    harness.assert_invariants();
}

#[tokio::test]
async fn roll_and_score_advance_the_turn() {
    let (mut harness, mut host_socket, mut guest_socket, host, guest) =
        playing_room(&[3]).await;

    harness.send(&host_socket, roll_none()).await;
    let rolled = &guest_socket.frames_of("DICE_ROLLED")[0];
    assert_eq!(rolled["payload"]["rollNumber"], 1);
    assert_eq!(rolled["payload"]["dice"], serde_json::json!([3, 3, 3, 3, 3]));

    harness.send(&host_socket, score("threes")).await;
    let scored = &host_socket.frames_of("CATEGORY_SCORED")[0];
    assert_eq!(scored["payload"]["points"], 15);

    let game = harness.actor.game_state().unwrap();
    assert_eq!(game.current_player(), Some(guest));
    assert_eq!(game.roll_number, 0);
    let _ = host;
    harness.assert_invariants();
}

#[tokio::test]
async fn out_of_turn_and_unrolled_scores_are_rejected() {
    let (mut harness, _host_socket, mut guest_socket, _host, _guest) =
        playing_room(&[3]).await;

    // Not the guest's turn
    harness.send(&guest_socket, roll_none()).await;
    let errors = guest_socket.frames_of("ERROR");
    assert_eq!(errors[0]["payload"]["code"], "NOT_YOUR_TURN");
}

#[tokio::test]
async fn fourth_roll_is_rejected_with_roll_limit() {
    let (mut harness, mut host_socket, _guest_socket, _host, _guest) =
        playing_room(&[2]).await;

    for _ in 0..3 {
        harness.send(&host_socket, roll_none()).await;
    }
    host_socket.frames();

    harness.send(&host_socket, roll_none()).await;
    let frames = host_socket.frames();
    let errors: Vec<_> = frames.iter().filter(|f| f["type"] == "ERROR").collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["payload"]["code"], "ROLL_LIMIT");
    // No DICE_ROLLED beyond the error
    assert!(frames.iter().all(|f| f["type"] != "DICE_ROLLED"));
    assert_eq!(harness.actor.game_state().unwrap().roll_number, 3);
}

#[tokio::test]
async fn scoring_a_filled_category_is_rejected() {
    let (mut harness, mut host_socket, mut guest_socket, _host, _guest) =
        playing_room(&[5]).await;

    harness.send(&host_socket, roll_none()).await;
    harness.send(&host_socket, score("chance")).await;
    harness.send(&guest_socket, roll_none()).await;
    harness.send(&guest_socket, score("chance")).await;
    host_socket.frames();

    harness.send(&host_socket, roll_none()).await;
    harness.send(&host_socket, score("chance")).await;
    let errors = host_socket.frames_of("ERROR");
    assert_eq!(errors[0]["payload"]["code"], "CATEGORY_UNAVAILABLE");
    harness.assert_invariants();
}

#[tokio::test]
async fn score_without_roll_is_invalid_state() {
    let (mut harness, mut host_socket, _guest_socket, _host, _guest) =
        playing_room(&[5]).await;
    harness.send(&host_socket, score("chance")).await;
    let errors = host_socket.frames_of("ERROR");
    assert_eq!(errors[0]["payload"]["code"], "INVALID_STATE");
}

#[tokio::test]
async fn full_game_completes_and_rematch_resets() {
    let (mut harness, mut host_socket, mut guest_socket, _host, _guest) =
        playing_room(&[6]).await;

    let categories = [
        "ones", "twos", "threes", "fours", "fives", "sixes", "three_of_a_kind",
        "four_of_a_kind", "full_house", "small_straight", "large_straight",
        "five_of_a_kind", "chance",
    ];
    for category in categories {
        for socket in [&host_socket, &guest_socket] {
            harness.send(socket, roll_none()).await;
            harness.send(socket, score(category)).await;
        }
    }

    assert_eq!(harness.status(), RoomStatus::Completed);
    let over = guest_socket.frames_of("GAME_OVER");
    assert_eq!(over.len(), 1);
    let standings = over[0]["payload"]["standings"].as_array().unwrap();
    assert_eq!(standings.len(), 2);
    assert_eq!(standings[0]["rank"], 1);
    // All sixes every turn: upper bonus and five-of-a-kind included
    assert!(standings[0]["total"].as_u64().unwrap() > 0);
    // Turn timers are gone once the game ends
    assert_eq!(harness.alarm_kinds().get(&AlarmKind::TurnTimeout), None);
    harness.assert_invariants();

    // Rematch flips the room back to waiting with no game state
    host_socket.frames();
    harness.send(&host_socket, cmd("REMATCH")).await;
    assert_eq!(harness.status(), RoomStatus::Waiting);
    assert!(harness.actor.game_state().is_none());
    let rematch = host_socket.frames_of("REMATCH_STARTED");
    assert_eq!(rematch.len(), 1);
}

#[tokio::test]
async fn ai_seat_plays_its_turns() {
    let mut harness = RoomHarness::with_dice(&[6]).await;
    let host = Uuid::new_v4();
    let mut host_socket = harness.connect(host, "hostess").await;
    harness
        .send(&host_socket, cmd_with("ADD_AI_PLAYER", serde_json::json!({"profileId": "greedy"})))
        .await;
    assert_eq!(harness.seat_count(), 2);
    let ai_joined = host_socket.frames_of("AI_PLAYER_JOINED");
    assert_eq!(ai_joined.len(), 1);
    assert_eq!(ai_joined[0]["payload"]["player"]["isAi"], true);

    harness.send(&host_socket, cmd("START_GAME")).await;
    host_socket.frames();

    // Host takes a turn; the AI then takes its own before control returns
    harness.send(&host_socket, roll_none()).await;
    harness.send(&host_socket, score("sixes")).await;

    let game = harness.actor.game_state().unwrap();
    assert_eq!(game.current_player(), Some(host), "AI turn already played");
    let ai_id = harness
        .actor
        .seat_registry()
        .iter()
        .find(|s| s.is_ai)
        .unwrap()
        .user_id;
    assert_eq!(game.scorecard(ai_id).unwrap().scored_count(), 1);
    harness.assert_invariants();
}

#[tokio::test]
async fn ai_seat_can_only_be_managed_by_host_in_waiting() {
    let mut harness = RoomHarness::new().await;
    let host = Uuid::new_v4();
    let guest = Uuid::new_v4();
    let host_socket = harness.connect(host, "hostess").await;
    let mut guest_socket = harness.connect(guest, "guest").await;
    guest_socket.frames();

    harness
        .send(&guest_socket, cmd_with("ADD_AI_PLAYER", serde_json::json!({"profileId": "greedy"})))
        .await;
    assert_eq!(
        guest_socket.frames_of("ERROR")[0]["payload"]["code"],
        "NOT_HOST"
    );

    harness
        .send(&host_socket, cmd_with("ADD_AI_PLAYER", serde_json::json!({"profileId": "greedy"})))
        .await;
    let ai_id = harness
        .actor
        .seat_registry()
        .iter()
        .find(|s| s.is_ai)
        .unwrap()
        .user_id;

    // Removing a human seat through REMOVE_AI_PLAYER is rejected
    harness
        .send(&host_socket, cmd_with("REMOVE_AI_PLAYER", serde_json::json!({"playerId": guest})))
        .await;
    assert_eq!(harness.seat_count(), 3);

    harness
        .send(&host_socket, cmd_with("REMOVE_AI_PLAYER", serde_json::json!({"playerId": ai_id})))
        .await;
    assert_eq!(harness.seat_count(), 2);
    let removed = guest_socket.frames_of("AI_PLAYER_REMOVED");
    assert_eq!(removed.len(), 1);
}

#[tokio::test]
async fn chat_flows_with_correlation_and_length_limit() {
    let mut harness = RoomHarness::with_config(|c| c.room.max_message_len = 10).await;
    let host = Uuid::new_v4();
    let guest = Uuid::new_v4();
    let mut host_socket = harness.connect(host, "hostess").await;
    let mut guest_socket = harness.connect(guest, "guest").await;
    host_socket.frames();
    guest_socket.frames();

    harness
        .send(&host_socket, cmd_corr("CHAT", serde_json::json!({"content": "hi there"}), "c-42"))
        .await;
    let message = &guest_socket.frames_of("CHAT_MESSAGE")[0];
    assert_eq!(message["payload"]["message"]["content"], "hi there");
    // The correlation id of the causing command rides on the broadcast
    assert_eq!(message["correlationId"], "c-42");
    assert_eq!(harness.actor.chat_backlog().len(), 1);

    harness
        .send(&host_socket, cmd_with("CHAT", serde_json::json!({"content": "way too long message"})))
        .await;
    assert_eq!(
        host_socket.frames_of("ERROR")[0]["payload"]["code"],
        "INVALID_PAYLOAD"
    );
    assert_eq!(harness.actor.chat_backlog().len(), 1);
}

#[tokio::test]
async fn quick_chat_and_reactions() {
    let mut harness = RoomHarness::new().await;
    let host = Uuid::new_v4();
    let mut host_socket = harness.connect(host, "hostess").await;
    host_socket.frames();

    harness
        .send(&host_socket, cmd_with("QUICK_CHAT", serde_json::json!({"key": "nice_roll"})))
        .await;
    let message = &host_socket.frames_of("CHAT_MESSAGE")[0];
    assert_eq!(message["payload"]["message"]["content"], "Nice roll!");
    let message_id = message["payload"]["message"]["messageId"].as_str().unwrap().to_string();

    harness
        .send(
            &host_socket,
            cmd_with(
                "REACTION",
                serde_json::json!({"messageId": message_id, "emoji": "🎲", "action": "add"}),
            ),
        )
        .await;
    let update = &host_socket.frames_of("REACTION_UPDATE")[0];
    assert_eq!(update["payload"]["count"], 1);
    assert_eq!(update["payload"]["emoji"], "🎲");
}

#[tokio::test]
async fn typing_indicator_sets_and_expires() {
    let mut harness = RoomHarness::new().await;
    let host = Uuid::new_v4();
    let guest = Uuid::new_v4();
    let host_socket = harness.connect(host, "hostess").await;
    let mut guest_socket = harness.connect(guest, "guest").await;
    guest_socket.frames();

    harness.send(&host_socket, cmd("TYPING_START")).await;
    let update = &guest_socket.frames_of("TYPING_UPDATE")[0];
    assert_eq!(update["payload"]["typing"].as_array().unwrap().len(), 1);

    // No TYPING_STOP ever arrives; the debounce alarm clears the flag
    harness.advance_and_fire(10_000).await;
    let update = guest_socket.frames_of("TYPING_UPDATE");
    assert_eq!(update.last().unwrap()["payload"]["typing"], serde_json::json!([]));
}

#[tokio::test]
async fn unknown_and_malformed_frames_get_invalid_payload() {
    let mut harness = RoomHarness::new().await;
    let host = Uuid::new_v4();
    let mut host_socket = harness.connect(host, "hostess").await;
    host_socket.frames();

    harness
        .send(&host_socket, serde_json::json!({"type": "NO_SUCH_COMMAND"}))
        .await;
    assert_eq!(
        host_socket.frames_of("ERROR")[0]["payload"]["code"],
        "INVALID_PAYLOAD"
    );

    // Structurally broken frame
    harness
        .actor
        .handle_client_frame(host_socket.connection_id, &host_socket.attachment, "not json")
        .await;
    assert_eq!(
        host_socket.frames_of("ERROR")[0]["payload"]["code"],
        "INVALID_PAYLOAD"
    );
}

#[tokio::test]
async fn ping_answers_pong_without_touching_state() {
    let mut harness = RoomHarness::new().await;
    let host = Uuid::new_v4();
    let mut host_socket = harness.connect(host, "hostess").await;
    host_socket.frames();

    harness.send(&host_socket, cmd_corr("PING", serde_json::json!(null), "p-1")).await;
    let pong = &host_socket.frames_of("PONG")[0];
    assert_eq!(pong["correlationId"], "p-1");
    assert_eq!(harness.metrics.snapshot().commands_handled, 0, "PING is suppressed");
}

#[tokio::test]
async fn chat_budget_rate_limits() {
    let mut harness = RoomHarness::with_config(|c| c.rate_limit.chat_per_window = 2).await;
    let host = Uuid::new_v4();
    let mut host_socket = harness.connect(host, "hostess").await;
    host_socket.frames();

    for i in 0..3 {
        harness
            .send(&host_socket, cmd_with("CHAT", serde_json::json!({"content": format!("m{i}")})))
            .await;
    }
    let errors = host_socket.frames_of("ERROR");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["payload"]["code"], "RATE_LIMIT");
    assert_eq!(harness.actor.chat_backlog().len(), 2);
}

#[tokio::test]
async fn invite_lifecycle_send_cancel_accept() {
    let mut harness = RoomHarness::new().await;
    let host = Uuid::new_v4();
    let target = Uuid::new_v4();
    let mut host_socket = harness.connect(host, "hostess").await;
    host_socket.frames();

    harness
        .send(&host_socket, cmd_with("SEND_INVITE", serde_json::json!({"targetUserId": target})))
        .await;
    let sent = &host_socket.frames_of("INVITE_SENT")[0];
    let invite_id: uuid::Uuid =
        serde_json::from_value(sent["payload"]["invite"]["inviteId"].clone()).unwrap();
    assert_eq!(harness.actor.invite_count(), 1);
    assert_eq!(harness.alarm_kinds()[&AlarmKind::InviteExpiration], 1);

    // Cancel removes it and its alarm
    harness
        .send(&host_socket, cmd_with("CANCEL_INVITE", serde_json::json!({"inviteId": invite_id})))
        .await;
    assert_eq!(harness.actor.invite_count(), 0);
    assert_eq!(harness.alarm_kinds().get(&AlarmKind::InviteExpiration), None);
    assert_eq!(host_socket.frames_of("INVITE_CANCELLED").len(), 1);

    // A fresh invite accepted within TTL seats the invitee as reserved
    harness
        .send(&host_socket, cmd_with("SEND_INVITE", serde_json::json!({"targetUserId": target})))
        .await;
    let sent = &host_socket.frames_of("INVITE_SENT")[0];
    let invite_id: uuid::Uuid =
        serde_json::from_value(sent["payload"]["invite"]["inviteId"].clone()).unwrap();

    harness
        .actor
        .handle_invite_answer(invite_id, target, "invitee", true)
        .await;
    assert_eq!(host_socket.frames_of("INVITE_ACCEPTED").len(), 1);
    let seat = harness.actor.seat_registry().get(target).unwrap();
    assert!(!seat.is_connected, "placeholder seat awaits the connect");
    assert!(seat.reconnect_deadline.is_some());
    harness.assert_invariants();

    // Connecting claims the reserved placeholder
    let socket = harness.connect(target, "invitee").await;
    assert!(test_helpers::is_player(&socket));
    harness.assert_invariants();
}

#[tokio::test]
async fn declined_invite_is_removed() {
    let mut harness = RoomHarness::new().await;
    let host = Uuid::new_v4();
    let target = Uuid::new_v4();
    let mut host_socket = harness.connect(host, "hostess").await;
    host_socket.frames();

    harness
        .send(&host_socket, cmd_with("SEND_INVITE", serde_json::json!({"targetUserId": target})))
        .await;
    let sent = &host_socket.frames_of("INVITE_SENT")[0];
    let invite_id: uuid::Uuid =
        serde_json::from_value(sent["payload"]["invite"]["inviteId"].clone()).unwrap();

    harness
        .actor
        .handle_invite_answer(invite_id, target, "invitee", false)
        .await;
    assert_eq!(host_socket.frames_of("INVITE_DECLINED").len(), 1);
    assert_eq!(harness.actor.invite_count(), 0);
    assert!(harness.actor.seat_registry().get(target).is_none());
    let _ = InviteStatus::Declined;
}
