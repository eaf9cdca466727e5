use crate::fixtures::test_app::{TestApp, assert_nothing_pending, recv_close, recv_json, send_json};
use futures::SinkExt;
use serde_json::{Value, json};

#[tokio::test]
async fn chat_message_reaches_others_but_not_sender() {
    let app = TestApp::spawn().await;
    app.seed_room("r1", "alice");

    let (mut alice, _) = app.join_room("r1", "alice").await;
    let (mut bob, welcome) = app.join_room("r1", "bob").await;
    assert_eq!(welcome["participants"][0]["user_id"], "alice");

    let joined = recv_json(&mut alice).await;
    assert_eq!(joined["type"], "user_joined");
    assert_eq!(joined["user_id"], "bob");

    send_json(&mut alice, json!({ "type": "chat_message", "message": "hi" })).await;

    let msg = recv_json(&mut bob).await;
    assert_eq!(msg["type"], "chat_message");
    assert_eq!(msg["user_id"], "alice");
    assert_eq!(msg["display_name"], "Alice");
    assert_eq!(msg["message"], "hi");

    assert_nothing_pending(&mut alice).await;
}

#[tokio::test]
async fn single_participant_lifecycle_activates_then_ends_room() {
    let app = TestApp::spawn().await;
    app.seed_room("r1", "alice");

    let (mut alice, welcome) = app.join_room("r1", "alice").await;
    assert_eq!(welcome["room_id"], "r1");
    assert_eq!(welcome["user_id"], "alice");
    assert_eq!(welcome["participants"].as_array().unwrap().len(), 0);
    assert!(app.store.room("r1").unwrap().active);
    assert!(app.store.participant("r1", "alice").unwrap().is_currently_in_call);

    alice.close(None).await.unwrap();

    assert!(app.eventually(|s| !s.room("r1").unwrap().active).await);
    let room = app.store.room("r1").unwrap();
    assert!(room.ended_at.is_some());
    let row = app.store.participant("r1", "alice").unwrap();
    assert!(!row.is_currently_in_call);
    assert!(row.left_at.is_some());
    assert_eq!(app.state.registry.room_count(), 0);
}

#[tokio::test]
async fn disconnect_announces_user_left() {
    let app = TestApp::spawn().await;
    app.seed_room("r1", "alice");

    let (mut alice, _) = app.join_room("r1", "alice").await;
    let (mut bob, _) = app.join_room("r1", "bob").await;
    recv_json(&mut alice).await; // user_joined

    bob.close(None).await.unwrap();

    let left = recv_json(&mut alice).await;
    assert_eq!(left["type"], "user_left");
    assert_eq!(left["user_id"], "bob");
    assert!(app.store.room("r1").unwrap().active);
}

#[tokio::test]
async fn explicit_leave_keeps_socket_open_and_allows_rejoin() {
    let app = TestApp::spawn().await;
    app.seed_room("r1", "alice");

    let (mut alice, _) = app.join_room("r1", "alice").await;
    let (mut bob, _) = app.join_room("r1", "bob").await;
    recv_json(&mut alice).await; // user_joined

    send_json(&mut bob, json!({ "type": "leave" })).await;
    let left = recv_json(&mut alice).await;
    assert_eq!(left["type"], "user_left");

    // Outside the room only ping and join do anything.
    assert_nothing_pending(&mut bob).await;
    send_json(&mut bob, json!({ "type": "chat_message", "message": "hello?" })).await;
    assert_eq!(recv_json(&mut bob).await["type"], "error");
    assert_nothing_pending(&mut alice).await;

    send_json(&mut bob, json!({ "type": "join" })).await;
    let welcome = recv_json(&mut bob).await;
    assert_eq!(welcome["type"], "joined_room");
    assert_eq!(welcome["participants"][0]["user_id"], "alice");
    assert_eq!(recv_json(&mut alice).await["type"], "user_joined");
    assert!(app.store.participant("r1", "bob").unwrap().is_currently_in_call);
}

#[tokio::test]
async fn reconnect_replaces_entry_and_stale_disconnect_is_ignored() {
    let app = TestApp::spawn().await;
    app.seed_room("r1", "alice");

    let (mut alice_old, _) = app.join_room("r1", "alice").await;
    let (mut bob, _) = app.join_room("r1", "bob").await;
    recv_json(&mut alice_old).await; // user_joined bob

    let (mut alice_new, welcome) = app.join_room("r1", "alice").await;
    assert_eq!(welcome["participants"].as_array().unwrap().len(), 1);
    assert_eq!(recv_json(&mut bob).await["type"], "user_joined");
    assert_eq!(app.state.registry.connection_count(), 2);

    alice_old.close(None).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    assert_nothing_pending(&mut bob).await;
    assert!(app.state.registry.contains("r1", "alice"));
    assert!(app.store.room("r1").unwrap().active);
    assert!(app.store.participant("r1", "alice").unwrap().is_currently_in_call);

    send_json(&mut bob, json!({ "type": "chat_message", "message": "still there?" })).await;
    assert_eq!(recv_json(&mut alice_new).await["message"], "still there?");
}

#[tokio::test]
async fn unknown_message_kinds_pass_through_with_sender_identity() {
    let app = TestApp::spawn().await;
    app.seed_room("r1", "alice");

    let (mut alice, _) = app.join_room("r1", "alice").await;
    let (mut bob, _) = app.join_room("r1", "bob").await;
    recv_json(&mut alice).await; // user_joined

    send_json(&mut alice, json!({ "type": "reaction", "emoji": "tada" })).await;

    let msg = recv_json(&mut bob).await;
    assert_eq!(msg["type"], "reaction");
    assert_eq!(msg["emoji"], "tada");
    assert_eq!(msg["user_id"], "alice");
    assert_nothing_pending(&mut alice).await;
}

#[tokio::test]
async fn malformed_frames_get_error_reply() {
    let app = TestApp::spawn().await;
    app.seed_room("r1", "alice");
    let (mut alice, _) = app.join_room("r1", "alice").await;

    alice
        .send(tokio_tungstenite::tungstenite::Message::text("{oops"))
        .await
        .unwrap();
    assert_eq!(recv_json(&mut alice).await["type"], "error");

    send_json(&mut alice, json!({ "message": "no type" })).await;
    assert_eq!(recv_json(&mut alice).await["type"], "error");

    send_json(&mut alice, json!({ "type": "offer" })).await;
    assert_eq!(recv_json(&mut alice).await["type"], "error");

    assert_nothing_pending(&mut alice).await;
}

#[tokio::test]
async fn store_failures_do_not_break_live_room() {
    let app = TestApp::spawn().await;
    app.seed_room("r1", "alice");
    app.store.set_fail_writes(true);

    let (mut alice, _) = app.join_room("r1", "alice").await;
    let (mut bob, _) = app.join_room("r1", "bob").await;
    recv_json(&mut alice).await; // user_joined

    send_json(&mut bob, json!({ "type": "chat_message", "message": "ok" })).await;
    assert_eq!(recv_json(&mut alice).await["type"], "chat_message");
    assert!(app.store.participant("r1", "bob").is_none());
}

#[tokio::test]
async fn bearer_header_is_accepted() {
    let app = TestApp::spawn().await;
    app.seed_room("r1", "alice");
    let token = app.token("alice", "Alice");

    let mut ws = app.connect_with_bearer("/ws/room?room_id=r1", &token).await;

    assert_eq!(recv_json(&mut ws).await["type"], "joined_room");
}

#[tokio::test]
async fn admission_failures_close_with_policy_codes() {
    let app = TestApp::spawn().await;
    app.seed_room("r1", "alice");
    let mut ended = app.seed_room("ended", "alice");
    ended.active = false;
    app.store.insert_room(ended);
    let token = app.token("alice", "Alice");

    let mut ws = app.connect("/ws/room?room_id=r1").await;
    assert_eq!(recv_close(&mut ws).await.unwrap().0, 4001);

    let mut ws = app.connect("/ws/room?room_id=r1&token=garbage").await;
    assert_eq!(recv_close(&mut ws).await.unwrap().0, 4001);

    let mut ws = app.connect(&format!("/ws/room?room_id=nope&token={token}")).await;
    assert_eq!(recv_close(&mut ws).await.unwrap().0, 4004);

    let mut ws = app.connect(&format!("/ws/room?room_id=ended&token={token}")).await;
    assert_eq!(recv_close(&mut ws).await.unwrap().0, 4004);

    let mut ws = app.connect(&format!("/ws/room?token={token}")).await;
    assert_eq!(recv_close(&mut ws).await.unwrap().0, 4004);
}

#[tokio::test]
async fn full_room_rejects_newcomers_but_not_reconnects() {
    let app = TestApp::spawn().await;
    let mut room = app.seed_room("r1", "alice");
    room.max_participants = 1;
    app.store.insert_room(room);

    let (_alice, _) = app.join_room("r1", "alice").await;

    let mut bob = app.connect_room("r1", "bob").await;
    assert_eq!(recv_close(&mut bob).await.unwrap().0, 4009);

    let (_alice_again, _) = app.join_room("r1", "alice").await;
    assert_eq!(app.state.registry.connection_count(), 1);
}

#[tokio::test]
async fn health_reports_registry_counters() {
    let app = TestApp::spawn().await;
    app.seed_room("r1", "alice");
    let (_alice, _) = app.join_room("r1", "alice").await;
    let (_bob, _) = app.join_room("r1", "bob").await;

    let resp = reqwest::get(app.http_url("/health")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["rooms"], 1);
    assert_eq!(json["connections"], 2);
}
