use std::sync::Arc;
use std::time::Duration;

use callroom_transcription::AsrBackend;

use crate::fixtures::test_app::{
    BrokenBackend, ScriptedBackend, TestApp, assert_nothing_pending, audio_b64, recv_close, recv_json, send_json,
};
use serde_json::json;

#[tokio::test]
async fn session_started_on_admission() {
    let app = TestApp::spawn().await;
    app.seed_room("r1", "alice");
    app.seed_session("s1", "r1");

    let mut ws = app.connect_transcription("s1", "alice").await;

    let started = recv_json(&mut ws).await;
    assert_eq!(started["type"], "session_started");
    assert_eq!(started["session_id"], "s1");
    assert_eq!(started["room_id"], "r1");
    assert_eq!(started["language"], "en");
}

#[tokio::test]
async fn recording_persists_final_chunk_and_stop_ends_the_loop() {
    let app = TestApp::spawn().await;
    app.seed_room("r1", "alice");
    app.seed_session("s1", "r1");
    let mut ws = app.connect_transcription("s1", "alice").await;
    recv_json(&mut ws).await; // session_started

    send_json(&mut ws, json!({ "type": "start_recording" })).await;
    assert_eq!(recv_json(&mut ws).await["type"], "recording_started");

    send_json(
        &mut ws,
        json!({ "type": "audio_chunk", "audio_data": audio_b64("one two three"), "format": "webm" }),
    )
    .await;
    assert_eq!(recv_json(&mut ws).await["type"], "chunk_received");
    let result = recv_json(&mut ws).await;
    assert_eq!(result["type"], "transcription");
    assert_eq!(result["text"], "one two three");
    assert_eq!(result["is_final"], true);
    assert_eq!(result["confidence"], 95.0);
    assert_eq!(result["engine"], "scripted");
    assert_eq!(result["speaker_name"], "Alice");

    send_json(&mut ws, json!({ "type": "stop_recording" })).await;
    assert_eq!(recv_json(&mut ws).await["type"], "recording_stopped");

    // Anything after stop is never processed.
    let _ = futures::SinkExt::send(
        &mut ws,
        tokio_tungstenite::tungstenite::Message::text(
            json!({ "type": "audio_chunk", "audio_data": audio_b64("four five") }).to_string(),
        ),
    )
    .await;
    assert_eq!(recv_close(&mut ws).await.unwrap().0, 1000);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let chunks = app.store.chunks("s1");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "one two three");
    assert_eq!(chunks[0].participant_id, "alice");
    assert!(chunks[0].is_final);
    assert_eq!(chunks[0].word_count, 3);
    assert_eq!(app.store.session("s1").unwrap().total_words, 3);
}

#[tokio::test]
async fn undecodable_chunk_is_acknowledged_and_loop_survives() {
    let app = TestApp::spawn().await;
    app.seed_room("r1", "alice");
    app.seed_session("s1", "r1");
    let mut ws = app.connect_transcription("s1", "alice").await;
    recv_json(&mut ws).await; // session_started

    send_json(&mut ws, json!({ "type": "audio_chunk", "audio_data": "***not base64***" })).await;
    assert_eq!(recv_json(&mut ws).await["type"], "chunk_received");
    assert_nothing_pending(&mut ws).await;

    // Odd-length raw PCM cannot be wrapped either.
    send_json(
        &mut ws,
        json!({ "type": "audio_chunk", "audio_data": audio_b64("abc"), "format": "pcm" }),
    )
    .await;
    assert_eq!(recv_json(&mut ws).await["type"], "chunk_received");
    assert_nothing_pending(&mut ws).await;

    send_json(
        &mut ws,
        json!({ "type": "audio_chunk", "audio_data": audio_b64("back again") }),
    )
    .await;
    assert_eq!(recv_json(&mut ws).await["type"], "chunk_received");
    assert_eq!(recv_json(&mut ws).await["text"], "back again");
    assert!(app.store.chunks("s1").len() == 1);
}

#[tokio::test]
async fn silent_audio_yields_no_transcription() {
    let app = TestApp::spawn().await;
    app.seed_room("r1", "alice");
    app.seed_session("s1", "r1");
    let mut ws = app.connect_transcription("s1", "alice").await;
    recv_json(&mut ws).await; // session_started

    send_json(&mut ws, json!({ "type": "audio_chunk", "audio_data": audio_b64("   ") })).await;

    assert_eq!(recv_json(&mut ws).await["type"], "chunk_received");
    assert_nothing_pending(&mut ws).await;
    assert!(app.store.chunks("s1").is_empty());
}

#[tokio::test]
async fn failing_engine_falls_back_to_next() {
    let app = TestApp::spawn_with_engines(vec![
        Arc::new(BrokenBackend) as Arc<dyn AsrBackend>,
        Arc::new(ScriptedBackend),
    ])
    .await;
    app.seed_room("r1", "alice");
    app.seed_session("s1", "r1");
    let mut ws = app.connect_transcription("s1", "alice").await;
    recv_json(&mut ws).await; // session_started

    send_json(&mut ws, json!({ "type": "audio_chunk", "audio_data": audio_b64("fallback works") })).await;

    assert_eq!(recv_json(&mut ws).await["type"], "chunk_received");
    let result = recv_json(&mut ws).await;
    assert_eq!(result["engine"], "scripted");
    assert_eq!(result["confidence"], 85.0);
}

#[tokio::test]
async fn unknown_types_are_echoed() {
    let app = TestApp::spawn().await;
    app.seed_room("r1", "alice");
    app.seed_session("s1", "r1");
    let mut ws = app.connect_transcription("s1", "alice").await;
    recv_json(&mut ws).await; // session_started

    send_json(&mut ws, json!({ "type": "pause_recording" })).await;

    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "unknown_message");
    assert_eq!(reply["received_type"], "pause_recording");
}

#[tokio::test]
async fn idle_timeout_does_not_end_the_session() {
    let app = TestApp::spawn().await;
    app.seed_room("r1", "alice");
    app.seed_session("s1", "r1");
    let mut ws = app.connect_transcription("s1", "alice").await;
    recv_json(&mut ws).await; // session_started

    // Idle timeout in the test app is one second.
    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert_nothing_pending(&mut ws).await;
}

#[tokio::test]
async fn chunks_are_not_persisted_once_session_is_no_longer_active() {
    let app = TestApp::spawn().await;
    app.seed_room("r1", "alice");
    let mut session = app.seed_session("s1", "r1");
    let mut ws = app.connect_transcription("s1", "alice").await;
    recv_json(&mut ws).await; // session_started

    session.active = false;
    app.store.insert_session(session);

    send_json(&mut ws, json!({ "type": "audio_chunk", "audio_data": audio_b64("hello") })).await;
    assert_eq!(recv_json(&mut ws).await["type"], "chunk_received");
    assert_eq!(recv_json(&mut ws).await["type"], "transcription");
    assert!(app.store.chunks("s1").is_empty());
}

#[tokio::test]
async fn admission_rules() {
    let app = TestApp::spawn().await;
    app.seed_room("r1", "alice");
    app.seed_session("s1", "r1");
    let mut ended = app.seed_session("s-ended", "r1");
    ended.active = false;
    app.store.insert_session(ended);

    let mut ws = app.connect_transcription("missing", "alice").await;
    assert_eq!(recv_close(&mut ws).await.unwrap().0, 4004);

    let mut ws = app.connect_transcription("s-ended", "alice").await;
    assert_eq!(recv_close(&mut ws).await.unwrap().0, 4004);

    let mut ws = app.connect("/ws/transcription?session_id=s1").await;
    assert_eq!(recv_close(&mut ws).await.unwrap().0, 4001);

    // Neither creator nor participant.
    let mut ws = app.connect_transcription("s1", "mallory").await;
    assert_eq!(recv_close(&mut ws).await.unwrap().0, 4003);

    // A live participant of the room is allowed.
    let (_bob_room, _) = app.join_room("r1", "bob").await;
    let mut ws = app.connect_transcription("s1", "bob").await;
    assert_eq!(recv_json(&mut ws).await["type"], "session_started");
}

#[tokio::test]
async fn audio_chunk_in_call_room_reaches_room() {
    let app = TestApp::spawn().await;
    app.seed_room("r1", "alice");
    app.seed_session("s1", "r1");
    let (mut alice, _) = app.join_room("r1", "alice").await;
    let (mut bob, _) = app.join_room("r1", "bob").await;
    recv_json(&mut alice).await; // user_joined

    send_json(
        &mut alice,
        json!({ "type": "audio_chunk", "audio_data": audio_b64("hello room"), "format": "ogg" }),
    )
    .await;

    assert_eq!(recv_json(&mut alice).await["type"], "chunk_received");
    assert_eq!(recv_json(&mut alice).await["type"], "transcription");
    let received = recv_json(&mut bob).await;
    assert_eq!(received["type"], "transcription_received");
    assert_eq!(received["user_id"], "alice");
    assert_eq!(received["text"], "hello room");
    assert_eq!(app.store.chunks("s1").len(), 1);
}

#[tokio::test]
async fn transcription_update_and_status_in_call_room() {
    let app = TestApp::spawn().await;
    app.seed_room("r1", "alice");
    app.seed_session("s1", "r1");
    let (mut alice, _) = app.join_room("r1", "alice").await;
    let (mut bob, _) = app.join_room("r1", "bob").await;
    recv_json(&mut alice).await; // user_joined

    send_json(&mut bob, json!({ "type": "transcription_status", "enabled": true, "language": "fr" })).await;
    let status = recv_json(&mut alice).await;
    assert_eq!(status["type"], "user_transcription_status");
    assert_eq!(status["enabled"], true);
    assert_eq!(recv_json(&mut bob).await["type"], "user_transcription_status");

    send_json(&mut bob, json!({ "type": "transcription_update", "text": "bonjour tout le monde" })).await;
    let update = recv_json(&mut alice).await;
    assert_eq!(update["type"], "transcription_received");
    assert_eq!(update["text"], "bonjour tout le monde");
    assert_nothing_pending(&mut bob).await;

    assert_eq!(app.store.session("s1").unwrap().total_words, 4);
    let row = app.store.participant("r1", "bob").unwrap();
    assert!(row.transcription_enabled);
    assert_eq!(row.transcription_language.as_deref(), Some("fr"));
}
