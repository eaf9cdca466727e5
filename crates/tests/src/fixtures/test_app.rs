use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use callroom_api::{build_router, state::AppState};
use callroom_config::Settings;
use callroom_db::models::{Room, TranscriptionSession};
use callroom_services::MemoryCallStore;
use callroom_transcription::{AsrBackend, AsrRequest, EngineChain, TranscriptionResult};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(3);

/// Treats the audio bytes as UTF-8 and "recognizes" them verbatim, so tests
/// can choose the transcript by choosing the payload.
pub struct ScriptedBackend;

#[async_trait]
impl AsrBackend for ScriptedBackend {
    async fn transcribe(&self, request: AsrRequest) -> anyhow::Result<TranscriptionResult> {
        Ok(TranscriptionResult {
            text: String::from_utf8_lossy(&request.audio.bytes).to_string(),
            language: request.language_hint,
            confidence: None,
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Always errors, to exercise fallback.
pub struct BrokenBackend;

#[async_trait]
impl AsrBackend for BrokenBackend {
    async fn transcribe(&self, _request: AsrRequest) -> anyhow::Result<TranscriptionResult> {
        anyhow::bail!("engine offline")
    }

    fn name(&self) -> &str {
        "broken"
    }
}

pub struct TestApp {
    pub addr: SocketAddr,
    pub state: AppState,
    pub store: Arc<MemoryCallStore>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_engines(vec![Arc::new(ScriptedBackend) as Arc<dyn AsrBackend>]).await
    }

    pub async fn spawn_with_engines(engines: Vec<Arc<dyn AsrBackend>>) -> Self {
        let mut settings = Settings::default();
        settings.auth.jwt_secret = "test-secret".to_string();
        settings.realtime.idle_timeout_secs = 1;
        settings.realtime.send_timeout_ms = 1000;

        let store = Arc::new(MemoryCallStore::new());
        let engines = EngineChain::new(engines, 0.0, Duration::from_secs(5));
        let state = AppState::new(settings, store.clone(), engines);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { addr, state, store }
    }

    pub fn token(&self, user_id: &str, display_name: &str) -> String {
        self.state
            .auth
            .issue_access_token(user_id, Some(display_name), 3600)
            .unwrap()
    }

    pub fn seed_room(&self, room_id: &str, creator_id: &str) -> Room {
        let room = Room::new(room_id, format!("Room {room_id}"), creator_id);
        self.store.insert_room(room.clone());
        room
    }

    pub fn seed_session(&self, session_id: &str, room_id: &str) -> TranscriptionSession {
        let session = TranscriptionSession::new(session_id, room_id, "en");
        self.store.insert_session(session.clone());
        session
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn connect(&self, path_and_query: &str) -> WsClient {
        let url = format!("ws://{}{}", self.addr, path_and_query);
        let (ws, _) = connect_async(&url).await.expect("WS connect failed");
        ws
    }

    pub async fn connect_with_bearer(&self, path_and_query: &str, token: &str) -> WsClient {
        let mut request = format!("ws://{}{}", self.addr, path_and_query)
            .into_client_request()
            .unwrap();
        request
            .headers_mut()
            .insert("Authorization", format!("Bearer {token}").parse().unwrap());
        let (ws, _) = connect_async(request).await.expect("WS connect failed");
        ws
    }

    pub async fn connect_room(&self, room_id: &str, user_id: &str) -> WsClient {
        let token = self.token(user_id, &display_name(user_id));
        self.connect(&format!("/ws/room?room_id={room_id}&token={token}"))
            .await
    }

    /// Connects and consumes the `joined_room` welcome.
    pub async fn join_room(&self, room_id: &str, user_id: &str) -> (WsClient, Value) {
        let mut ws = self.connect_room(room_id, user_id).await;
        let welcome = recv_json(&mut ws).await;
        assert_eq!(welcome["type"], "joined_room", "unexpected first message: {welcome}");
        (ws, welcome)
    }

    pub async fn connect_transcription(&self, session_id: &str, user_id: &str) -> WsClient {
        let token = self.token(user_id, &display_name(user_id));
        self.connect(&format!(
            "/ws/transcription?session_id={session_id}&language=en&token={token}"
        ))
        .await
    }

    /// Polls until `check` holds or a couple of seconds pass.
    pub async fn eventually(&self, mut check: impl FnMut(&MemoryCallStore) -> bool) -> bool {
        for _ in 0..100 {
            if check(&self.store) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

/// "alice" -> "Alice"
pub fn display_name(user_id: &str) -> String {
    let mut chars = user_id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn audio_b64(spoken: &str) -> String {
    BASE64.encode(spoken.as_bytes())
}

pub async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

/// Next text frame as JSON. Panics on timeout or close.
pub async fn recv_json(ws: &mut WsClient) -> Value {
    loop {
        let msg = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("Timed out waiting for WS message")
            .expect("WS stream ended")
            .expect("WS error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

/// Sends a `ping` and asserts the very next message is the `pong`, proving
/// nothing else was queued for this client.
pub async fn assert_nothing_pending(ws: &mut WsClient) {
    send_json(ws, serde_json::json!({ "type": "ping" })).await;
    let next = recv_json(ws).await;
    assert_eq!(next["type"], "pong", "unexpected pending message: {next}");
}

/// Reads until the server's close frame and returns its code and reason.
pub async fn recv_close(ws: &mut WsClient) -> Option<(u16, String)> {
    loop {
        let next = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("Timed out waiting for close");
        match next {
            Some(Ok(Message::Close(frame))) => {
                return frame.map(|f| (u16::from(f.code), f.reason.to_string()));
            }
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return None,
        }
    }
}
