pub mod error;
pub mod state;
pub mod ws;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use state::AppState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/ws/room", get(ws::handler::ws_upgrade))
        .route("/ws/transcription", get(ws::transcription::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
    rooms: usize,
    connections: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        rooms: state.registry.room_count(),
        connections: state.registry.connection_count(),
    })
}
