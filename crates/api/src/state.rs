use std::sync::Arc;
use std::time::Duration;

use callroom_config::Settings;
use callroom_services::{AuthService, CallStore};
use callroom_transcription::EngineChain;

use crate::ws::registry::RoomRegistry;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub auth: Arc<AuthService>,
    pub store: Arc<dyn CallStore>,
    pub registry: Arc<RoomRegistry>,
    pub engines: Arc<EngineChain>,
}

impl AppState {
    pub fn new(settings: Settings, store: Arc<dyn CallStore>, engines: EngineChain) -> Self {
        let auth = AuthService::new(&settings.auth);
        Self {
            settings: Arc::new(settings),
            auth: Arc::new(auth),
            store,
            registry: Arc::new(RoomRegistry::new()),
            engines: Arc::new(engines),
        }
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.realtime.send_timeout_ms)
    }

    /// Bound on a single receive in the transcription loop, never below
    /// one second.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.realtime.idle_timeout_secs.max(1))
    }
}
