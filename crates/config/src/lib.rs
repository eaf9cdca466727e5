use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Default location of the optional TOML settings file.
pub const DEFAULT_CONFIG_FILE: &str = "config/default";

/// Top-level application settings.
///
/// Layered as: built-in defaults, then the optional TOML file, then
/// `CALLROOM__*` environment variables (`__` separates nesting levels,
/// e.g. `CALLROOM__APP__PORT=8080`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: AppSettings,
    pub auth: AuthSettings,
    pub database: DatabaseSettings,
    pub realtime: RealtimeSettings,
    pub transcription: TranscriptionSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub host: String,
    pub port: u16,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// HS256 secret used to verify bearer tokens.
    pub jwt_secret: String,
    /// When set, tokens must carry a matching `iss` claim.
    pub issuer: Option<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me".to_string(),
            issuer: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// MongoDB connection string. `None` selects the in-memory store.
    pub url: Option<String>,
    pub name: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            name: "callroom".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
    /// Upper bound of a single receive on the transcription endpoint. Expiry
    /// re-polls, it does not end the connection.
    pub idle_timeout_secs: u64,
    /// Upper bound of a single outbound frame write.
    pub send_timeout_ms: u64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30,
            send_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    /// Language hint used when neither the connection nor the chunk names one.
    pub default_language: String,
    /// Bound on a single engine call; expiry counts as an engine failure.
    pub engine_timeout_secs: u64,
    /// Results with a confidence (0-100) at or below this value are treated
    /// as failures and fall through to the next engine.
    pub min_confidence: f64,
    /// Ordered engine chain, tried first to last.
    pub engines: Vec<EngineSettings>,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            default_language: "en".to_string(),
            engine_timeout_secs: 30,
            min_confidence: 0.0,
            engines: Vec::new(),
        }
    }
}

/// One entry of the engine chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineSettings {
    /// OpenAI-compatible `/audio/transcriptions` endpoint.
    WhisperApi {
        endpoint: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_whisper_model")]
        model: String,
    },
    /// whisper.cpp model loaded in-process.
    LocalWhisper { model_path: String },
}

fn default_whisper_model() -> String {
    "whisper-1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub json: bool,
    /// Fallback filter directive when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            json: false,
            filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from the optional file at `path` (without extension,
    /// any format `config` understands) and the environment.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or(DEFAULT_CONFIG_FILE);
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("CALLROOM")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.app.host, self.app.port)
    }
}
