use std::sync::Arc;
use std::time::Duration;

use callroom_config::{EngineSettings, TranscriptionSettings};
use tracing::{debug, info, warn};

use crate::asr::whisper_api::WhisperApiBackend;
use crate::asr::{AsrBackend, AsrRequest};
use crate::audio::AudioInput;

/// Confidence reported for text from the first engine when it gives none.
pub const PRIMARY_ENGINE_CONFIDENCE: f64 = 95.0;
/// Confidence reported for text from any later engine when it gives none.
pub const FALLBACK_ENGINE_CONFIDENCE: f64 = 85.0;

/// Text produced by the first engine in the chain that succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    pub text: String,
    /// 0-100.
    pub confidence: f64,
    pub engine: String,
    pub language: Option<String>,
}

/// Ordered list of interchangeable ASR backends, tried first to last until
/// one returns usable text.
pub struct EngineChain {
    engines: Vec<Arc<dyn AsrBackend>>,
    min_confidence: f64,
    engine_timeout: Duration,
}

impl EngineChain {
    pub fn new(engines: Vec<Arc<dyn AsrBackend>>, min_confidence: f64, engine_timeout: Duration) -> Self {
        Self {
            engines,
            min_confidence,
            engine_timeout,
        }
    }

    /// Builds the chain described by the settings. Engines that fail to
    /// initialise are logged and left out.
    pub fn from_settings(settings: &TranscriptionSettings) -> Self {
        let mut engines: Vec<Arc<dyn AsrBackend>> = Vec::new();

        for engine in &settings.engines {
            match engine {
                EngineSettings::WhisperApi {
                    endpoint,
                    api_key,
                    model,
                } => {
                    engines.push(Arc::new(WhisperApiBackend::new(endpoint, api_key.clone(), model)));
                }
                #[cfg(feature = "local-whisper")]
                EngineSettings::LocalWhisper { model_path } => {
                    match crate::asr::local_whisper::LocalWhisperBackend::new(
                        model_path,
                        Some(settings.default_language.clone()),
                    ) {
                        Ok(backend) => engines.push(Arc::new(backend)),
                        Err(e) => warn!(%model_path, %e, "Skipping local whisper engine"),
                    }
                }
                #[cfg(not(feature = "local-whisper"))]
                EngineSettings::LocalWhisper { model_path } => {
                    warn!(%model_path, "local_whisper engine configured but the `local-whisper` feature is disabled");
                }
            }
        }

        let chain = Self::new(
            engines,
            settings.min_confidence,
            Duration::from_secs(settings.engine_timeout_secs),
        );
        info!(engines = ?chain.engine_names(), "Transcription engine chain built");
        chain
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn engine_names(&self) -> Vec<String> {
        self.engines.iter().map(|e| e.name().to_string()).collect()
    }

    /// Runs the chain. Returns `None` when every engine errored, timed out,
    /// or produced empty or low-confidence text.
    pub async fn transcribe(&self, audio: &AudioInput, language_hint: Option<&str>) -> Option<ChainOutcome> {
        for (position, engine) in self.engines.iter().enumerate() {
            let request = AsrRequest {
                audio: audio.clone(),
                language_hint: language_hint.map(str::to_string),
            };

            let result = match tokio::time::timeout(self.engine_timeout, engine.transcribe(request)).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    warn!(engine = engine.name(), %e, "Engine failed, trying next");
                    continue;
                }
                Err(_) => {
                    warn!(engine = engine.name(), timeout = ?self.engine_timeout, "Engine timed out, trying next");
                    continue;
                }
            };

            let text = result.text.trim();
            if text.is_empty() {
                debug!(engine = engine.name(), "Engine returned no text, trying next");
                continue;
            }

            let confidence = result
                .confidence
                .map(|c| (c * 100.0).clamp(0.0, 100.0))
                .unwrap_or_else(|| default_confidence(position));
            if confidence <= self.min_confidence {
                debug!(engine = engine.name(), confidence, "Engine result below confidence floor, trying next");
                continue;
            }

            return Some(ChainOutcome {
                text: text.to_string(),
                confidence,
                engine: engine.name().to_string(),
                language: result.language,
            });
        }

        None
    }
}

fn default_confidence(position: usize) -> f64 {
    if position == 0 {
        PRIMARY_ENGINE_CONFIDENCE
    } else {
        FALLBACK_ENGINE_CONFIDENCE
    }
}
