#[cfg(feature = "local-whisper")]
pub mod local_whisper;

pub mod whisper_api;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::audio::AudioInput;

/// Request to transcribe one audio chunk.
pub struct AsrRequest {
    /// Self-describing audio (raw PCM is already wrapped into WAV).
    pub audio: AudioInput,
    /// Optional language hint (ISO 639-1, e.g. "en", "de").
    pub language_hint: Option<String>,
}

/// Result of an ASR transcription.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub language: Option<String>,
    /// Engine-reported confidence in `0.0..=1.0`, when the engine has one.
    pub confidence: Option<f64>,
}

/// Trait for pluggable ASR backends.
#[async_trait]
pub trait AsrBackend: Send + Sync + 'static {
    async fn transcribe(&self, request: AsrRequest) -> anyhow::Result<TranscriptionResult>;

    /// Human-readable backend name.
    fn name(&self) -> &str;
}
