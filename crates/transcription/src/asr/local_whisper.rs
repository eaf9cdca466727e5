use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::{AsrBackend, AsrRequest, TranscriptionResult};
use crate::audio::AudioFormat;
use crate::pipeline::decode_wav_16k_mono;

fn whisper_lang_str(lang_id: i32) -> Option<String> {
    whisper_rs::get_lang_str(lang_id).map(|s| s.to_string())
}

/// In-process Whisper backend using whisper.cpp via whisper-rs.
///
/// Only accepts WAV input; compressed browser formats (webm/ogg) fail and
/// fall through to the next engine in the chain.
pub struct LocalWhisperBackend {
    ctx: Arc<WhisperContext>,
    default_language: Option<String>,
}

impl LocalWhisperBackend {
    /// Loads a GGML Whisper model (e.g. `ggml-base.bin`) from disk.
    pub fn new(model_path: &str, default_language: Option<String>) -> anyhow::Result<Self> {
        info!(model_path, "Loading Whisper model");
        let ctx = WhisperContext::new_with_params(model_path, WhisperContextParameters::default())
            .map_err(|e| anyhow::anyhow!("Failed to load Whisper model '{}': {}", model_path, e))?;
        info!("Whisper model loaded");
        Ok(Self {
            ctx: Arc::new(ctx),
            default_language,
        })
    }
}

#[async_trait]
impl AsrBackend for LocalWhisperBackend {
    async fn transcribe(&self, request: AsrRequest) -> anyhow::Result<TranscriptionResult> {
        if request.audio.format != AudioFormat::Wav {
            anyhow::bail!(
                "local whisper cannot decode {:?} audio",
                request.audio.format
            );
        }

        let audio = decode_wav_16k_mono(&request.audio.bytes)?;
        let lang = request
            .language_hint
            .or_else(|| self.default_language.clone());
        let ctx = Arc::clone(&self.ctx);

        // whisper.cpp is CPU-bound
        tokio::task::spawn_blocking(move || -> anyhow::Result<TranscriptionResult> {
            let mut state = ctx
                .create_state()
                .map_err(|e| anyhow::anyhow!("Failed to create Whisper state: {}", e))?;

            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            match lang.as_deref() {
                Some(l) => params.set_language(Some(l)),
                None => params.set_detect_language(true),
            }
            params.set_translate(false);
            params.set_print_progress(false);
            params.set_print_special(false);
            params.set_print_realtime(false);
            params.set_print_timestamps(false);
            params.set_single_segment(true);
            params.set_no_speech_thold(0.6);
            params.set_suppress_blank(true);

            state
                .full(params, &audio)
                .map_err(|e| anyhow::anyhow!("Whisper transcription failed: {}", e))?;

            let mut text = String::new();
            for i in 0..state.full_n_segments() {
                if let Some(segment) = state.get_segment(i)
                    && let Ok(seg_text) = segment.to_str()
                {
                    text.push_str(seg_text);
                }
            }
            let text = text.trim().to_string();
            let language = whisper_lang_str(state.full_lang_id_from_state()).or(lang);

            debug!(text_len = text.len(), ?language, "Whisper transcription complete");

            Ok(TranscriptionResult {
                text,
                language,
                confidence: None,
            })
        })
        .await
        .map_err(|e| anyhow::anyhow!("Whisper task join error: {}", e))?
    }

    fn name(&self) -> &str {
        "local_whisper"
    }
}
