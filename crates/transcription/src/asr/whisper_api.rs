use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use super::{AsrBackend, AsrRequest, TranscriptionResult};

/// Remote backend speaking the OpenAI-compatible
/// `POST /v1/audio/transcriptions` multipart API (OpenAI, Groq, faster-whisper
/// servers, ...).
pub struct WhisperApiBackend {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

impl WhisperApiBackend {
    pub fn new(endpoint: &str, api_key: Option<String>, model: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
            api_key,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl AsrBackend for WhisperApiBackend {
    async fn transcribe(&self, request: AsrRequest) -> anyhow::Result<TranscriptionResult> {
        let format = request.audio.format;
        let size = request.audio.bytes.len();

        let file_part = Part::bytes(request.audio.bytes)
            .file_name(format!("chunk.{}", format.file_extension()))
            .mime_str(format.mime_type())
            .map_err(|e| anyhow::anyhow!("Invalid MIME type: {e}"))?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "json");
        if let Some(lang) = request.language_hint {
            form = form.text("language", lang);
        }

        let mut req = self.client.post(&self.endpoint).multipart(form);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Transcription request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Transcription API error ({status}): {body}");
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Malformed transcription response: {e}"))?;

        debug!(bytes = size, text_len = parsed.text.len(), "Whisper API transcription complete");

        Ok(TranscriptionResult {
            text: parsed.text.trim().to_string(),
            language: parsed.language,
            confidence: None,
        })
    }

    fn name(&self) -> &str {
        "whisper_api"
    }
}
