use std::io::Cursor;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

/// Sample rate assumed for raw PCM chunks that do not declare one.
pub const DEFAULT_PCM_SAMPLE_RATE: u32 = 16_000;

/// Container/encoding declared by the client for an audio chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// Headerless signed 16-bit little-endian mono.
    #[serde(alias = "raw", alias = "pcm16")]
    Pcm,
    Wav,
    #[default]
    Webm,
    Ogg,
    Mp3,
    Flac,
    #[serde(other)]
    Unknown,
}

impl AudioFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Pcm => "audio/L16",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Webm => "audio/webm",
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Unknown => "application/octet-stream",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            AudioFormat::Pcm => "pcm",
            AudioFormat::Wav => "wav",
            AudioFormat::Webm => "webm",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Flac => "flac",
            AudioFormat::Unknown => "bin",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("invalid base64 audio payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("empty audio payload")]
    Empty,
    #[error("raw PCM length {0} is not a whole number of 16-bit samples")]
    MisalignedPcm(usize),
    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),
}

/// Decoded audio ready for an engine. Always self-describing: raw PCM has
/// already been wrapped into WAV.
#[derive(Debug, Clone)]
pub struct AudioInput {
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
}

/// Decodes a base64 chunk (a `data:` URL prefix is tolerated) and wraps raw
/// PCM into a single-channel 16-bit WAV container.
pub fn decode_chunk(
    encoded: &str,
    format: AudioFormat,
    sample_rate: Option<u32>,
) -> Result<AudioInput, AudioError> {
    let payload = strip_data_url(encoded.trim());
    let bytes = BASE64.decode(payload)?;
    if bytes.is_empty() {
        return Err(AudioError::Empty);
    }

    if format == AudioFormat::Pcm {
        let wav = wrap_pcm_s16le(&bytes, sample_rate.unwrap_or(DEFAULT_PCM_SAMPLE_RATE))?;
        return Ok(AudioInput {
            bytes: wav,
            format: AudioFormat::Wav,
        });
    }

    Ok(AudioInput { bytes, format })
}

/// Writes signed 16-bit little-endian mono samples into an in-memory WAV file.
pub fn wrap_pcm_s16le(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    if pcm.len() % 2 != 0 {
        return Err(AudioError::MisalignedPcm(pcm.len()));
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + pcm.len()));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for frame in pcm.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([frame[0], frame[1]]))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

fn strip_data_url(s: &str) -> &str {
    if s.starts_with("data:")
        && let Some(idx) = s.find(";base64,")
    {
        return &s[idx + ";base64,".len()..];
    }
    s
}
