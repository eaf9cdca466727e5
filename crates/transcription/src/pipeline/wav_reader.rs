use std::io::Cursor;

use rubato::{
    Async as AsyncResampler, FixedAsync, Resampler as RubatoResampler,
    SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use audioadapter_buffers::direct::InterleavedSlice;

const TARGET_RATE: u32 = 16_000;

/// Decodes an in-memory WAV file into f32 mono samples at 16kHz.
///
/// Integer and float sample formats are accepted; multi-channel audio is
/// down-mixed by averaging.
pub fn decode_wav_16k_mono(bytes: &[u8]) -> anyhow::Result<Vec<f32>> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| anyhow::anyhow!("Invalid WAV data: {}", e))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
    };

    let mono: Vec<f32> = if channels > 1 {
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        samples
    };

    if spec.sample_rate == TARGET_RATE {
        Ok(mono)
    } else {
        resample_to_16k(&mono, spec.sample_rate)
    }
}

/// Resamples mono audio from `src_rate` Hz to 16kHz using sinc interpolation.
fn resample_to_16k(audio: &[f32], src_rate: u32) -> anyhow::Result<Vec<f32>> {
    let ratio = TARGET_RATE as f64 / src_rate as f64;
    let chunk_size = 1024;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = AsyncResampler::<f32>::new_sinc(
        ratio,
        2.0,
        &params,
        chunk_size,
        1, // mono
        FixedAsync::Input,
    )
    .map_err(|e| anyhow::anyhow!("Failed to create resampler: {}", e))?;

    let mut output = Vec::with_capacity((audio.len() as f64 * ratio) as usize + 1024);

    for chunk in audio.chunks(chunk_size) {
        let input = if chunk.len() < chunk_size {
            let mut padded = chunk.to_vec();
            padded.resize(chunk_size, 0.0);
            padded
        } else {
            chunk.to_vec()
        };

        let frames = input.len();
        let input_adapter = InterleavedSlice::new(&input, 1, frames)
            .map_err(|e| anyhow::anyhow!("Input adapter error: {}", e))?;

        let result = resampler
            .process(&input_adapter, 0, None)
            .map_err(|e| anyhow::anyhow!("Resample error: {}", e))?;

        output.extend(result.take_data());
    }

    // Trim to expected length (remove zero-padding artifacts)
    let expected_len = (audio.len() as f64 * ratio) as usize;
    output.truncate(expected_len);

    Ok(output)
}
