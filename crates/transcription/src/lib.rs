pub mod asr;
pub mod audio;
pub mod chain;
pub mod pipeline;

pub use asr::{AsrBackend, AsrRequest, TranscriptionResult};
pub use audio::{AudioError, AudioFormat, AudioInput, decode_chunk};
pub use chain::{ChainOutcome, EngineChain};
