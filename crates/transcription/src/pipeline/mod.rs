pub mod wav_reader;

pub use wav_reader::decode_wav_16k_mono;
