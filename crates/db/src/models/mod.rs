pub mod participant;
pub mod room;
pub mod transcription;

pub use participant::CallParticipant;
pub use room::Room;
pub use transcription::{TranscriptionChunk, TranscriptionSession};
