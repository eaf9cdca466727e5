
#[cfg(test)]
mod call_room_tests;
#[cfg(test)]
mod transcription_tests;
