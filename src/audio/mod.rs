//! Audio output
//!
//! Decodes synthesized speech, plays it, and falls back to local speech
//! synthesis when there is nothing to play.

mod announcer;
mod decoder;
mod playback;

pub use announcer::{DEFAULT_RATE, SilentAnnouncer, SpeechAnnouncer, SpeechBackend, SystemAnnouncer};
pub use decoder::{CHANNELS, PcmBuffer, SAMPLE_RATE, decode_pcm16, pcm16_to_buffer};
pub use playback::{AudioOutput, AudioPlayback, OutputInfo};
