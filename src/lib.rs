//! Lector - reads printed text aloud from a photo
//!
//! One capture flows through a strictly linear pipeline:
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌─────────────┐   ┌───────────────┐
//! │ Capture  │──▶│ Recognition │──▶│  Synthesis  │──▶│ Decode + Play │
//! │ (image)  │   │  (Gemini)   │   │ (TTS, opt.) │   │   (cpal)      │
//! └──────────┘   └──────┬──────┘   └──────┬──────┘   └───────┬───────┘
//!                       │ no text         │ no audio         │ failure
//!                       ▼                 ▼                  ▼
//!                ┌─────────────────────────────────────────────────┐
//!                │      Local speech announcer (say / espeak)      │
//!                └─────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod gemini;
pub mod language;
pub mod orchestrator;
pub mod recognition;
pub mod synthesis;

pub use capture::ImageCapture;
pub use config::Config;
pub use error::{Error, FailureKind, Result};
pub use language::{LanguageProfile, LanguageTable};
pub use orchestrator::{FallbackReason, Orchestrator, Outcome, SessionSnapshot, Stage};
pub use recognition::{RecognitionResult, TextRecognizer};
pub use synthesis::SpeechSynthesizer;
