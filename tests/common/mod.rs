//! Shared test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use lector::audio::{AudioOutput, PcmBuffer, SpeechAnnouncer};
use lector::{
    Error, ImageCapture, LanguageProfile, Orchestrator, RecognitionResult, Result,
    SpeechSynthesizer, TextRecognizer,
};

/// `[0.0, -1.0]` as base64 PCM16LE
pub const VALID_PAYLOAD: &str = "AAAAgA==";

/// Three bytes: odd length, not PCM16
pub const ODD_PAYLOAD: &str = "AAAA";

/// A small valid capture
#[must_use]
pub fn capture() -> ImageCapture {
    ImageCapture::new(vec![0xFF, 0xD8, 0xFF, 0xE0], "image/jpeg", 1024).expect("valid capture")
}

/// Recognizer returning a fixed result
pub struct FakeRecognizer {
    result: Mutex<RecognitionResult>,
    gate: Option<Arc<Notify>>,
    panics: bool,
    calls: AtomicUsize,
}

impl FakeRecognizer {
    pub fn returning(result: RecognitionResult) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(result),
            gate: None,
            panics: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn text(text: &str) -> Arc<Self> {
        Self::returning(RecognitionResult::Text(text.to_string()))
    }

    /// Blocks each call until `gate` is notified
    pub fn gated(text: &str, gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(RecognitionResult::Text(text.to_string())),
            gate: Some(gate),
            panics: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn panicking() -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(RecognitionResult::NoTextFound),
            gate: None,
            panics: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Change what later calls return
    pub fn set(&self, result: RecognitionResult) {
        *self.result.lock().unwrap() = result;
    }
}

#[async_trait]
impl TextRecognizer for FakeRecognizer {
    async fn recognize(&self, _image: &ImageCapture, _language_hint: &str) -> RecognitionResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        assert!(!self.panics, "recognizer exploded");
        self.result.lock().unwrap().clone()
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Synthesizer returning a fixed payload, or failing
pub struct FakeSynthesizer {
    payload: Option<String>,
    fails: bool,
    calls: AtomicUsize,
    languages: Mutex<Vec<String>>,
}

impl FakeSynthesizer {
    pub fn returning(payload: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            payload: payload.map(str::to_string),
            fails: false,
            calls: AtomicUsize::new(0),
            languages: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            payload: None,
            fails: true,
            calls: AtomicUsize::new(0),
            languages: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Language codes seen, in call order
    pub fn languages(&self) -> Vec<String> {
        self.languages.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, _text: &str, language: &LanguageProfile) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.languages.lock().unwrap().push(language.code.clone());
        if self.fails {
            return Err(Error::Provider {
                status: 500,
                body: "boom".to_string(),
            });
        }
        Ok(self.payload.clone())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Output that records buffers instead of playing them
#[derive(Default)]
pub struct RecordingOutput {
    played: Mutex<Vec<Vec<f32>>>,
    fails: bool,
}

impl RecordingOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            played: Mutex::new(Vec::new()),
            fails: true,
        })
    }

    pub fn played(&self) -> Vec<Vec<f32>> {
        self.played.lock().unwrap().clone()
    }
}

impl AudioOutput for RecordingOutput {
    fn play(&self, buffer: &PcmBuffer) -> Result<()> {
        if self.fails {
            return Err(Error::Playback("no output device available".to_string()));
        }
        self.played.lock().unwrap().push(buffer.samples().to_vec());
        Ok(())
    }
}

/// Announcer that records `(text, locale)` pairs
#[derive(Default)]
pub struct RecordingAnnouncer {
    spoken: Mutex<Vec<(String, String)>>,
}

impl RecordingAnnouncer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn spoken(&self) -> Vec<(String, String)> {
        self.spoken.lock().unwrap().clone()
    }

    /// Spoken texts without their locales
    pub fn texts(&self) -> Vec<String> {
        self.spoken().into_iter().map(|(text, _)| text).collect()
    }
}

impl SpeechAnnouncer for RecordingAnnouncer {
    fn announce(&self, text: &str, locale: &str) {
        self.spoken
            .lock()
            .unwrap()
            .push((text.to_string(), locale.to_string()));
    }
}

/// Orchestrator wired to fakes, with handles to inspect them
pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub recognizer: Arc<FakeRecognizer>,
    pub synthesizer: Arc<FakeSynthesizer>,
    pub output: Arc<RecordingOutput>,
    pub announcer: Arc<RecordingAnnouncer>,
}

impl Harness {
    pub fn new(
        recognizer: Arc<FakeRecognizer>,
        synthesizer: Arc<FakeSynthesizer>,
        output: Arc<RecordingOutput>,
    ) -> Self {
        let announcer = RecordingAnnouncer::new();
        let orchestrator = Arc::new(Orchestrator::new(
            recognizer.clone(),
            synthesizer.clone(),
            output.clone(),
            announcer.clone(),
        ));

        Self {
            orchestrator,
            recognizer,
            synthesizer,
            output,
            announcer,
        }
    }

    /// Recognizes `text` and synthesizes `payload`
    pub fn with(text: &str, payload: Option<&str>) -> Self {
        Self::new(
            FakeRecognizer::text(text),
            FakeSynthesizer::returning(payload),
            RecordingOutput::new(),
        )
    }
}
