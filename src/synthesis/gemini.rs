//! Direct Gemini TTS model call

use async_trait::async_trait;

use super::SpeechSynthesizer;
use crate::Result;
use crate::audio::SAMPLE_RATE;
use crate::gemini::{Content, GeminiClient, GenerateRequest, GenerationConfig, Part, SpeechConfig};
use crate::language::LanguageProfile;

/// Synthesizes speech with a Gemini TTS model
pub struct GeminiSynthesizer {
    gemini: GeminiClient,
    model: String,
}

impl GeminiSynthesizer {
    #[must_use]
    pub const fn new(gemini: GeminiClient, model: String) -> Self {
        Self { gemini, model }
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiSynthesizer {
    async fn synthesize(&self, text: &str, language: &LanguageProfile) -> Result<Option<String>> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part::Text { text }],
            }],
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["AUDIO"],
                speech_config: Some(SpeechConfig::prebuilt(&language.voice)),
                ..GenerationConfig::default()
            }),
        };

        tracing::debug!(
            model = %self.model,
            voice = %language.voice,
            chars = text.chars().count(),
            "starting Gemini synthesis"
        );

        let response = self.gemini.generate(&self.model, &request).await?;

        let Some(inline) = response.inline_data().filter(|d| !d.data.is_empty()) else {
            tracing::warn!("Gemini returned no inline audio");
            return Ok(None);
        };

        if let Some(rate) = declared_rate(&inline.mime_type) {
            if rate != SAMPLE_RATE {
                tracing::warn!(rate, mime_type = %inline.mime_type, "unexpected audio sample rate");
            }
        }

        tracing::info!(payload_chars = inline.data.len(), "speech synthesized");
        Ok(Some(inline.data.clone()))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// Sample rate from a MIME type like `audio/L16;codec=pcm;rate=24000`
fn declared_rate(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.trim().parse().ok())
}
