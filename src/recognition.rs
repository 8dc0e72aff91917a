//! Text recognition (OCR) through a multimodal model

use async_trait::async_trait;

use crate::capture::ImageCapture;
use crate::gemini::{Content, GeminiClient, GenerateRequest, GenerationConfig, InlineData, Part};

/// Reply the model gives when an image holds no legible text
pub const NO_TEXT_SENTINEL: &str = "NO_TEXT_FOUND";

/// Outcome of one recognition request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionResult {
    /// Extracted text, trimmed and non-empty
    Text(String),
    /// The image holds no legible text
    NoTextFound,
    /// The provider failed; the message is for logs
    ApiError(String),
}

impl RecognitionResult {
    /// Classify raw model output
    #[must_use]
    pub fn from_model_text(raw: &str) -> Self {
        let text = raw.trim();
        let bare = text.trim_matches(|c: char| !c.is_alphanumeric() && c != '_');

        if text.is_empty() || bare == NO_TEXT_SENTINEL {
            Self::NoTextFound
        } else {
            Self::Text(text.to_string())
        }
    }
}

/// Extracts text from images
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Read the text in `image`
    ///
    /// `language_hint` tells the model which language to expect.
    async fn recognize(&self, image: &ImageCapture, language_hint: &str) -> RecognitionResult;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Recognizer backed by Gemini `generateContent`
pub struct GeminiRecognizer {
    gemini: GeminiClient,
    model: String,
}

impl GeminiRecognizer {
    #[must_use]
    pub const fn new(gemini: GeminiClient, model: String) -> Self {
        Self { gemini, model }
    }
}

/// Instruction sent alongside the image
#[must_use]
pub fn recognition_prompt(language_hint: &str) -> String {
    format!(
        "Transcribe all of the text in this image exactly as written, in natural reading order. \
         {language_hint} \
         Reply with the transcribed text only, without commentary, translation or formatting. \
         If the image contains no legible text, reply with exactly {NO_TEXT_SENTINEL}."
    )
}

#[async_trait]
impl TextRecognizer for GeminiRecognizer {
    async fn recognize(&self, image: &ImageCapture, language_hint: &str) -> RecognitionResult {
        let prompt = recognition_prompt(language_hint);

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: image.mime_type().to_string(),
                            data: image.to_base64(),
                        },
                    },
                    Part::Text { text: &prompt },
                ],
            }],
            generation_config: Some(GenerationConfig {
                temperature: Some(0.0),
                ..GenerationConfig::default()
            }),
        };

        tracing::debug!(
            model = %self.model,
            image_bytes = image.bytes().len(),
            mime_type = image.mime_type(),
            "starting text recognition"
        );

        match self.gemini.generate(&self.model, &request).await {
            Ok(response) => {
                let result = RecognitionResult::from_model_text(&response.text());
                match &result {
                    RecognitionResult::Text(text) => {
                        tracing::info!(chars = text.chars().count(), "text recognized");
                    }
                    _ => tracing::info!("no text in image"),
                }
                result
            }
            Err(e) => {
                tracing::error!(error = %e, "recognition request failed");
                RecognitionResult::ApiError(e.to_string())
            }
        }
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
