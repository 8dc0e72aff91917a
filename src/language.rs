//! Language profiles
//!
//! Everything that varies by reading language lives here as data: the voice
//! used for synthesis, the locale for local speech, the hint passed to
//! recognition, and the messages spoken to the user.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Code used when a requested language is unknown
pub const DEFAULT_LANGUAGE: &str = "en";

/// Locale of [`DEFAULT_LANGUAGE`]
pub const DEFAULT_LOCALE: &str = "en-US";

/// Per-language configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LanguageProfile {
    /// Short code (e.g. "fr")
    pub code: String,

    /// Display name in the language itself
    pub name: String,

    /// BCP-47 locale for local speech and `languageCode`
    pub locale: String,

    /// Gemini prebuilt voice name
    pub voice: String,

    /// ElevenLabs voice id, overriding the server default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevenlabs_voice: Option<String>,

    /// Language hint given to recognition
    pub prompt_hint: String,

    /// Shown while an image is being read
    pub processing: String,

    /// Spoken when the image holds no text
    pub no_text: String,

    /// Spoken when recognition fails
    pub recognition_failed: String,

    /// Spoken on any other failure
    pub generic_error: String,

    /// Spoken when the reader is ready
    pub ready: String,
}

/// Partial profile from the config file; unset fields keep the built-in value
#[derive(Debug, Default, Clone, Deserialize)]
pub struct LanguageOverride {
    pub name: Option<String>,
    pub locale: Option<String>,
    pub voice: Option<String>,
    pub elevenlabs_voice: Option<String>,
    pub prompt_hint: Option<String>,
    pub processing: Option<String>,
    pub no_text: Option<String>,
    pub recognition_failed: Option<String>,
    pub generic_error: Option<String>,
    pub ready: Option<String>,
}

impl LanguageProfile {
    /// Apply a partial override, or build a new profile from one
    ///
    /// Fields missing from an override for a new language are taken from
    /// `base`.
    #[must_use]
    pub fn merged(code: &str, base: &Self, over: LanguageOverride) -> Self {
        Self {
            code: code.to_string(),
            name: over.name.unwrap_or_else(|| base.name.clone()),
            locale: over.locale.unwrap_or_else(|| base.locale.clone()),
            voice: over.voice.unwrap_or_else(|| base.voice.clone()),
            elevenlabs_voice: over.elevenlabs_voice.or_else(|| base.elevenlabs_voice.clone()),
            prompt_hint: over.prompt_hint.unwrap_or_else(|| base.prompt_hint.clone()),
            processing: over.processing.unwrap_or_else(|| base.processing.clone()),
            no_text: over.no_text.unwrap_or_else(|| base.no_text.clone()),
            recognition_failed: over
                .recognition_failed
                .unwrap_or_else(|| base.recognition_failed.clone()),
            generic_error: over
                .generic_error
                .unwrap_or_else(|| base.generic_error.clone()),
            ready: over.ready.unwrap_or_else(|| base.ready.clone()),
        }
    }
}

/// Lookup table of language profiles
#[derive(Debug, Clone)]
pub struct LanguageTable {
    profiles: BTreeMap<String, LanguageProfile>,
    /// Profile for [`DEFAULT_LANGUAGE`], answered for unknown codes
    default: LanguageProfile,
}

impl Default for LanguageTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl LanguageTable {
    /// Built-in languages: en, es, fr, de, hi
    #[must_use]
    pub fn builtin() -> Self {
        let default = english();
        let profiles = [default.clone(), spanish(), french(), german(), hindi()]
            .into_iter()
            .map(|p| (p.code.clone(), p))
            .collect();
        Self { profiles, default }
    }

    /// Built-ins with overrides and additions applied
    #[must_use]
    pub fn with_overrides(overrides: BTreeMap<String, LanguageOverride>) -> Self {
        let mut table = Self::builtin();
        for (code, over) in overrides {
            let code = code.to_lowercase();
            let base = table
                .profiles
                .get(&code)
                .cloned()
                .unwrap_or_else(|| table.default.clone());
            let merged = LanguageProfile::merged(&code, &base, over);
            if code == DEFAULT_LANGUAGE {
                table.default = merged.clone();
            }
            table.profiles.insert(code, merged);
        }
        table
    }

    /// Exact lookup
    #[must_use]
    pub fn get(&self, code: &str) -> Option<&LanguageProfile> {
        self.profiles.get(&code.to_lowercase())
    }

    /// Lookup that falls back to English for unknown codes
    #[must_use]
    pub fn resolve(&self, code: &str) -> &LanguageProfile {
        if let Some(profile) = self.get(code) {
            return profile;
        }

        // "fr-CA" → "fr"
        if let Some(profile) = code.split(['-', '_']).next().and_then(|p| self.get(p)) {
            return profile;
        }

        tracing::warn!(language = code, "unknown language, using {DEFAULT_LANGUAGE}");
        &self.default
    }

    /// All profiles, ordered by code
    pub fn iter(&self) -> impl Iterator<Item = &LanguageProfile> {
        self.profiles.values()
    }
}

#[allow(clippy::too_many_arguments)]
fn profile(
    code: &str,
    name: &str,
    locale: &str,
    voice: &str,
    prompt_hint: &str,
    processing: &str,
    no_text: &str,
    recognition_failed: &str,
    generic_error: &str,
    ready: &str,
) -> LanguageProfile {
    LanguageProfile {
        code: code.to_string(),
        name: name.to_string(),
        locale: locale.to_string(),
        voice: voice.to_string(),
        elevenlabs_voice: None,
        prompt_hint: prompt_hint.to_string(),
        processing: processing.to_string(),
        no_text: no_text.to_string(),
        recognition_failed: recognition_failed.to_string(),
        generic_error: generic_error.to_string(),
        ready: ready.to_string(),
    }
}

fn english() -> LanguageProfile {
    profile(
        DEFAULT_LANGUAGE,
        "English",
        DEFAULT_LOCALE,
        "Kore",
        "The text is most likely written in English.",
        "Reading the text, please wait.",
        "No text was found. Please try again with the text in view.",
        "Could not read the text. Please try again.",
        "Something went wrong. Please try again.",
        "Ready. Take a photo of some text.",
    )
}

fn spanish() -> LanguageProfile {
    profile(
        "es",
        "Español",
        "es-ES",
        "Puck",
        "The text is most likely written in Spanish.",
        "Leyendo el texto, por favor espere.",
        "No se encontró texto. Inténtelo de nuevo con el texto a la vista.",
        "No se pudo leer el texto. Inténtelo de nuevo.",
        "Algo salió mal. Inténtelo de nuevo.",
        "Listo. Tome una foto de un texto.",
    )
}

fn french() -> LanguageProfile {
    profile(
        "fr",
        "Français",
        "fr-FR",
        "Aoede",
        "The text is most likely written in French.",
        "Lecture du texte, veuillez patienter.",
        "Aucun texte trouvé. Réessayez avec le texte bien visible.",
        "Impossible de lire le texte. Veuillez réessayer.",
        "Une erreur est survenue. Veuillez réessayer.",
        "Prêt. Prenez une photo d'un texte.",
    )
}

fn german() -> LanguageProfile {
    profile(
        "de",
        "Deutsch",
        "de-DE",
        "Charon",
        "The text is most likely written in German.",
        "Der Text wird gelesen, bitte warten.",
        "Kein Text gefunden. Bitte versuchen Sie es erneut.",
        "Der Text konnte nicht gelesen werden. Bitte erneut versuchen.",
        "Etwas ist schiefgelaufen. Bitte erneut versuchen.",
        "Bereit. Fotografieren Sie einen Text.",
    )
}

fn hindi() -> LanguageProfile {
    profile(
        "hi",
        "हिन्दी",
        "hi-IN",
        "Kore",
        "The text is most likely written in Hindi (Devanagari script).",
        "पाठ पढ़ा जा रहा है, कृपया प्रतीक्षा करें।",
        "कोई पाठ नहीं मिला। कृपया फिर से प्रयास करें।",
        "पाठ पढ़ा नहीं जा सका। कृपया फिर से प्रयास करें।",
        "कुछ गलत हो गया। कृपया फिर से प्रयास करें।",
        "तैयार। किसी पाठ की फ़ोटो लें।",
    )
}
