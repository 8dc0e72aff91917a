//! Local speech synthesis fallback
//!
//! Speaks plain text through whatever speech command the host provides. Used
//! when no synthesized audio is available or it could not be played.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;

/// Default speaking rate relative to normal speed
pub const DEFAULT_RATE: f32 = 0.9;

/// Base words-per-minute for `say` and `espeak`
const BASE_WPM: f32 = 175.0;

/// Speaks text aloud without blocking the caller
///
/// Announcing is best effort: there is no error channel, a host without speech
/// support simply stays silent.
pub trait SpeechAnnouncer: Send + Sync {
    /// Stop any current utterance and start speaking `text`
    fn announce(&self, text: &str, locale: &str);
}

/// Host speech command family
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechBackend {
    /// macOS `say`
    Say(PathBuf),
    /// `espeak-ng` or `espeak`
    Espeak(PathBuf),
    /// speech-dispatcher client
    SpdSay(PathBuf),
    /// Windows `System.Speech` through PowerShell
    PowerShell(PathBuf),
    /// Unknown program; receives the text as its only argument
    Custom(PathBuf),
}

impl SpeechBackend {
    /// Find a speech command on this host
    #[must_use]
    pub fn detect() -> Option<Self> {
        let candidates: &[&str] = if cfg!(target_os = "macos") {
            &["say", "espeak-ng", "espeak"]
        } else if cfg!(target_os = "windows") {
            &["powershell", "pwsh"]
        } else {
            &["espeak-ng", "espeak", "spd-say"]
        };

        candidates
            .iter()
            .find_map(|bin| which::which(bin).ok())
            .map(|path| Self::from_program(&path))
    }

    /// Classify a program by its file name
    #[must_use]
    pub fn from_program(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_lowercase();

        let path = path.to_path_buf();
        match stem.as_str() {
            "say" => Self::Say(path),
            "espeak" | "espeak-ng" => Self::Espeak(path),
            "spd-say" => Self::SpdSay(path),
            "powershell" | "pwsh" => Self::PowerShell(path),
            _ => Self::Custom(path),
        }
    }

    fn program(&self) -> &Path {
        match self {
            Self::Say(p)
            | Self::Espeak(p)
            | Self::SpdSay(p)
            | Self::PowerShell(p)
            | Self::Custom(p) => p,
        }
    }

    /// Build the command that speaks `text`
    ///
    /// `PowerShell` reads the text from stdin; every other backend takes it
    /// as the final argument.
    #[must_use]
    pub fn command(&self, text: &str, locale: &str, rate: f32) -> Command {
        let mut command = Command::new(self.program());
        let text = guard_leading_dash(text);

        match self {
            Self::Say(_) => {
                command.arg("-r").arg(wpm(rate).to_string()).arg(text);
            }
            Self::Espeak(_) => {
                command
                    .arg("-s")
                    .arg(wpm(rate).to_string())
                    .arg("-v")
                    .arg(primary_language(locale))
                    .arg(text);
            }
            Self::SpdSay(_) => {
                command
                    .arg("-r")
                    .arg(relative_rate(rate, 100).to_string())
                    .arg("-l")
                    .arg(primary_language(locale))
                    .arg(text);
            }
            Self::PowerShell(_) => {
                let script = format!(
                    "Add-Type -AssemblyName System.Speech; \
                     $s = New-Object System.Speech.Synthesis.SpeechSynthesizer; \
                     $s.Rate = {}; $s.Speak([Console]::In.ReadToEnd())",
                    relative_rate(rate, 10)
                );
                command
                    .arg("-NoProfile")
                    .arg("-NonInteractive")
                    .arg("-Command")
                    .arg(script);
            }
            Self::Custom(_) => {
                command.arg(text);
            }
        }

        command
    }

    /// Command that silences speech the backend queued outside our child
    fn cancel_command(&self) -> Option<Command> {
        match self {
            Self::SpdSay(p) => {
                let mut command = Command::new(p);
                command.arg("-C");
                Some(command)
            }
            _ => None,
        }
    }
}

/// Announces through the host speech command
pub struct SystemAnnouncer {
    backend: Option<SpeechBackend>,
    rate: f32,
    current: Mutex<Option<Child>>,
}

impl SystemAnnouncer {
    /// Create an announcer using the detected host backend
    #[must_use]
    pub fn new(rate: f32) -> Self {
        let backend = SpeechBackend::detect();
        match &backend {
            Some(b) => tracing::debug!(backend = ?b, rate, "speech announcer ready"),
            None => tracing::warn!("no speech command found, announcements will be silent"),
        }
        Self::with_backend(backend, rate)
    }

    /// Create an announcer with an explicit backend
    #[must_use]
    pub fn with_backend(backend: Option<SpeechBackend>, rate: f32) -> Self {
        Self {
            backend,
            rate,
            current: Mutex::new(None),
        }
    }

    /// Create an announcer from an optional configured command
    #[must_use]
    pub fn from_config(command: Option<&str>, rate: f32) -> Self {
        match command {
            Some(cmd) if !cmd.trim().is_empty() => {
                let path = which::which(cmd.trim()).unwrap_or_else(|_| PathBuf::from(cmd.trim()));
                Self::with_backend(Some(SpeechBackend::from_program(&path)), rate)
            }
            _ => Self::new(rate),
        }
    }

    #[must_use]
    pub const fn backend(&self) -> Option<&SpeechBackend> {
        self.backend.as_ref()
    }

    #[must_use]
    pub const fn rate(&self) -> f32 {
        self.rate
    }

    /// Whether an utterance is still being spoken
    pub fn is_speaking(&self) -> bool {
        let Ok(mut current) = self.current.lock() else {
            return false;
        };
        current
            .as_mut()
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }

    /// Stop the current utterance, if any
    pub fn cancel(&self) {
        let Ok(mut current) = self.current.lock() else {
            return;
        };

        if let Some(mut child) = current.take() {
            if matches!(child.try_wait(), Ok(None)) {
                let _ = child.kill();
            }
            let _ = child.wait();
        }

        if let Some(mut cancel) = self.backend.as_ref().and_then(SpeechBackend::cancel_command) {
            let _ = cancel.stdout(Stdio::null()).stderr(Stdio::null()).status();
        }
    }

    fn spawn(&self, backend: &SpeechBackend, text: &str, locale: &str) -> std::io::Result<Child> {
        let mut command = backend.command(text, locale, self.rate);
        command.stdout(Stdio::null()).stderr(Stdio::null());

        if matches!(backend, SpeechBackend::PowerShell(_)) {
            command.stdin(Stdio::piped());
            let mut child = command.spawn()?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(text.as_bytes())?;
            }
            return Ok(child);
        }

        command.stdin(Stdio::null()).spawn()
    }
}

impl SpeechAnnouncer for SystemAnnouncer {
    fn announce(&self, text: &str, locale: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let Some(backend) = self.backend.as_ref() else {
            tracing::warn!(text, "no speech backend, announcement skipped");
            return;
        };

        self.cancel();

        match self.spawn(backend, text, locale) {
            Ok(child) => {
                tracing::debug!(locale, chars = text.chars().count(), "announcing");
                if let Ok(mut current) = self.current.lock() {
                    *current = Some(child);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, backend = ?backend, "failed to start speech command");
            }
        }
    }
}

impl Drop for SystemAnnouncer {
    fn drop(&mut self) {
        if let Ok(current) = self.current.get_mut() {
            if let Some(mut child) = current.take() {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

/// Announcer that only logs (headless deployments, tests)
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentAnnouncer;

impl SpeechAnnouncer for SilentAnnouncer {
    fn announce(&self, text: &str, locale: &str) {
        tracing::info!(locale, text, "announcement (silent)");
    }
}

/// Words per minute for `say` and `espeak`
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn wpm(rate: f32) -> u32 {
    (BASE_WPM * rate.clamp(0.1, 4.0)).round() as u32
}

/// Map a rate multiplier onto a symmetric `-scale..=scale` range
#[allow(clippy::cast_possible_truncation)]
fn relative_rate(rate: f32, scale: i32) -> i32 {
    #[allow(clippy::cast_precision_loss)]
    let value = ((rate - 1.0) * scale as f32).round() as i32;
    value.clamp(-scale, scale)
}

/// `fr-FR` → `fr`
fn primary_language(locale: &str) -> String {
    locale
        .split(['-', '_'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("en")
        .to_lowercase()
}

/// Keep text that starts with `-` from being parsed as an option
fn guard_leading_dash(text: &str) -> String {
    if text.starts_with('-') {
        format!(" {text}")
    } else {
        text.to_string()
    }
}
