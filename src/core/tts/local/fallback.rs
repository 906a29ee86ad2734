//! Local (on-device) synthesis used when HD voice is unavailable.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::engine::{LocalSpeechEngine, LocalVoice, Utterance};
use crate::core::generation::GenerationToken;
use crate::core::voice::{VoiceConfig, normalize_text};
use crate::errors::{SpeechError, SpeechResult};

pub const DEFAULT_VOICE_LOAD_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_UTTERANCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Name fragments of voices that sound friendly to young listeners.
const PREFERRED_VOICE_HINTS: &[&str] = &[
    "samantha", "karen", "victoria", "zira", "susan", "moira", "tessa", "fiona", "female",
    "google us english", "child",
];

/// Drives a [`LocalSpeechEngine`] for one utterance at a time.
pub struct LocalSynthesisFallback {
    engine: Option<Arc<dyn LocalSpeechEngine>>,
    voice_load_timeout: Duration,
    utterance_timeout: Duration,
    warmed_up: AtomicBool,
}

impl std::fmt::Debug for LocalSynthesisFallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSynthesisFallback")
            .field("supported", &self.engine.is_some())
            .field("voice_load_timeout", &self.voice_load_timeout)
            .field("utterance_timeout", &self.utterance_timeout)
            .finish()
    }
}

impl LocalSynthesisFallback {
    /// Wrap an engine (or `None` on platforms without one) and start
    /// loading its voice catalog.
    pub fn new(
        engine: Option<Arc<dyn LocalSpeechEngine>>,
        voice_load_timeout: Duration,
        utterance_timeout: Duration,
    ) -> Self {
        if let Some(engine) = &engine {
            engine.load_voices();
        }
        Self {
            engine,
            voice_load_timeout,
            utterance_timeout,
            warmed_up: AtomicBool::new(false),
        }
    }

    pub fn unsupported() -> Self {
        Self::new(None, DEFAULT_VOICE_LOAD_TIMEOUT, DEFAULT_UTTERANCE_TIMEOUT)
    }

    #[inline]
    pub fn is_supported(&self) -> bool {
        self.engine.is_some()
    }

    pub fn voices(&self) -> Vec<LocalVoice> {
        self.engine.as_ref().map(|e| e.voices()).unwrap_or_default()
    }

    pub fn cancel(&self) {
        if let Some(engine) = &self.engine {
            engine.cancel();
        }
    }

    pub fn pause(&self) {
        if let Some(engine) = &self.engine {
            engine.pause();
        }
    }

    pub fn resume(&self) {
        if let Some(engine) = &self.engine {
            engine.resume();
        }
    }

    /// Speak `text` and wait for it to finish.
    ///
    /// `warm_up` is enqueued ahead of the real utterance on the first
    /// invocation if the voice catalog is still empty.
    pub async fn speak(
        &self,
        text: &str,
        config: &VoiceConfig,
        token: &GenerationToken,
        warm_up: Option<Utterance>,
    ) -> SpeechResult<()> {
        let engine = self.engine.as_ref().ok_or(SpeechError::UnsupportedPlatform)?;
        token.ensure_current()?;

        let voices = self.wait_for_voices(engine.as_ref()).await;
        token.ensure_current()?;

        let mut utterance = Utterance::new(normalize_text(text), config.language.clone());
        utterance.rate = config.clamped_rate();
        utterance.voice_id = select_voice(&voices, &config.language).map(|v| v.id.clone());

        let first_invocation = !self.warmed_up.swap(true, Ordering::SeqCst);
        match warm_up {
            Some(warm_up) if first_invocation && voices.is_empty() => {
                debug!("Priming local speech engine with warm-up utterance");
                // Completion of the warm-up is irrelevant
                drop(engine.enqueue(warm_up));
            }
            _ => engine.cancel(),
        }

        info!(
            voice = utterance.voice_id.as_deref().unwrap_or("default"),
            text_len = utterance.text.len(),
            "Speaking with local synthesis"
        );
        let handle = engine.enqueue(utterance);

        match tokio::time::timeout(self.utterance_timeout, handle).await {
            Ok(Ok(result)) => {
                token.ensure_current()?;
                result
            }
            Ok(Err(_)) => {
                token.ensure_current()?;
                Err(SpeechError::Failed(
                    "Local utterance ended without a completion signal".to_string(),
                ))
            }
            Err(_) => {
                token.ensure_current()?;
                warn!(
                    timeout_ms = self.utterance_timeout.as_millis() as u64,
                    "Local utterance timed out"
                );
                engine.cancel();
                Err(SpeechError::Timeout(format!(
                    "Local speech did not finish within {}s",
                    self.utterance_timeout.as_secs()
                )))
            }
        }
    }

    /// Wait up to the load timeout for a non-empty voice catalog.
    async fn wait_for_voices(&self, engine: &dyn LocalSpeechEngine) -> Vec<LocalVoice> {
        let voices = engine.voices();
        if !voices.is_empty() {
            return voices;
        }

        let deadline = Instant::now() + self.voice_load_timeout;
        loop {
            match tokio::time::timeout_at(deadline, engine.voices_changed()).await {
                Ok(()) => {
                    let voices = engine.voices();
                    if !voices.is_empty() {
                        debug!(count = voices.len(), "Local voice catalog loaded");
                        return voices;
                    }
                }
                Err(_) => {
                    debug!("Local voices not loaded in time, using engine default");
                    return engine.voices();
                }
            }
        }
    }
}

/// Pick the preferred voice for `language`.
///
/// Order: hinted voice in the language, hinted voice in any language, any
/// voice in the language, the engine default.
pub fn select_voice<'a>(voices: &'a [LocalVoice], language: &str) -> Option<&'a LocalVoice> {
    let hinted = |v: &&LocalVoice| {
        let name = v.name.to_lowercase();
        PREFERRED_VOICE_HINTS.iter().any(|hint| name.contains(hint))
    };

    voices
        .iter()
        .filter(|v| v.matches_language(language))
        .find(hinted)
        .or_else(|| voices.iter().find(hinted))
        .or_else(|| {
            let mut in_language = voices.iter().filter(|v| v.matches_language(language));
            let first = in_language.clone().next();
            in_language.find(|v| v.is_default).or(first)
        })
        .or_else(|| voices.iter().find(|v| v.is_default))
}
