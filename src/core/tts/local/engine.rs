//! Platform speech capability abstraction.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::errors::SpeechResult;

/// A voice installed on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalVoice {
    pub id: String,
    pub name: String,
    /// BCP-47 tag as reported by the platform (e.g. `en-GB`, `en_US`)
    pub lang: String,
    pub is_default: bool,
}

impl LocalVoice {
    pub fn new(id: impl Into<String>, name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lang: lang.into(),
            is_default: false,
        }
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Whether the voice's primary language subtag matches `language`.
    pub fn matches_language(&self, language: &str) -> bool {
        primary_subtag(&self.lang).eq_ignore_ascii_case(primary_subtag(language))
    }
}

fn primary_subtag(tag: &str) -> &str {
    tag.split(['-', '_']).next().unwrap_or(tag)
}

/// One queued utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    /// Voice id from [`LocalSpeechEngine::voices`]; `None` = engine default
    pub voice_id: Option<String>,
    pub language: String,
    pub rate: f32,
    /// 0.0 ..= 1.0
    pub volume: f32,
}

impl Utterance {
    pub fn new(text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice_id: None,
            language: language.into(),
            rate: 1.0,
            volume: 1.0,
        }
    }
}

/// Completion signal for an enqueued utterance.
pub type UtteranceHandle = oneshot::Receiver<SpeechResult<()>>;

/// On-device speech synthesis (the platform's built-in engine).
///
/// Utterances play in FIFO order. `enqueue` returns immediately; the handle
/// resolves when the utterance finishes, errors or is cancelled. A cancelled
/// utterance may resolve with an error or have its sender dropped.
#[async_trait]
pub trait LocalSpeechEngine: Send + Sync {
    /// Voices known right now (may be empty while the catalog loads).
    fn voices(&self) -> Vec<LocalVoice>;

    /// Ask the platform to start loading its voice catalog.
    fn load_voices(&self) {}

    /// Resolves the next time the voice catalog changes.
    async fn voices_changed(&self);

    fn enqueue(&self, utterance: Utterance) -> UtteranceHandle;

    /// Drop every queued and speaking utterance.
    fn cancel(&self);

    fn pause(&self);

    fn resume(&self);

    fn is_speaking(&self) -> bool {
        false
    }
}
