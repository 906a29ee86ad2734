//! On-device speech synthesis fallback.

mod engine;
mod fallback;

pub use engine::{LocalSpeechEngine, LocalVoice, Utterance, UtteranceHandle};
pub use fallback::{
    DEFAULT_UTTERANCE_TIMEOUT, DEFAULT_VOICE_LOAD_TIMEOUT, LocalSynthesisFallback, select_voice,
};
