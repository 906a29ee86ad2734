//! Speech synthesis sources.
//!
//! - [`network`]: the HD voice backend over HTTP
//! - [`local`]: the platform's built-in engine, used as a fallback

pub mod local;
pub mod network;

pub use local::{LocalSpeechEngine, LocalSynthesisFallback, LocalVoice, Utterance};
pub use network::{
    HttpSpeechBackend, NetworkSynthesisClient, SessionProvider, SpeechBackend,
    StaticSessionProvider,
};
