pub mod cache;
pub mod generation;
pub mod pending;
pub mod platform;
pub mod playback;
pub mod retry;
pub mod speech_manager;
pub mod throttle;
pub mod tts;
pub mod voice;

// Re-export commonly used types for convenience
pub use cache::{AudioCache, AudioResource, CacheStats};
pub use generation::{GenerationCounter, GenerationToken};
pub use platform::{Platform, PlatformSetting};
pub use playback::{
    AudioElement, AudioOutput, AudioUnlocker, FileAudioOutput, PlaybackController, PlaybackState,
};
pub use retry::RetryPolicy;
pub use speech_manager::{AvailabilityReport, SpeakOutcome, SpeechManager, SpeechManagerBuilder};
pub use tts::{
    HttpSpeechBackend, LocalSpeechEngine, LocalVoice, SessionProvider, SpeechBackend,
    StaticSessionProvider, Utterance,
};
pub use voice::{CacheKey, HdVoice, VoiceConfig, VoiceDescriptor, VoiceSelectionMode};
