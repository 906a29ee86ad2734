//! Voice configuration and the cache key model.
//!
//! A [`VoiceConfig`] combined with the text to speak forms a [`CacheKey`].
//! The key is used both by the audio cache and by the pending-request
//! deduplicator, so two requests that would produce identical audio always
//! share one network call and one cache entry.

mod catalog;

pub use catalog::{HdVoice, VoiceDescriptor};

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_128;

/// Default language tag for voice configurations.
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Speaking rate bounds accepted by the synthesis backend.
pub const MIN_SPEAKING_RATE: f32 = 0.25;
pub const MAX_SPEAKING_RATE: f32 = 4.0;

// =============================================================================
// Voice Configuration
// =============================================================================

/// Immutable voice configuration for a speak request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    /// Voice identifier understood by the HD backend (e.g. `"nova"`)
    pub voice: String,
    /// Speaking rate multiplier (1.0 = normal)
    pub rate: f32,
    /// Optional tone / pitch instructions forwarded to the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// BCP-47 language tag, also used for local voice selection
    pub language: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice: HdVoice::default().as_str().to_string(),
            rate: 1.0,
            instructions: None,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl VoiceConfig {
    /// Create a configuration for a voice with default rate and language.
    pub fn new(voice: impl Into<String>) -> Self {
        Self {
            voice: voice.into(),
            ..Default::default()
        }
    }

    /// Builder-style rate setter.
    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = rate;
        self
    }

    /// Builder-style instructions setter.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Builder-style language setter.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Rate clamped to the range the backend accepts.
    #[inline]
    pub fn clamped_rate(&self) -> f32 {
        if self.rate.is_finite() {
            self.rate.clamp(MIN_SPEAKING_RATE, MAX_SPEAKING_RATE)
        } else {
            1.0
        }
    }
}

// =============================================================================
// Voice Selection Mode
// =============================================================================

/// Which synthesis path a request may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoiceSelectionMode {
    /// HD backend only; failures surface to the caller
    NetworkOnly,
    /// On-device synthesis only; the network is never touched
    LocalOnly,
    /// HD backend with unconditional fallback to on-device synthesis
    #[default]
    Auto,
}

impl VoiceSelectionMode {
    /// Convert to the canonical string value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkOnly => "network-only",
            Self::LocalOnly => "local-only",
            Self::Auto => "auto",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "network-only" | "network_only" | "network" | "hd" => Self::NetworkOnly,
            "local-only" | "local_only" | "local" | "browser" => Self::LocalOnly,
            _ => Self::default(),
        }
    }

    /// Whether the network path may be attempted.
    #[inline]
    pub fn uses_network(&self) -> bool {
        !matches!(self, Self::LocalOnly)
    }

    /// Whether a network failure may fall back to local synthesis.
    #[inline]
    pub fn allows_local_fallback(&self) -> bool {
        !matches!(self, Self::NetworkOnly)
    }
}

impl std::fmt::Display for VoiceSelectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Cache Key
// =============================================================================

/// Stable hash of (normalized text, voice configuration).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Compute the key for a text/config pair.
    pub fn new(text: &str, config: &VoiceConfig) -> Self {
        let mut s = String::with_capacity(text.len() + 64);
        s.push_str(&normalize_text(text));
        s.push('|');
        s.push_str(&config.voice.to_lowercase());
        s.push('|');
        s.push_str(&format!("{:.3}", config.clamped_rate()));
        s.push('|');
        if let Some(ref instructions) = config.instructions {
            s.push_str(instructions.trim());
        }
        s.push('|');
        s.push_str(&config.language.to_lowercase());
        let hash = xxh3_128(s.as_bytes());
        Self(format!("{hash:032x}"))
    }

    /// The key as a hex string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim and collapse whitespace runs to a single space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
