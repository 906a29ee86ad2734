//! Configuration for the speech delivery pipeline
//!
//! Configuration is read from environment variables (a `.env` file is loaded
//! by the binary at startup) and may be overridden by a YAML file.
//! Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Environment variables
//! | Variable | Default |
//! |---|---|
//! | `SPEECH_BACKEND_URL` | unset (HD voice disabled) |
//! | `SPEECH_BACKEND_API_KEY` | unset |
//! | `SPEECH_SESSION_TOKEN` | unset |
//! | `SPEECH_DEFAULT_VOICE` | `nova` |
//! | `SPEECH_DEFAULT_LANGUAGE` | `en-US` |
//! | `SPEECH_PLATFORM` | `auto` |
//! | `SPEECH_CACHE_MAX_SIZE` | `50` |
//! | `SPEECH_THROTTLE_MIN_GAP_MS` | `500` |
//! | `SPEECH_RETRY_MAX_ATTEMPTS` | `3` |
//! | `SPEECH_RETRY_BASE_DELAY_MS` | `1000` |
//! | `SPEECH_RETRY_JITTER` | `0.3` |
//! | `SPEECH_VOICE_LOAD_TIMEOUT_MS` | `3000` |
//! | `SPEECH_UTTERANCE_TIMEOUT_MS` | `30000` |
//! | `SPEECH_REQUEST_TIMEOUT_MS` | `30000` |
//!
//! # Example
//! ```rust,no_run
//! use speech_delivery::config::SpeechConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SpeechConfig::from_env()?;
//! let config = SpeechConfig::from_file(Path::new("speech.yaml"))?;
//! println!("HD voice configured: {}", config.hd_configured());
//! # Ok(())
//! # }
//! ```

mod yaml;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub use yaml::YamlConfig;

use crate::core::cache::DEFAULT_CACHE_MAX_SIZE;
use crate::core::platform::PlatformSetting;
use crate::core::retry::{
    DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_JITTER, DEFAULT_RETRY_MAX_ATTEMPTS, RetryPolicy,
};
use crate::core::throttle::DEFAULT_THROTTLE_MIN_GAP_MS;
use crate::core::tts::network::parse_endpoint;
use crate::core::voice::{DEFAULT_LANGUAGE, HdVoice, VoiceConfig};
use crate::errors::{SpeechError, SpeechResult};

pub const DEFAULT_VOICE_LOAD_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_UTTERANCE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Speech pipeline configuration
#[derive(Clone)]
pub struct SpeechConfig {
    /// HD synthesis endpoint; `None` disables HD voice
    pub backend_url: Option<String>,
    /// Optional `apikey` header value for the backend gateway
    pub backend_api_key: Option<String>,
    /// Initial session bearer token
    pub session_token: Option<String>,

    pub default_voice: String,
    pub default_language: String,
    pub platform: PlatformSetting,

    pub cache_max_size: usize,
    pub throttle_min_gap_ms: u64,

    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_jitter: f64,

    pub voice_load_timeout_ms: u64,
    pub utterance_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            backend_api_key: None,
            session_token: None,
            default_voice: HdVoice::default().as_str().to_string(),
            default_language: DEFAULT_LANGUAGE.to_string(),
            platform: PlatformSetting::Auto,
            cache_max_size: DEFAULT_CACHE_MAX_SIZE,
            throttle_min_gap_ms: DEFAULT_THROTTLE_MIN_GAP_MS,
            retry_max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            retry_jitter: DEFAULT_RETRY_JITTER,
            voice_load_timeout_ms: DEFAULT_VOICE_LOAD_TIMEOUT_MS,
            utterance_timeout_ms: DEFAULT_UTTERANCE_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl std::fmt::Debug for SpeechConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechConfig")
            .field("backend_url", &self.backend_url)
            .field("backend_api_key", &self.backend_api_key.as_ref().map(|_| "***"))
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .field("default_voice", &self.default_voice)
            .field("default_language", &self.default_language)
            .field("platform", &self.platform)
            .field("cache_max_size", &self.cache_max_size)
            .field("throttle_min_gap_ms", &self.throttle_min_gap_ms)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("retry_jitter", &self.retry_jitter)
            .field("voice_load_timeout_ms", &self.voice_load_timeout_ms)
            .field("utterance_timeout_ms", &self.utterance_timeout_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

/// Zeroize secrets when the configuration is dropped.
impl Drop for SpeechConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.backend_api_key {
            key.zeroize();
        }
        if let Some(ref mut token) = self.session_token {
            token.zeroize();
        }
    }
}

impl SpeechConfig {
    /// Load configuration from environment variables, then validate.
    pub fn from_env() -> SpeechResult<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load environment configuration, apply YAML overrides, then validate.
    pub fn from_file(path: &Path) -> SpeechResult<Self> {
        let yaml = YamlConfig::from_file(path)?;
        let mut config = Self::default();
        config.apply_env()?;
        config.apply_yaml(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> SpeechResult<()> {
        if let Some(url) = env_string("SPEECH_BACKEND_URL") {
            self.backend_url = Some(url);
        }
        if let Some(key) = env_string("SPEECH_BACKEND_API_KEY") {
            self.backend_api_key = Some(key);
        }
        if let Some(token) = env_string("SPEECH_SESSION_TOKEN") {
            self.session_token = Some(token);
        }
        if let Some(voice) = env_string("SPEECH_DEFAULT_VOICE") {
            self.default_voice = voice;
        }
        if let Some(language) = env_string("SPEECH_DEFAULT_LANGUAGE") {
            self.default_language = language;
        }
        if let Some(platform) = env_parse::<PlatformSetting>("SPEECH_PLATFORM")? {
            self.platform = platform;
        }
        if let Some(size) = env_parse("SPEECH_CACHE_MAX_SIZE")? {
            self.cache_max_size = size;
        }
        if let Some(gap) = env_parse("SPEECH_THROTTLE_MIN_GAP_MS")? {
            self.throttle_min_gap_ms = gap;
        }
        if let Some(attempts) = env_parse("SPEECH_RETRY_MAX_ATTEMPTS")? {
            self.retry_max_attempts = attempts;
        }
        if let Some(delay) = env_parse("SPEECH_RETRY_BASE_DELAY_MS")? {
            self.retry_base_delay_ms = delay;
        }
        if let Some(jitter) = env_parse("SPEECH_RETRY_JITTER")? {
            self.retry_jitter = jitter;
        }
        if let Some(timeout) = env_parse("SPEECH_VOICE_LOAD_TIMEOUT_MS")? {
            self.voice_load_timeout_ms = timeout;
        }
        if let Some(timeout) = env_parse("SPEECH_UTTERANCE_TIMEOUT_MS")? {
            self.utterance_timeout_ms = timeout;
        }
        if let Some(timeout) = env_parse("SPEECH_REQUEST_TIMEOUT_MS")? {
            self.request_timeout_ms = timeout;
        }
        Ok(())
    }

    fn apply_yaml(&mut self, yaml: YamlConfig) -> SpeechResult<()> {
        if let Some(backend) = yaml.backend {
            if let Some(url) = backend.url {
                self.backend_url = Some(url);
            }
            if let Some(key) = backend.api_key {
                self.backend_api_key = Some(key);
            }
            if let Some(timeout) = backend.request_timeout_ms {
                self.request_timeout_ms = timeout;
            }
        }
        if let Some(token) = yaml.session.and_then(|s| s.token) {
            self.session_token = Some(token);
        }
        if let Some(voice) = yaml.voice {
            if let Some(default) = voice.default {
                self.default_voice = default;
            }
            if let Some(language) = voice.language {
                self.default_language = language;
            }
            if let Some(platform) = voice.platform {
                self.platform = platform.parse()?;
            }
        }
        if let Some(size) = yaml.cache.and_then(|c| c.max_size) {
            self.cache_max_size = size;
        }
        if let Some(gap) = yaml.throttle.and_then(|t| t.min_gap_ms) {
            self.throttle_min_gap_ms = gap;
        }
        if let Some(retry) = yaml.retry {
            if let Some(attempts) = retry.max_attempts {
                self.retry_max_attempts = attempts;
            }
            if let Some(delay) = retry.base_delay_ms {
                self.retry_base_delay_ms = delay;
            }
            if let Some(jitter) = retry.jitter {
                self.retry_jitter = jitter;
            }
        }
        if let Some(local) = yaml.local {
            if let Some(timeout) = local.voice_load_timeout_ms {
                self.voice_load_timeout_ms = timeout;
            }
            if let Some(timeout) = local.utterance_timeout_ms {
                self.utterance_timeout_ms = timeout;
            }
        }
        Ok(())
    }

    /// Check bounds and the backend URL.
    pub fn validate(&self) -> SpeechResult<()> {
        if let Some(url) = &self.backend_url {
            parse_endpoint(url)?;
        }
        if self.default_voice.trim().is_empty() {
            return Err(invalid("default voice must not be empty"));
        }
        if self.cache_max_size == 0 {
            return Err(invalid("cache max size must be at least 1"));
        }
        if self.retry_max_attempts == 0 {
            return Err(invalid("retry max attempts must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.retry_jitter) {
            return Err(invalid("retry jitter must be between 0.0 and 1.0"));
        }
        for (name, value) in [
            ("voice load timeout", self.voice_load_timeout_ms),
            ("utterance timeout", self.utterance_timeout_ms),
            ("request timeout", self.request_timeout_ms),
        ] {
            if value == 0 {
                return Err(invalid(&format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }

    /// Whether an HD backend endpoint is configured.
    pub fn hd_configured(&self) -> bool {
        self.backend_url.is_some()
    }

    pub fn default_voice_config(&self) -> VoiceConfig {
        VoiceConfig::new(self.default_voice.clone()).with_language(self.default_language.clone())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            self.retry_jitter,
        )
    }

    pub fn throttle_min_gap(&self) -> Duration {
        Duration::from_millis(self.throttle_min_gap_ms)
    }

    pub fn voice_load_timeout(&self) -> Duration {
        Duration::from_millis(self.voice_load_timeout_ms)
    }

    pub fn utterance_timeout(&self) -> Duration {
        Duration::from_millis(self.utterance_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn invalid(message: &str) -> SpeechError {
    SpeechError::InvalidConfiguration(message.to_string())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &str) -> SpeechResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_string(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| invalid(&format!("{key}='{raw}' is invalid: {e}")))
        })
        .transpose()
}
