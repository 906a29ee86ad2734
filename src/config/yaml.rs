use serde::Deserialize;
use std::path::Path;

use crate::errors::{SpeechError, SpeechResult};

/// Complete YAML configuration structure
///
/// Every field is optional; values present here override the environment.
///
/// # Example YAML structure
/// ```yaml
/// backend:
///   url: "https://api.example.com/functions/v1/text-to-speech"
///   api_key: "public-anon-key"
///   request_timeout_ms: 30000
///
/// session:
///   token: "user-access-token"
///
/// voice:
///   default: "nova"
///   language: "en-US"
///   platform: "mobile"
///
/// cache:
///   max_size: 50
///
/// throttle:
///   min_gap_ms: 500
///
/// retry:
///   max_attempts: 3
///   base_delay_ms: 1000
///   jitter: 0.3
///
/// local:
///   voice_load_timeout_ms: 3000
///   utterance_timeout_ms: 30000
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub backend: Option<BackendYaml>,
    pub session: Option<SessionYaml>,
    pub voice: Option<VoiceYaml>,
    pub cache: Option<CacheYaml>,
    pub throttle: Option<ThrottleYaml>,
    pub retry: Option<RetryYaml>,
    pub local: Option<LocalYaml>,
}

/// HD backend endpoint from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BackendYaml {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub token: Option<String>,
}

/// Voice defaults from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VoiceYaml {
    pub default: Option<String>,
    pub language: Option<String>,
    /// `auto`, `mobile` or `desktop`
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CacheYaml {
    pub max_size: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ThrottleYaml {
    pub min_gap_ms: Option<u64>,
}

/// Retry policy from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RetryYaml {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub jitter: Option<f64>,
}

/// Local synthesis timeouts from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LocalYaml {
    pub voice_load_timeout_ms: Option<u64>,
    pub utterance_timeout_ms: Option<u64>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    pub fn from_file(path: &Path) -> SpeechResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SpeechError::InvalidConfiguration(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        serde_yaml::from_str(&contents).map_err(|e| {
            SpeechError::InvalidConfiguration(format!("Failed to parse YAML config: {e}"))
        })
    }
}
