//! Request and response bodies for the HD synthesis backend.
//!
//! ```json
//! // POST {backend_url}
//! { "text": "Hello", "voice": "nova", "speed": 1.0, "instructions": "warm" }
//!
//! // 200 OK
//! { "success": true, "audioContent": "SUQz..." }
//!
//! // failure
//! { "success": false, "error": "Rate limit exceeded" }
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::core::voice::{VoiceConfig, normalize_text};
use crate::errors::{SpeechError, SpeechResult};

/// Body of a synthesis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    pub speed: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl SynthesisRequest {
    /// Build the body for `text`, normalized the same way as its cache key.
    pub fn new(text: &str, config: &VoiceConfig) -> Self {
        Self {
            text: normalize_text(text),
            voice: config.voice.to_lowercase(),
            speed: config.clamped_rate(),
            instructions: config
                .instructions
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }
}

/// Body of a synthesis response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SynthesisResponse {
    /// Whether the failure text names a rate limit.
    pub fn is_rate_limited(&self) -> bool {
        self.error.as_deref().is_some_and(mentions_rate_limit)
    }

    /// Decode `audioContent` when the response reports success.
    pub fn decode_audio(&self) -> SpeechResult<Bytes> {
        if !self.success {
            return Err(SpeechError::Failed(
                self.error
                    .clone()
                    .unwrap_or_else(|| "Backend reported failure".to_string()),
            ));
        }
        let encoded = self
            .audio_content
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SpeechError::Failed("Backend returned no audio content".into()))?;
        let audio = BASE64
            .decode(encoded.trim())
            .map_err(|e| SpeechError::Failed(format!("Invalid audio encoding: {e}")))?;
        if audio.is_empty() {
            return Err(SpeechError::Failed("Backend returned empty audio".into()));
        }
        Ok(Bytes::from(audio))
    }
}

/// Case-insensitive rate-limit detection in error text.
pub fn mentions_rate_limit(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("rate limit") || lower.contains("rate-limit") || lower.contains("too many requests")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let config = VoiceConfig::new("shimmer")
            .with_rate(1.25)
            .with_instructions("  calm and slow ");
        let request = SynthesisRequest::new("  Hello   there ", &config);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["text"], "Hello there");
        assert_eq!(json["voice"], "shimmer");
        assert_eq!(json["speed"], 1.25);
        assert_eq!(json["instructions"], "calm and slow");
    }

    #[test]
    fn test_voice_case_matches_cache_key() {
        use crate::core::voice::CacheKey;

        let mixed = VoiceConfig::new("Nova");
        let lower = VoiceConfig::new("nova");
        assert_eq!(CacheKey::new("hi", &mixed), CacheKey::new("hi", &lower));
        assert_eq!(
            SynthesisRequest::new("hi", &mixed),
            SynthesisRequest::new("hi", &lower)
        );
        assert_eq!(SynthesisRequest::new("hi", &mixed).voice, "nova");
    }

    #[test]
    fn test_request_omits_blank_instructions() {
        let config = VoiceConfig::default().with_instructions("   ");
        let json = serde_json::to_value(SynthesisRequest::new("hi", &config)).unwrap();
        assert!(json.get("instructions").is_none());
    }

    #[test]
    fn test_decode_success() {
        let response: SynthesisResponse =
            serde_json::from_str(r#"{"success":true,"audioContent":"SUQzAAA="}"#).unwrap();
        assert_eq!(&response.decode_audio().unwrap()[..3], b"ID3");
    }

    #[test]
    fn test_decode_failure_cases() {
        let failed: SynthesisResponse =
            serde_json::from_str(r#"{"success":false,"error":"boom"}"#).unwrap();
        assert_eq!(failed.decode_audio(), Err(SpeechError::Failed("boom".into())));

        let missing: SynthesisResponse = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(missing.decode_audio().is_err());

        let garbage: SynthesisResponse =
            serde_json::from_str(r#"{"success":true,"audioContent":"!!!"}"#).unwrap();
        assert!(garbage.decode_audio().is_err());
    }

    #[test]
    fn test_rate_limit_detection() {
        let response = SynthesisResponse {
            success: false,
            error: Some("OpenAI Rate Limit reached".into()),
            ..Default::default()
        };
        assert!(response.is_rate_limited());
        assert!(mentions_rate_limit("Too Many Requests"));
        assert!(!mentions_rate_limit("invalid voice"));
    }
}
