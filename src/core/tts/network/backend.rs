//! One synthesis round trip against the HD backend.
//!
//! A [`SpeechBackend`] performs exactly one request and classifies the
//! outcome. Retry, throttling and credential refresh are layered on top by
//! [`NetworkSynthesisClient`](super::NetworkSynthesisClient).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use tracing::{debug, error};
use url::Url;
use zeroize::Zeroizing;

use super::messages::{SynthesisRequest, SynthesisResponse, mentions_rate_limit};
use crate::errors::{SpeechError, SpeechResult};

/// Classified result of a single backend call.
#[derive(Debug, Clone)]
pub enum BackendOutcome {
    /// Decoded audio bytes
    Audio(Bytes),
    /// HTTP 429 or a failure body naming a rate limit
    RateLimited(String),
    /// HTTP 401
    Unauthorized(String),
    /// Anything else
    Failed(SpeechError),
}

/// A remote synthesis service.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Perform one synthesis request with the given bearer token.
    async fn synthesize(&self, request: &SynthesisRequest, access_token: &str) -> BackendOutcome;

    /// Endpoint description for diagnostics.
    fn endpoint(&self) -> String;
}

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`SpeechBackend`] speaking JSON over HTTPS with `reqwest`.
#[derive(Debug)]
pub struct HttpSpeechBackend {
    client: Client,
    endpoint: Url,
    api_key: Option<Zeroizing<String>>,
    request_counter: AtomicU64,
}

impl HttpSpeechBackend {
    /// Build a backend for `endpoint` with a pooled HTTP client.
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> SpeechResult<Self> {
        let endpoint = parse_endpoint(endpoint)?;
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout.min(Duration::from_secs(10)))
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| {
                SpeechError::InvalidConfiguration(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.filter(|k| !k.is_empty()).map(Zeroizing::new),
            request_counter: AtomicU64::new(0),
        })
    }
}

/// Validate the backend URL: absolute `http`/`https` with a host.
pub fn parse_endpoint(endpoint: &str) -> SpeechResult<Url> {
    let url = Url::parse(endpoint.trim()).map_err(|e| {
        SpeechError::InvalidConfiguration(format!("Invalid backend URL '{endpoint}': {e}"))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SpeechError::InvalidConfiguration(format!(
            "Backend URL must use http or https, got: {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(SpeechError::InvalidConfiguration(
            "Backend URL must have a host".to_string(),
        ));
    }
    Ok(url)
}

#[async_trait]
impl SpeechBackend for HttpSpeechBackend {
    async fn synthesize(&self, request: &SynthesisRequest, access_token: &str) -> BackendOutcome {
        let request_id = self.request_counter.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            request_id = request_id,
            text_len = request.text.len(),
            voice = %request.voice,
            "Requesting HD synthesis"
        );

        let mut builder = self
            .client
            .post(self.endpoint.clone())
            .header("Authorization", format!("Bearer {access_token}"))
            .header("Content-Type", "application/json")
            .json(request);
        if let Some(api_key) = &self.api_key {
            builder = builder.header("apikey", api_key.as_str());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!(request_id = request_id, error = %e, "HD synthesis request failed");
                return BackendOutcome::Failed(e.into());
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return BackendOutcome::Failed(e.into()),
        };

        let outcome = classify_response(status, &body);
        match &outcome {
            BackendOutcome::Audio(audio) => debug!(
                request_id = request_id,
                audio_bytes = audio.len(),
                "HD synthesis succeeded"
            ),
            other => debug!(
                request_id = request_id,
                status = %status,
                outcome = ?other,
                "HD synthesis did not succeed"
            ),
        }
        outcome
    }

    fn endpoint(&self) -> String {
        self.endpoint.to_string()
    }
}

/// Map an HTTP status and body to a [`BackendOutcome`].
pub fn classify_response(status: StatusCode, body: &str) -> BackendOutcome {
    let parsed = serde_json::from_str::<SynthesisResponse>(body).ok();

    match status.as_u16() {
        429 => BackendOutcome::RateLimited(error_text(parsed.as_ref(), body)),
        401 => BackendOutcome::Unauthorized(error_text(parsed.as_ref(), body)),
        _ if status.is_success() => match parsed {
            Some(response) if response.is_rate_limited() => {
                BackendOutcome::RateLimited(error_text(Some(&response), body))
            }
            Some(response) => match response.decode_audio() {
                Ok(audio) => BackendOutcome::Audio(audio),
                Err(e) => BackendOutcome::Failed(e),
            },
            None => BackendOutcome::Failed(SpeechError::Failed(format!(
                "Malformed backend response: {}",
                truncate(body)
            ))),
        },
        _ => {
            let message = error_text(parsed.as_ref(), body);
            if mentions_rate_limit(&message) {
                BackendOutcome::RateLimited(message)
            } else {
                BackendOutcome::Failed(SpeechError::Failed(format!(
                    "Backend error ({status}): {message}"
                )))
            }
        }
    }
}

fn error_text(parsed: Option<&SynthesisResponse>, body: &str) -> String {
    parsed
        .and_then(|r| r.error.clone())
        .unwrap_or_else(|| truncate(body))
}

fn truncate(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
