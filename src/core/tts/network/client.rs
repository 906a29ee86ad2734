//! HD synthesis with throttling, retry and generation-gated cache writes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::auth::SessionProvider;
use super::backend::{BackendOutcome, SpeechBackend};
use super::messages::SynthesisRequest;
use crate::core::cache::{AudioCache, AudioResource};
use crate::core::generation::GenerationToken;
use crate::core::retry::{AttemptError, RetryPolicy};
use crate::core::throttle::RequestThrottle;
use crate::core::voice::{CacheKey, VoiceConfig};
use crate::errors::{SpeechError, SpeechResult};

/// Network synthesis client.
///
/// Deduplication is the caller's concern; this type performs one logical
/// request (possibly several attempts) per call.
pub struct NetworkSynthesisClient {
    backend: Arc<dyn SpeechBackend>,
    session: Arc<dyn SessionProvider>,
    cache: Arc<AudioCache>,
    throttle: RequestThrottle,
    retry: RetryPolicy,
    dispatched: AtomicU64,
}

impl std::fmt::Debug for NetworkSynthesisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkSynthesisClient")
            .field("endpoint", &self.backend.endpoint())
            .field("retry", &self.retry)
            .field("throttle_gap", &self.throttle.min_gap())
            .finish()
    }
}

impl NetworkSynthesisClient {
    pub fn new(
        backend: Arc<dyn SpeechBackend>,
        session: Arc<dyn SessionProvider>,
        cache: Arc<AudioCache>,
        throttle: RequestThrottle,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            session,
            cache,
            throttle,
            retry,
            dispatched: AtomicU64::new(0),
        }
    }

    /// Number of requests actually sent to the backend.
    pub fn dispatched_requests(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn backend_endpoint(&self) -> String {
        self.backend.endpoint()
    }

    pub fn has_session(&self) -> bool {
        self.session.access_token().is_some()
    }

    /// Synthesize `text`, store the result under `key` and return it.
    ///
    /// The cache is written only if `token` is still current once the audio
    /// arrives; otherwise the result is discarded with `Cancelled`.
    pub async fn synthesize(
        &self,
        text: &str,
        config: &VoiceConfig,
        key: CacheKey,
        token: &GenerationToken,
    ) -> SpeechResult<AudioResource> {
        let request = SynthesisRequest::new(text, config);
        let refreshed = AtomicBool::new(false);

        let audio = self
            .retry
            .execute(token, |attempt| {
                let request = &request;
                let refreshed = &refreshed;
                async move { self.attempt(request, token, refreshed, attempt).await }
            })
            .await?;

        token.ensure_current()?;
        let resource = AudioResource::new(audio);
        if !self.cache.contains(&key) {
            self.cache.prune();
        }
        self.cache.set(key.clone(), resource.clone());
        info!(
            key = %key,
            audio_bytes = resource.len(),
            cached = self.cache.len(),
            "HD audio synthesized and cached"
        );
        Ok(resource)
    }

    async fn attempt(
        &self,
        request: &SynthesisRequest,
        token: &GenerationToken,
        refreshed: &AtomicBool,
        attempt: u32,
    ) -> Result<bytes::Bytes, AttemptError> {
        self.throttle.acquire(token).await.map_err(AttemptError::Fatal)?;

        let access_token = self.access_token(refreshed).await.map_err(AttemptError::Fatal)?;
        token.ensure_current().map_err(AttemptError::Fatal)?;

        self.dispatched.fetch_add(1, Ordering::Relaxed);
        debug!(attempt = attempt, voice = %request.voice, "Dispatching HD synthesis");

        match self.backend.synthesize(request, &access_token).await {
            BackendOutcome::Audio(audio) => Ok(audio),
            BackendOutcome::RateLimited(message) => {
                warn!(attempt = attempt, message = %message, "HD backend rate limited");
                Err(AttemptError::Retryable(SpeechError::Failed(message)))
            }
            BackendOutcome::Unauthorized(message) => {
                if !refreshed.swap(true, Ordering::SeqCst)
                    && let Err(e) = self.session.refresh().await
                {
                    warn!(error = %e, "Session refresh after 401 failed");
                }
                Err(AttemptError::Fatal(SpeechError::AuthenticationFailed(message)))
            }
            BackendOutcome::Failed(error) => Err(AttemptError::Fatal(error)),
        }
    }

    /// Read the bearer token, refreshing once per call when absent.
    async fn access_token(&self, refreshed: &AtomicBool) -> SpeechResult<Zeroizing<String>> {
        if let Some(token) = self.session.access_token() {
            return Ok(token);
        }
        if refreshed.swap(true, Ordering::SeqCst) {
            return Err(SpeechError::AuthenticationFailed(
                "No active session".to_string(),
            ));
        }
        debug!("No session token, attempting refresh");
        match self.session.refresh().await {
            Ok(true) => self.session.access_token().ok_or_else(|| {
                SpeechError::AuthenticationFailed("Session refresh returned no token".to_string())
            }),
            Ok(false) => Err(SpeechError::AuthenticationFailed(
                "No active session".to_string(),
            )),
            Err(e) => Err(SpeechError::AuthenticationFailed(format!(
                "Session refresh failed: {e}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::generation::GenerationCounter;
    use crate::core::tts::network::StaticSessionProvider;
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    struct ScriptedBackend {
        script: Mutex<VecDeque<BackendOutcome>>,
        tokens_seen: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<BackendOutcome>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                tokens_seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SpeechBackend for ScriptedBackend {
        async fn synthesize(&self, _: &SynthesisRequest, access_token: &str) -> BackendOutcome {
            self.tokens_seen.lock().push(access_token.to_string());
            self.script
                .lock()
                .pop_front()
                .unwrap_or(BackendOutcome::Audio(Bytes::from_static(b"ID3")))
        }

        fn endpoint(&self) -> String {
            "scripted".into()
        }
    }

    struct RotatingSession {
        token: Mutex<Option<String>>,
        refreshes: AtomicU64,
    }

    #[async_trait]
    impl SessionProvider for RotatingSession {
        fn access_token(&self) -> Option<Zeroizing<String>> {
            self.token.lock().clone().map(Zeroizing::new)
        }

        async fn refresh(&self) -> SpeechResult<bool> {
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            *self.token.lock() = Some(format!("fresh-{n}"));
            Ok(true)
        }
    }

    fn client_with(
        backend: Arc<dyn SpeechBackend>,
        session: Arc<dyn SessionProvider>,
        cache: Arc<AudioCache>,
    ) -> NetworkSynthesisClient {
        NetworkSynthesisClient::new(
            backend,
            session,
            cache,
            RequestThrottle::new(Duration::ZERO),
            RetryPolicy::new(3, Duration::from_millis(10), 0.0),
        )
    }

    fn key(text: &str) -> CacheKey {
        CacheKey::new(text, &VoiceConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_writes_cache() {
        let cache = Arc::new(AudioCache::new(4));
        let client = client_with(
            ScriptedBackend::new(vec![]),
            Arc::new(StaticSessionProvider::new(Some("t".into()))),
            cache.clone(),
        );
        let counter = GenerationCounter::new();

        let resource = client
            .synthesize("hello", &VoiceConfig::default(), key("hello"), &counter.token())
            .await
            .unwrap();
        assert!(cache.get(&key("hello")).unwrap().same_as(&resource));
        assert_eq!(client.dispatched_requests(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhaustion() {
        let backend = ScriptedBackend::new(vec![
            BackendOutcome::RateLimited("429".into()),
            BackendOutcome::RateLimited("429".into()),
            BackendOutcome::RateLimited("429".into()),
        ]);
        let cache = Arc::new(AudioCache::new(4));
        let client = client_with(
            backend,
            Arc::new(StaticSessionProvider::new(Some("t".into()))),
            cache.clone(),
        );
        let counter = GenerationCounter::new();

        let result = client
            .synthesize("hi", &VoiceConfig::default(), key("hi"), &counter.token())
            .await;
        assert_eq!(result.unwrap_err(), SpeechError::ServiceBusy { attempts: 3 });
        assert_eq!(client.dispatched_requests(), 3);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_refreshes_once_and_fails() {
        let backend = ScriptedBackend::new(vec![BackendOutcome::Unauthorized("expired".into())]);
        let session = Arc::new(RotatingSession {
            token: Mutex::new(Some("stale".into())),
            refreshes: AtomicU64::new(0),
        });
        let client = client_with(backend.clone(), session.clone(), Arc::new(AudioCache::new(4)));
        let counter = GenerationCounter::new();

        let result = client
            .synthesize("hi", &VoiceConfig::default(), key("hi"), &counter.token())
            .await;
        assert!(matches!(result, Err(SpeechError::AuthenticationFailed(_))));
        assert_eq!(session.refreshes.load(Ordering::SeqCst), 1);

        // Next call uses the refreshed token.
        client
            .synthesize("hi", &VoiceConfig::default(), key("hi"), &counter.token())
            .await
            .unwrap();
        assert_eq!(*backend.tokens_seen.lock(), vec!["stale", "fresh-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_token_refreshes_before_dispatch() {
        let backend = ScriptedBackend::new(vec![]);
        let session = Arc::new(RotatingSession {
            token: Mutex::new(None),
            refreshes: AtomicU64::new(0),
        });
        let client = client_with(backend.clone(), session.clone(), Arc::new(AudioCache::new(4)));
        let counter = GenerationCounter::new();

        client
            .synthesize("hi", &VoiceConfig::default(), key("hi"), &counter.token())
            .await
            .unwrap();
        assert_eq!(*backend.tokens_seen.lock(), vec!["fresh-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_session_fails_without_dispatch() {
        let client = client_with(
            ScriptedBackend::new(vec![]),
            Arc::new(StaticSessionProvider::new(None)),
            Arc::new(AudioCache::new(4)),
        );
        let counter = GenerationCounter::new();

        let result = client
            .synthesize("hi", &VoiceConfig::default(), key("hi"), &counter.token())
            .await;
        assert!(matches!(result, Err(SpeechError::AuthenticationFailed(_))));
        assert_eq!(client.dispatched_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_result_not_cached() {
        struct SlowBackend;

        #[async_trait]
        impl SpeechBackend for SlowBackend {
            async fn synthesize(&self, _: &SynthesisRequest, _: &str) -> BackendOutcome {
                tokio::time::sleep(Duration::from_millis(200)).await;
                BackendOutcome::Audio(Bytes::from_static(b"ID3"))
            }

            fn endpoint(&self) -> String {
                "slow".into()
            }
        }

        let cache = Arc::new(AudioCache::new(4));
        let client = Arc::new(client_with(
            Arc::new(SlowBackend),
            Arc::new(StaticSessionProvider::new(Some("t".into()))),
            cache.clone(),
        ));
        let counter = GenerationCounter::new();
        let token = counter.token();

        let task = {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .synthesize("hi", &VoiceConfig::default(), key("hi"), &token)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        counter.advance();

        assert_eq!(task.await.unwrap().unwrap_err(), SpeechError::Cancelled);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_failure_is_not_retried() {
        let backend = ScriptedBackend::new(vec![BackendOutcome::Failed(SpeechError::Failed(
            "bad voice".into(),
        ))]);
        let client = client_with(
            backend,
            Arc::new(StaticSessionProvider::new(Some("t".into()))),
            Arc::new(AudioCache::new(4)),
        );
        let counter = GenerationCounter::new();

        let result = client
            .synthesize("hi", &VoiceConfig::default(), key("hi"), &counter.token())
            .await;
        assert_eq!(result.unwrap_err(), SpeechError::Failed("bad voice".into()));
        assert_eq!(client.dispatched_requests(), 1);
    }
}
