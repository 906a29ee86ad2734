//! # Speech Manager
//!
//! The request coordinator. A [`SpeechManager`] owns every piece of mutable
//! pipeline state (audio cache, in-flight request map, generation counter
//! and playback session) and exposes the public speech API.
//!
//! ## Flow of `speak`
//!
//! 1. Let the platform unlocker do its gesture-bound work, synchronously.
//! 2. `stop()` whatever is playing and capture a fresh generation token.
//! 3. Depending on [`VoiceSelectionMode`]:
//!    - network: cache hit → play; miss → join or start the in-flight
//!      request for the key (throttled, retried) → play
//!    - local: speak through the platform engine
//!    - auto: network, falling back to local on any failure
//! 4. Resolve to [`SpeakOutcome::Finished`], [`SpeakOutcome::Superseded`] or
//!    a classified [`SpeechError`].
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use speech_delivery::config::SpeechConfig;
//! use speech_delivery::core::playback::FileAudioOutput;
//! use speech_delivery::core::speech_manager::SpeechManager;
//! use speech_delivery::core::voice::{VoiceConfig, VoiceSelectionMode};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SpeechConfig::from_env()?;
//! let manager = SpeechManager::builder(&config, Arc::new(FileAudioOutput::new("out"))).build()?;
//!
//! manager.preload("Great job!", &VoiceConfig::default()).await;
//! manager
//!     .speak("Great job!", &VoiceConfig::default(), VoiceSelectionMode::Auto)
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::SpeechConfig;
use crate::core::cache::{AudioCache, AudioResource, CacheStats};
use crate::core::generation::{GenerationCounter, GenerationToken};
use crate::core::pending::PendingRequests;
use crate::core::platform::Platform;
use crate::core::playback::{
    AudioElement, AudioOutput, AudioUnlocker, PlaybackController, PlaybackSource, PlaybackState,
    unlocker_for,
};
use crate::core::throttle::RequestThrottle;
use crate::core::tts::local::{LocalSpeechEngine, LocalSynthesisFallback};
use crate::core::tts::network::{
    HttpSpeechBackend, NetworkSynthesisClient, SessionProvider, SpeechBackend,
    StaticSessionProvider,
};
use crate::core::voice::{CacheKey, HdVoice, VoiceConfig, VoiceDescriptor, VoiceSelectionMode};
use crate::errors::{SpeechError, SpeechResult};

/// How a `speak` call ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakOutcome {
    /// The utterance played to completion
    Finished,
    /// A later `speak()` or `stop()` took over; nothing further happened
    Superseded,
}

/// Diagnostic snapshot of the pipeline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityReport {
    pub platform: Platform,
    pub hd_backend_configured: bool,
    pub backend_endpoint: Option<String>,
    pub session_token_present: bool,
    pub local_speech_supported: bool,
    pub local_voice_count: usize,
    pub cache: CacheStats,
    pub pending_requests: usize,
    pub network_requests: u64,
    pub playback_state: PlaybackState,
    pub using_hd_voice: bool,
    pub last_error: Option<String>,
}

/// Builder for [`SpeechManager`].
pub struct SpeechManagerBuilder {
    config: SpeechConfig,
    output: Arc<dyn AudioOutput>,
    backend: Option<Arc<dyn SpeechBackend>>,
    session: Option<Arc<dyn SessionProvider>>,
    local_engine: Option<Arc<dyn LocalSpeechEngine>>,
    platform: Option<Platform>,
    unlocker: Option<Arc<dyn AudioUnlocker>>,
}

impl SpeechManagerBuilder {
    /// Use a custom backend instead of HTTP to `backend_url`.
    pub fn backend(mut self, backend: Arc<dyn SpeechBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use a custom session provider instead of the configured static token.
    pub fn session(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn local_engine(mut self, engine: Arc<dyn LocalSpeechEngine>) -> Self {
        self.local_engine = Some(engine);
        self
    }

    /// Override the configured platform.
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Override the unlocker chosen for the platform.
    pub fn unlocker(mut self, unlocker: Arc<dyn AudioUnlocker>) -> Self {
        self.unlocker = Some(unlocker);
        self
    }

    pub fn build(self) -> SpeechResult<SpeechManager> {
        self.config.validate()?;
        let config = &self.config;

        let cache = Arc::new(AudioCache::new(config.cache_max_size));

        let backend: Option<Arc<dyn SpeechBackend>> = match (self.backend, &config.backend_url) {
            (Some(backend), _) => Some(backend),
            (None, Some(url)) => Some(Arc::new(HttpSpeechBackend::new(
                url,
                config.backend_api_key.clone(),
                config.request_timeout(),
            )?)),
            (None, None) => None,
        };

        let network = backend.map(|backend| {
            let session = self.session.unwrap_or_else(|| {
                Arc::new(StaticSessionProvider::new(config.session_token.clone()))
                    as Arc<dyn SessionProvider>
            });
            Arc::new(NetworkSynthesisClient::new(
                backend,
                session,
                Arc::clone(&cache),
                RequestThrottle::new(config.throttle_min_gap()),
                config.retry_policy(),
            ))
        });

        let local = Arc::new(LocalSynthesisFallback::new(
            self.local_engine,
            config.voice_load_timeout(),
            config.utterance_timeout(),
        ));

        let platform = self.platform.unwrap_or_else(|| config.platform.resolve());
        let unlocker = self.unlocker.unwrap_or_else(|| unlocker_for(platform));

        info!(
            platform = %platform,
            hd_voice = network.is_some(),
            local_speech = local.is_supported(),
            cache_max_size = cache.capacity(),
            "Speech manager initialized"
        );

        Ok(SpeechManager {
            cache,
            pending: PendingRequests::new(),
            generation: GenerationCounter::new(),
            network,
            playback: PlaybackController::new(self.output, local),
            unlocker,
            platform,
            last_error: ArcSwapOption::empty(),
        })
    }
}

/// Request coordinator for speech delivery.
pub struct SpeechManager {
    cache: Arc<AudioCache>,
    pending: PendingRequests,
    generation: GenerationCounter,
    network: Option<Arc<NetworkSynthesisClient>>,
    playback: PlaybackController,
    unlocker: Arc<dyn AudioUnlocker>,
    platform: Platform,
    last_error: ArcSwapOption<SpeechError>,
}

impl std::fmt::Debug for SpeechManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechManager")
            .field("platform", &self.platform)
            .field("network", &self.network)
            .field("cache", &self.cache.stats())
            .field("pending", &self.pending)
            .field("playback", &self.playback)
            .finish()
    }
}

impl SpeechManager {
    pub fn builder(config: &SpeechConfig, output: Arc<dyn AudioOutput>) -> SpeechManagerBuilder {
        SpeechManagerBuilder {
            config: config.clone(),
            output,
            backend: None,
            session: None,
            local_engine: None,
            platform: None,
            unlocker: None,
        }
    }

    /// Speak `text` and wait until it finishes, is superseded or fails.
    pub async fn speak(
        &self,
        text: &str,
        config: &VoiceConfig,
        mode: VoiceSelectionMode,
    ) -> SpeechResult<SpeakOutcome> {
        if text.trim().is_empty() {
            return Ok(SpeakOutcome::Finished);
        }

        // Everything up to the first await runs inside the caller's gesture.
        self.stop();
        let primed = if mode.uses_network() && self.network.is_some() {
            self.unlocker.prime_element(self.playback.output())
        } else {
            None
        };
        let token = self.generation.token();
        debug!(
            generation = token.generation(),
            mode = mode.as_str(),
            text_len = text.len(),
            "speak"
        );

        let result = if mode.uses_network() {
            match self.speak_network(text, config, primed.clone(), &token).await {
                Err(e) if mode.allows_local_fallback() && !e.is_cancelled() && token.is_current() => {
                    warn!(error = %e, "HD voice failed, falling back to local speech");
                    // The primed element must not stay live next to local speech.
                    if let Some(element) = &primed {
                        element.halt();
                    }
                    self.speak_local(text, config, &token).await
                }
                other => other,
            }
        } else {
            self.speak_local(text, config, &token).await
        };

        self.settle(result, &token)
    }

    /// Callback form of [`speak`](Self::speak).
    ///
    /// `on_end` fires when speech finishes, `on_error` on a classified
    /// failure; neither fires when the call is superseded.
    pub async fn speak_with_callbacks<E, F>(
        &self,
        text: &str,
        config: &VoiceConfig,
        mode: VoiceSelectionMode,
        on_end: E,
        on_error: F,
    ) where
        E: FnOnce(),
        F: FnOnce(SpeechError),
    {
        match self.speak(text, config, mode).await {
            Ok(SpeakOutcome::Finished) => on_end(),
            Ok(SpeakOutcome::Superseded) => {}
            Err(e) => on_error(e),
        }
    }

    /// Cancel all in-flight work and halt playback.
    pub fn stop(&self) {
        let generation = self.generation.advance();
        self.playback.stop();
        debug!(generation = generation, "Speech stopped");
    }

    pub fn pause(&self) {
        self.playback.pause();
    }

    pub fn resume(&self) {
        self.playback.resume();
    }

    /// Synthesize and cache without playing. Does not stop current playback.
    ///
    /// Returns whether the audio is cached afterwards.
    pub async fn preload(&self, text: &str, config: &VoiceConfig) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        let Some(network) = &self.network else {
            return false;
        };
        let key = CacheKey::new(text, config);
        if self.cache.contains(&key) {
            return true;
        }

        let token = self.generation.token();
        match self.fetch(network, text, config, &key, &token).await {
            Ok(_) => true,
            Err(e) => {
                if !e.is_cancelled() {
                    warn!(error = %e, key = %key, "Preload failed");
                }
                self.cache.contains(&key)
            }
        }
    }

    pub fn is_cached(&self, text: &str, config: &VoiceConfig) -> bool {
        self.cache.contains(&CacheKey::new(text, config))
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.playback.is_paused()
    }

    /// Whether the current session plays HD (network) audio.
    pub fn is_using_hd_voice(&self) -> bool {
        self.playback.current_source() == Some(PlaybackSource::Network)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// HD voices offered by the backend.
    pub fn available_voices(&self) -> Vec<VoiceDescriptor> {
        HdVoice::all().iter().map(HdVoice::descriptor).collect()
    }

    /// User-facing message for the most recent failure of a non-superseded
    /// call.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .load()
            .as_deref()
            .map(|e| e.user_message().to_string())
    }

    /// The most recent failure itself, including backend detail. Meant for
    /// logs and diagnostics, not for display.
    pub fn last_error_detail(&self) -> Option<SpeechError> {
        self.last_error.load_full().map(|e| e.as_ref().clone())
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn subscribe_state(&self) -> broadcast::Receiver<PlaybackState> {
        self.playback.subscribe()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn check_availability(&self) -> AvailabilityReport {
        let local = self.playback.local();
        AvailabilityReport {
            platform: self.platform,
            hd_backend_configured: self.network.is_some(),
            backend_endpoint: self.network.as_ref().map(|n| n.backend_endpoint()),
            session_token_present: self.network.as_ref().is_some_and(|n| n.has_session()),
            local_speech_supported: local.is_supported(),
            local_voice_count: local.voices().len(),
            cache: self.cache.stats(),
            pending_requests: self.pending.len(),
            network_requests: self
                .network
                .as_ref()
                .map_or(0, |n| n.dispatched_requests()),
            playback_state: self.playback.state(),
            using_hd_voice: self.is_using_hd_voice(),
            last_error: self.last_error(),
        }
    }

    async fn speak_network(
        &self,
        text: &str,
        config: &VoiceConfig,
        primed: Option<Arc<dyn AudioElement>>,
        token: &GenerationToken,
    ) -> SpeechResult<()> {
        let network = self
            .network
            .as_ref()
            .ok_or_else(|| SpeechError::Failed("HD voice backend is not configured".to_string()))?;

        let key = CacheKey::new(text, config);
        let resource = match self.cache.get(&key) {
            Some(resource) => {
                debug!(key = %key, "Audio cache hit");
                resource
            }
            None => {
                self.playback.begin_loading(token);
                self.fetch(network, text, config, &key, token).await?
            }
        };

        self.playback.play_network(&resource, primed, token).await
    }

    async fn speak_local(
        &self,
        text: &str,
        config: &VoiceConfig,
        token: &GenerationToken,
    ) -> SpeechResult<()> {
        let warm_up = self.unlocker.warm_up_utterance(&config.language);
        self.playback.play_local(text, config, token, warm_up).await
    }

    /// Join or start the network request for `key`.
    ///
    /// If the shared request was cancelled by a generation this caller has
    /// already moved past, it is started again once on this caller's behalf.
    async fn fetch(
        &self,
        network: &Arc<NetworkSynthesisClient>,
        text: &str,
        config: &VoiceConfig,
        key: &CacheKey,
        token: &GenerationToken,
    ) -> SpeechResult<AudioResource> {
        let mut restarted = false;
        loop {
            let network = Arc::clone(network);
            let text = text.to_string();
            let config = config.clone();
            let op_key = key.clone();
            let shared = self.pending.join_or_start(key, token, move |op_token| {
                async move { network.synthesize(&text, &config, op_key, &op_token).await }.boxed()
            });

            match shared.await {
                Err(SpeechError::Cancelled) if token.is_current() && !restarted => {
                    debug!(key = %key, "Joined request was cancelled, restarting");
                    restarted = true;
                }
                other => {
                    token.ensure_current()?;
                    return other;
                }
            }
        }
    }

    fn settle(
        &self,
        result: SpeechResult<()>,
        token: &GenerationToken,
    ) -> SpeechResult<SpeakOutcome> {
        match result {
            Ok(()) if token.is_current() => {
                self.last_error.store(None);
                Ok(SpeakOutcome::Finished)
            }
            Ok(()) => Ok(SpeakOutcome::Superseded),
            Err(e) if e.is_cancelled() || !token.is_current() => {
                debug!(generation = token.generation(), "speak superseded");
                Ok(SpeakOutcome::Superseded)
            }
            Err(e) => {
                error!(error = %e, "Speech failed");
                self.last_error.store(Some(Arc::new(e.clone())));
                self.playback.record_error(token, &e);
                Err(e)
            }
        }
    }
}

impl Drop for SpeechManager {
    fn drop(&mut self) {
        self.generation.advance();
        self.playback.stop();
        self.cache.clear();
    }
}
