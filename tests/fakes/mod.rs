//! In-memory stand-ins for the platform and backend collaborators.
//!
//! - `FakeOutput` / `FakeElement`: audio elements with controllable
//!   completion and autoplay refusal
//! - `FakeLocalEngine`: records utterances and completes them immediately
//! - `ScriptedBackend`: counts dispatches and replays scripted outcomes

// Not every test binary uses every fake
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

use speech_delivery::core::tts::local::UtteranceHandle;
use speech_delivery::core::tts::network::{BackendOutcome, SynthesisRequest};
use speech_delivery::{
    AudioElement, AudioOutput, AudioResource, LocalSpeechEngine, LocalVoice, SpeechBackend,
    SpeechConfig, SpeechError, SpeechResult, Utterance,
};

/// Base64 of a tiny MP3-looking payload
pub const AUDIO_B64: &str = "SUQzAwAAAAAAAA==";

/// Configuration with zero delays so tests control timing explicitly.
pub fn test_config() -> SpeechConfig {
    let mut config = SpeechConfig::default();
    config.session_token = Some("test-token".to_string());
    config.throttle_min_gap_ms = 0;
    config.retry_base_delay_ms = 10;
    config.retry_jitter = 0.0;
    config
}

// =============================================================================
// Audio output
// =============================================================================

pub struct FakeElement {
    block_autoplay: bool,
    auto_finish: bool,
    source: Mutex<Option<AudioResource>>,
    started: AtomicBool,
    paused: AtomicBool,
    halted: AtomicBool,
    done: watch::Sender<bool>,
}

impl FakeElement {
    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn source(&self) -> Option<AudioResource> {
        self.source.lock().clone()
    }

    pub fn finish(&self) {
        self.done.send_replace(true);
    }
}

#[async_trait]
impl AudioElement for FakeElement {
    fn set_source(&self, resource: &AudioResource) {
        *self.source.lock() = Some(resource.clone());
    }

    async fn start(&self) -> SpeechResult<()> {
        if self.block_autoplay {
            return Err(SpeechError::AutoplayBlocked(
                "play() failed because the user didn't interact with the document first".into(),
            ));
        }
        self.started.store(true, Ordering::SeqCst);
        if self.auto_finish {
            self.finish();
        }
        Ok(())
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
        self.source.lock().take();
        self.finish();
    }

    async fn ended(&self) -> SpeechResult<()> {
        let mut rx = self.done.subscribe();
        let _ = rx.wait_for(|done| *done).await;
        Ok(())
    }
}

pub struct FakeOutput {
    pub block_autoplay: AtomicBool,
    auto_finish: bool,
    elements: Mutex<Vec<Arc<FakeElement>>>,
}

impl FakeOutput {
    /// Elements finish as soon as they start.
    pub fn instant() -> Arc<Self> {
        Arc::new(Self {
            block_autoplay: AtomicBool::new(false),
            auto_finish: true,
            elements: Mutex::new(Vec::new()),
        })
    }

    /// Elements play until `finish()` or `halt()`.
    pub fn manual() -> Arc<Self> {
        Arc::new(Self {
            block_autoplay: AtomicBool::new(false),
            auto_finish: false,
            elements: Mutex::new(Vec::new()),
        })
    }

    pub fn blocking_autoplay() -> Arc<Self> {
        let output = Self::instant();
        output.block_autoplay.store(true, Ordering::SeqCst);
        output
    }

    pub fn created(&self) -> usize {
        self.elements.lock().len()
    }

    pub fn started(&self) -> usize {
        self.elements.lock().iter().filter(|e| e.started()).count()
    }

    pub fn last(&self) -> Option<Arc<FakeElement>> {
        self.elements.lock().last().cloned()
    }
}

impl AudioOutput for FakeOutput {
    fn create_element(&self) -> Arc<dyn AudioElement> {
        let element = Arc::new(FakeElement {
            block_autoplay: self.block_autoplay.load(Ordering::SeqCst),
            auto_finish: self.auto_finish,
            source: Mutex::new(None),
            started: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            done: watch::channel(false).0,
        });
        self.elements.lock().push(element.clone());
        element
    }
}

// =============================================================================
// Local engine
// =============================================================================

pub struct FakeLocalEngine {
    voices: Vec<LocalVoice>,
    pub spoken: Mutex<Vec<Utterance>>,
    pub cancels: AtomicUsize,
    fail_with: Option<SpeechError>,
}

impl FakeLocalEngine {
    pub fn with_voices(voices: Vec<LocalVoice>) -> Arc<Self> {
        Arc::new(Self {
            voices,
            spoken: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
            fail_with: None,
        })
    }

    /// Engine whose voice catalog never loads.
    pub fn cold() -> Arc<Self> {
        Self::with_voices(Vec::new())
    }

    pub fn failing(error: SpeechError) -> Arc<Self> {
        Arc::new(Self {
            voices: vec![LocalVoice::new("v1", "Samantha", "en-US")],
            spoken: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
            fail_with: Some(error),
        })
    }

    pub fn spoken_texts(&self) -> Vec<String> {
        self.spoken.lock().iter().map(|u| u.text.clone()).collect()
    }
}

#[async_trait]
impl LocalSpeechEngine for FakeLocalEngine {
    fn voices(&self) -> Vec<LocalVoice> {
        self.voices.clone()
    }

    async fn voices_changed(&self) {
        std::future::pending::<()>().await
    }

    fn enqueue(&self, utterance: Utterance) -> UtteranceHandle {
        self.spoken.lock().push(utterance);
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(match &self.fail_with {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        });
        rx
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn pause(&self) {}

    fn resume(&self) {}
}

// =============================================================================
// Backend
// =============================================================================

pub struct ScriptedBackend {
    delay: Duration,
    script: Mutex<VecDeque<BackendOutcome>>,
    fallback: BackendOutcome,
    calls: AtomicU32,
    pub dispatch_times: Mutex<Vec<Instant>>,
    pub requests: Mutex<Vec<SynthesisRequest>>,
}

impl ScriptedBackend {
    fn build(delay: Duration, script: Vec<BackendOutcome>, fallback: BackendOutcome) -> Arc<Self> {
        Arc::new(Self {
            delay,
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicU32::new(0),
            dispatch_times: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Always succeeds after `delay`.
    pub fn succeeding(delay: Duration) -> Arc<Self> {
        Self::build(delay, Vec::new(), audio())
    }

    /// Always returns `outcome`.
    pub fn always(outcome: BackendOutcome) -> Arc<Self> {
        Self::build(Duration::ZERO, Vec::new(), outcome)
    }

    /// Replays `script`, then succeeds.
    pub fn scripted(script: Vec<BackendOutcome>) -> Arc<Self> {
        Self::build(Duration::ZERO, script, audio())
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn audio() -> BackendOutcome {
    BackendOutcome::Audio(Bytes::from_static(b"ID3\x03\x00fake-mp3"))
}

#[async_trait]
impl SpeechBackend for ScriptedBackend {
    async fn synthesize(&self, request: &SynthesisRequest, _access_token: &str) -> BackendOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.dispatch_times.lock().push(Instant::now());
        self.requests.lock().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }

    fn endpoint(&self) -> String {
        "scripted://backend".to_string()
    }
}
