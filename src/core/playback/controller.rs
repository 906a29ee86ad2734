//! Playback state machine.
//!
//! ```text
//!   Idle → Loading → Playing ⇄ Paused → Idle
//!     (any) → Error → Idle
//! ```
//!
//! There is at most one playback session at a time. A session is tagged
//! with the generation that created it; completions from an older
//! generation never touch the current state.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::element::{AudioElement, AudioOutput};
use crate::core::cache::AudioResource;
use crate::core::generation::GenerationToken;
use crate::core::tts::local::{LocalSynthesisFallback, Utterance};
use crate::core::voice::VoiceConfig;
use crate::errors::{SpeechError, SpeechResult};

const STATE_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Error,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading => "loading",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Error => "error",
        }
    }
}

/// Where the audio of a session comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackSource {
    Network,
    Local,
}

struct Session {
    generation: u64,
    source: PlaybackSource,
    element: Option<Arc<dyn AudioElement>>,
}

#[derive(Default)]
struct ControllerState {
    state: PlaybackState,
    session: Option<Session>,
}

/// Owns the single active playback session.
pub struct PlaybackController {
    output: Arc<dyn AudioOutput>,
    local: Arc<LocalSynthesisFallback>,
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<PlaybackState>,
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("state", &self.state())
            .field("source", &self.current_source())
            .finish()
    }
}

impl PlaybackController {
    pub fn new(output: Arc<dyn AudioOutput>, local: Arc<LocalSynthesisFallback>) -> Self {
        let (events, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            output,
            local,
            inner: Mutex::new(ControllerState::default()),
            events,
        }
    }

    pub fn output(&self) -> &dyn AudioOutput {
        self.output.as_ref()
    }

    pub fn local(&self) -> &LocalSynthesisFallback {
        &self.local
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.lock().state
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state() == PlaybackState::Paused
    }

    pub fn current_source(&self) -> Option<PlaybackSource> {
        self.inner.lock().session.as_ref().map(|s| s.source)
    }

    /// Receive every state transition.
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackState> {
        self.events.subscribe()
    }

    fn transition(&self, inner: &mut ControllerState, next: PlaybackState) {
        if inner.state != next {
            debug!(from = inner.state.as_str(), to = next.as_str(), "Playback state changed");
            inner.state = next;
            let _ = self.events.send(next);
        }
    }

    /// Enter `Loading` while audio is being synthesized.
    pub fn begin_loading(&self, token: &GenerationToken) {
        let mut inner = self.inner.lock();
        if token.is_current() {
            self.transition(&mut inner, PlaybackState::Loading);
        }
    }

    /// Play network audio and wait for it to finish.
    ///
    /// `primed` is an element created earlier inside a user gesture; when
    /// absent a fresh element is created.
    pub async fn play_network(
        &self,
        resource: &AudioResource,
        primed: Option<Arc<dyn AudioElement>>,
        token: &GenerationToken,
    ) -> SpeechResult<()> {
        token.ensure_current()?;
        let element = primed.unwrap_or_else(|| self.output.create_element());
        element.set_source(resource);
        let generation = token.generation();

        {
            let mut inner = self.inner.lock();
            token.ensure_current()?;
            inner.session = Some(Session {
                generation,
                source: PlaybackSource::Network,
                element: Some(Arc::clone(&element)),
            });
        }

        if let Err(e) = element.start().await {
            token.ensure_current()?;
            warn!(error = %e, "Audio element refused to start");
            element.halt();
            self.clear_session(generation, None);
            return Err(e);
        }

        {
            let mut inner = self.inner.lock();
            if !token.is_current() {
                drop(inner);
                element.halt();
                return Err(SpeechError::Cancelled);
            }
            self.transition(&mut inner, PlaybackState::Playing);
        }
        info!(resource_id = resource.id(), "HD audio playing");

        let result = element.ended().await;
        token.ensure_current()?;
        self.clear_session(generation, Some(PlaybackState::Idle));
        result
    }

    /// Speak through the local engine and wait for it to finish.
    pub async fn play_local(
        &self,
        text: &str,
        config: &VoiceConfig,
        token: &GenerationToken,
        warm_up: Option<Utterance>,
    ) -> SpeechResult<()> {
        let generation = token.generation();
        {
            let mut inner = self.inner.lock();
            token.ensure_current()?;
            inner.session = Some(Session {
                generation,
                source: PlaybackSource::Local,
                element: None,
            });
            self.transition(&mut inner, PlaybackState::Playing);
        }

        let result = self.local.speak(text, config, token, warm_up).await;
        if token.is_current() {
            let terminal = result.is_ok().then_some(PlaybackState::Idle);
            self.clear_session(generation, terminal);
        }
        result
    }

    /// Record a failure of the current generation: `Error`, then `Idle`.
    pub fn record_error(&self, token: &GenerationToken, error: &SpeechError) {
        let mut inner = self.inner.lock();
        if !token.is_current() || error.is_cancelled() {
            return;
        }
        inner.session = None;
        self.transition(&mut inner, PlaybackState::Error);
        self.transition(&mut inner, PlaybackState::Idle);
    }

    /// Halt whatever is playing and return to `Idle`.
    pub fn stop(&self) {
        let session = {
            let mut inner = self.inner.lock();
            let session = inner.session.take();
            self.transition(&mut inner, PlaybackState::Idle);
            session
        };
        match session {
            Some(Session {
                element: Some(element),
                ..
            }) => element.halt(),
            Some(Session {
                source: PlaybackSource::Local,
                ..
            }) => self.local.cancel(),
            _ => {}
        }
    }

    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        if inner.state != PlaybackState::Playing {
            return;
        }
        match inner.session.as_ref() {
            Some(Session {
                element: Some(element),
                ..
            }) => element.pause(),
            Some(_) => self.local.pause(),
            None => return,
        }
        self.transition(&mut inner, PlaybackState::Paused);
    }

    pub fn resume(&self) {
        let mut inner = self.inner.lock();
        if inner.state != PlaybackState::Paused {
            return;
        }
        match inner.session.as_ref() {
            Some(Session {
                element: Some(element),
                ..
            }) => element.resume(),
            Some(_) => self.local.resume(),
            None => return,
        }
        self.transition(&mut inner, PlaybackState::Playing);
    }

    /// Drop the session if it still belongs to `generation`.
    fn clear_session(&self, generation: u64, next: Option<PlaybackState>) {
        let mut inner = self.inner.lock();
        if inner
            .session
            .as_ref()
            .is_some_and(|s| s.generation == generation)
        {
            inner.session = None;
            if let Some(next) = next {
                self.transition(&mut inner, next);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::generation::GenerationCounter;
    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::sync::watch;

    struct TestElement {
        blocked: bool,
        finished: watch::Sender<bool>,
        paused: Mutex<bool>,
    }

    #[async_trait]
    impl AudioElement for TestElement {
        fn set_source(&self, _: &AudioResource) {}

        async fn start(&self) -> SpeechResult<()> {
            if self.blocked {
                Err(SpeechError::AutoplayBlocked("NotAllowedError".into()))
            } else {
                Ok(())
            }
        }

        fn pause(&self) {
            *self.paused.lock() = true;
        }

        fn resume(&self) {
            *self.paused.lock() = false;
        }

        fn halt(&self) {
            self.finished.send_replace(true);
        }

        async fn ended(&self) -> SpeechResult<()> {
            let mut rx = self.finished.subscribe();
            let _ = rx.wait_for(|done| *done).await;
            Ok(())
        }
    }

    struct TestOutput {
        element: Arc<TestElement>,
    }

    impl AudioOutput for TestOutput {
        fn create_element(&self) -> Arc<dyn AudioElement> {
            self.element.clone()
        }
    }

    fn controller(blocked: bool) -> (PlaybackController, Arc<TestElement>) {
        let element = Arc::new(TestElement {
            blocked,
            finished: watch::channel(false).0,
            paused: Mutex::new(false),
        });
        let output = Arc::new(TestOutput {
            element: element.clone(),
        });
        let controller =
            PlaybackController::new(output, Arc::new(LocalSynthesisFallback::unsupported()));
        (controller, element)
    }

    fn resource() -> AudioResource {
        AudioResource::new(Bytes::from_static(b"ID3"))
    }

    #[tokio::test]
    async fn test_network_playback_lifecycle() {
        let (controller, element) = controller(false);
        let controller = Arc::new(controller);
        let counter = GenerationCounter::new();
        let token = counter.token();

        controller.begin_loading(&token);
        assert_eq!(controller.state(), PlaybackState::Loading);

        let task = {
            let controller = controller.clone();
            let token = token.clone();
            tokio::spawn(async move { controller.play_network(&resource(), None, &token).await })
        };
        while !controller.is_playing() {
            tokio::task::yield_now().await;
        }
        assert_eq!(controller.current_source(), Some(PlaybackSource::Network));

        controller.pause();
        assert!(controller.is_paused());
        assert!(*element.paused.lock());
        controller.resume();
        assert!(controller.is_playing());

        element.finished.send_replace(true);
        task.await.unwrap().unwrap();
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert_eq!(controller.current_source(), None);
    }

    #[tokio::test]
    async fn test_autoplay_blocked_surfaces() {
        let (controller, element) = controller(true);
        let counter = GenerationCounter::new();
        let result = controller.play_network(&resource(), None, &counter.token()).await;
        assert!(matches!(result, Err(SpeechError::AutoplayBlocked(_))));
        assert_eq!(controller.current_source(), None);
        // Refused elements are released.
        assert!(*element.finished.borrow());
    }

    #[tokio::test]
    async fn test_stop_halts_and_cancels() {
        let (controller, _) = controller(false);
        let controller = Arc::new(controller);
        let counter = GenerationCounter::new();
        let token = counter.token();

        let task = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.play_network(&resource(), None, &token).await })
        };
        while !controller.is_playing() {
            tokio::task::yield_now().await;
        }
        counter.advance();
        controller.stop();

        assert_eq!(task.await.unwrap(), Err(SpeechError::Cancelled));
        assert_eq!(controller.state(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_record_error_passes_through_error_state() {
        let (controller, _) = controller(false);
        let mut events = controller.subscribe();
        let counter = GenerationCounter::new();
        let token = counter.token();

        controller.begin_loading(&token);
        controller.record_error(&token, &SpeechError::Failed("x".into()));

        assert_eq!(events.recv().await.unwrap(), PlaybackState::Loading);
        assert_eq!(events.recv().await.unwrap(), PlaybackState::Error);
        assert_eq!(events.recv().await.unwrap(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_stale_error_is_ignored() {
        let (controller, _) = controller(false);
        let counter = GenerationCounter::new();
        let token = counter.token();
        controller.begin_loading(&token);
        counter.advance();
        controller.record_error(&token, &SpeechError::Failed("late".into()));
        assert_eq!(controller.state(), PlaybackState::Loading);
    }

    #[tokio::test]
    async fn test_pause_without_session_is_noop() {
        let (controller, _) = controller(false);
        controller.pause();
        controller.resume();
        assert_eq!(controller.state(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_local_without_engine_fails() {
        let (controller, _) = controller(false);
        let counter = GenerationCounter::new();
        let result = controller
            .play_local("hi", &VoiceConfig::default(), &counter.token(), None)
            .await;
        assert_eq!(result, Err(SpeechError::UnsupportedPlatform));
        assert_eq!(controller.current_source(), None);
    }
}
