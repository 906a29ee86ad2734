//! Audio output abstraction.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::cache::AudioResource;
use crate::errors::SpeechResult;

/// A single playable audio element.
///
/// Implementations wrap whatever the host uses to play audio. All methods
/// except `start` and `ended` return immediately.
#[async_trait]
pub trait AudioElement: Send + Sync {
    /// Attach the audio to play. May be called after the element was created.
    fn set_source(&self, resource: &AudioResource);

    /// Begin playback.
    ///
    /// Fails with [`SpeechError::AutoplayBlocked`] when the platform refuses
    /// to start audio outside a user gesture.
    ///
    /// [`SpeechError::AutoplayBlocked`]: crate::errors::SpeechError::AutoplayBlocked
    async fn start(&self) -> SpeechResult<()>;

    fn pause(&self);

    fn resume(&self);

    /// Stop playback and detach the source. `ended` must resolve afterwards.
    fn halt(&self);

    /// Resolves when playback finishes, fails, or the element is halted.
    async fn ended(&self) -> SpeechResult<()>;
}

/// Factory for audio elements.
pub trait AudioOutput: Send + Sync {
    fn create_element(&self) -> Arc<dyn AudioElement>;
}
