//! Platform gesture unlocking.
//!
//! Some platforms only allow audio to start from inside a user gesture
//! handler, before the handler awaits anything. An [`AudioUnlocker`] does the
//! platform-specific work that must happen synchronously at the start of
//! `speak()`, and supplies the warm-up utterance for local speech engines
//! that need one.

use std::sync::Arc;

use tracing::debug;

use super::element::{AudioElement, AudioOutput};
use crate::core::platform::Platform;
use crate::core::tts::local::Utterance;

/// Volume of the warm-up utterance; audible enough to wake the engine.
const WARM_UP_VOLUME: f32 = 0.01;

pub trait AudioUnlocker: Send + Sync {
    fn platform(&self) -> Platform;

    /// Called synchronously at the very start of `speak()`.
    ///
    /// Returns an element created inside the gesture, to which the audio
    /// source will be attached once synthesis completes.
    fn prime_element(&self, output: &dyn AudioOutput) -> Option<Arc<dyn AudioElement>>;

    /// Near-silent utterance that initialises a cold local speech engine.
    fn warm_up_utterance(&self, language: &str) -> Option<Utterance>;
}

/// Unlocker for mobile platforms.
#[derive(Debug, Default, Clone, Copy)]
pub struct GestureUnlocker;

impl AudioUnlocker for GestureUnlocker {
    fn platform(&self) -> Platform {
        Platform::Mobile
    }

    fn prime_element(&self, output: &dyn AudioOutput) -> Option<Arc<dyn AudioElement>> {
        debug!("Pre-creating audio element inside user gesture");
        Some(output.create_element())
    }

    fn warm_up_utterance(&self, language: &str) -> Option<Utterance> {
        Some(Utterance {
            volume: WARM_UP_VOLUME,
            ..Utterance::new(" ", language)
        })
    }
}

/// Unlocker for desktop platforms, which need no gesture handling.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardUnlocker;

impl AudioUnlocker for StandardUnlocker {
    fn platform(&self) -> Platform {
        Platform::Desktop
    }

    fn prime_element(&self, _output: &dyn AudioOutput) -> Option<Arc<dyn AudioElement>> {
        None
    }

    fn warm_up_utterance(&self, _language: &str) -> Option<Utterance> {
        None
    }
}

/// Select the unlocker for `platform`.
pub fn unlocker_for(platform: Platform) -> Arc<dyn AudioUnlocker> {
    match platform {
        Platform::Mobile => Arc::new(GestureUnlocker),
        Platform::Desktop => Arc::new(StandardUnlocker),
    }
}
