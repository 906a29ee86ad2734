//! Audio playback and platform gesture handling.

mod controller;
mod element;
mod file_sink;
mod unlock;

pub use controller::{PlaybackController, PlaybackSource, PlaybackState};
pub use element::{AudioElement, AudioOutput};
pub use file_sink::FileAudioOutput;
pub use unlock::{AudioUnlocker, GestureUnlocker, StandardUnlocker, unlocker_for};
