//! HD (network) speech synthesis.
//!
//! - [`SpeechBackend`] / [`HttpSpeechBackend`]: one classified round trip
//! - [`SessionProvider`]: bearer credential access and refresh
//! - [`NetworkSynthesisClient`]: throttle, retry and cache write on top

mod auth;
mod backend;
mod client;
mod messages;

pub use auth::{SessionProvider, StaticSessionProvider};
pub use backend::{
    BackendOutcome, DEFAULT_REQUEST_TIMEOUT, HttpSpeechBackend, SpeechBackend, classify_response,
    parse_endpoint,
};
pub use client::NetworkSynthesisClient;
pub use messages::{SynthesisRequest, SynthesisResponse};
