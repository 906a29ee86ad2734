//! Session credential access for the HD backend.
//!
//! Authentication itself lives outside this crate. The network client only
//! needs to read the current bearer token and, when it is missing or
//! rejected, ask the session owner to refresh it.

use async_trait::async_trait;
use parking_lot::RwLock;
use zeroize::Zeroizing;

use crate::errors::SpeechResult;

/// Source of the bearer credential attached to synthesis requests.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Current access token, if a session exists.
    fn access_token(&self) -> Option<Zeroizing<String>>;

    /// Ask the session owner for a fresh token.
    ///
    /// Returns `Ok(true)` when a token is available afterwards.
    async fn refresh(&self) -> SpeechResult<bool>;
}

/// Session provider backed by a fixed, externally replaceable token.
#[derive(Debug, Default)]
pub struct StaticSessionProvider {
    token: RwLock<Option<Zeroizing<String>>>,
}

impl StaticSessionProvider {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token.filter(|t| !t.is_empty()).map(Zeroizing::new)),
        }
    }

    /// Replace the stored token (e.g. after the host app signs in again).
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token.filter(|t| !t.is_empty()).map(Zeroizing::new);
    }
}

#[async_trait]
impl SessionProvider for StaticSessionProvider {
    fn access_token(&self) -> Option<Zeroizing<String>> {
        self.token.read().clone()
    }

    async fn refresh(&self) -> SpeechResult<bool> {
        // Nothing to refresh from; report whether a token is present.
        Ok(self.token.read().is_some())
    }
}
