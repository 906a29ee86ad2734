//! Runtime platform classification.
//!
//! Mobile platforms drop the user-gesture "unlock" as soon as the handler
//! awaits anything, and their speech engines need a warm-up. The platform is
//! decided once at startup and selects the [`AudioUnlocker`] implementation.
//!
//! [`AudioUnlocker`]: crate::core::playback::AudioUnlocker

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::SpeechError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Mobile,
    Desktop,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Mobile => "mobile",
            Platform::Desktop => "desktop",
        }
    }

    #[inline]
    pub fn is_mobile(&self) -> bool {
        matches!(self, Platform::Mobile)
    }

    /// Classify a browser/webview user agent string.
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        let mobile = ["iphone", "ipad", "ipod", "android", "mobile", "silk", "kindle"]
            .iter()
            .any(|marker| ua.contains(marker));
        if mobile {
            Platform::Mobile
        } else {
            Platform::Desktop
        }
    }

    /// Platform of the running process.
    pub fn current() -> Self {
        match std::env::consts::OS {
            "ios" | "android" => Platform::Mobile,
            _ => Platform::Desktop,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configured platform: explicit, or detected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformSetting {
    #[default]
    Auto,
    Mobile,
    Desktop,
}

impl PlatformSetting {
    pub fn resolve(&self) -> Platform {
        match self {
            PlatformSetting::Auto => Platform::current(),
            PlatformSetting::Mobile => Platform::Mobile,
            PlatformSetting::Desktop => Platform::Desktop,
        }
    }
}

impl FromStr for PlatformSetting {
    type Err = SpeechError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(PlatformSetting::Auto),
            "mobile" => Ok(PlatformSetting::Mobile),
            "desktop" => Ok(PlatformSetting::Desktop),
            other => Err(SpeechError::InvalidConfiguration(format!(
                "Unknown platform '{other}', expected auto, mobile or desktop"
            ))),
        }
    }
}
