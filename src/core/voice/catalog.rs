//! Catalog of voices offered by the HD synthesis backend.

use serde::{Deserialize, Serialize};

/// Voice entry exposed to UI callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceDescriptor {
    /// Voice identifier sent to the backend
    pub id: String,
    /// Display name
    pub name: String,
    /// Short description of the voice character
    pub description: String,
}

/// Voices available from the HD backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HdVoice {
    Alloy,
    Ash,
    Coral,
    Echo,
    Fable,
    #[default]
    Nova,
    Onyx,
    Sage,
    Shimmer,
}

impl HdVoice {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Fable => "fable",
            Self::Nova => "nova",
            Self::Onyx => "onyx",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
        }
    }

    /// Human readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Alloy => "Alloy",
            Self::Ash => "Ash",
            Self::Coral => "Coral",
            Self::Echo => "Echo",
            Self::Fable => "Fable",
            Self::Nova => "Nova",
            Self::Onyx => "Onyx",
            Self::Sage => "Sage",
            Self::Shimmer => "Shimmer",
        }
    }

    /// One-line description shown in voice pickers.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Alloy => "Balanced and neutral",
            Self::Ash => "Calm and clear",
            Self::Coral => "Warm and friendly",
            Self::Echo => "Soft-spoken and steady",
            Self::Fable => "Expressive storyteller",
            Self::Nova => "Bright and encouraging",
            Self::Onyx => "Deep and confident",
            Self::Sage => "Gentle and patient",
            Self::Shimmer => "Light and upbeat",
        }
    }

    /// Parse from string; `None` for voices the backend does not know.
    pub fn parse(s: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        Self::parse(s).unwrap_or_default()
    }

    /// Get all available voices.
    pub fn all() -> &'static [HdVoice] {
        &[
            Self::Alloy,
            Self::Ash,
            Self::Coral,
            Self::Echo,
            Self::Fable,
            Self::Nova,
            Self::Onyx,
            Self::Sage,
            Self::Shimmer,
        ]
    }

    /// Descriptor for UI consumption.
    pub fn descriptor(&self) -> VoiceDescriptor {
        VoiceDescriptor {
            id: self.as_str().to_string(),
            name: self.display_name().to_string(),
            description: self.description().to_string(),
        }
    }
}

impl std::fmt::Display for HdVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
