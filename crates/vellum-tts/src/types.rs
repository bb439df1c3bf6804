//! Core types for narration engines

use serde::{Deserialize, Serialize};

/// Lowest supported speech-rate multiplier.
pub const MIN_RATE: f32 = 0.5;
/// Highest supported speech-rate multiplier.
pub const MAX_RATE: f32 = 2.0;

/// Voice information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceInfo {
    /// Unique voice identifier
    pub id: String,
    /// Human-readable voice name
    pub name: String,
    /// Language tag (e.g., "en-GB", "fr-FR")
    pub language: String,
}

/// Options for an individual narration request
#[derive(Debug, Clone)]
pub struct NarrationOptions {
    /// Voice to narrate with; engine default when absent.
    pub voice: Option<String>,
    /// Speech-rate multiplier, 1.0 is normal speed.
    pub rate: f32,
}

impl Default for NarrationOptions {
    fn default() -> Self {
        Self {
            voice: None,
            rate: 1.0,
        }
    }
}

impl NarrationOptions {
    /// Clamp the rate into the supported range.
    pub fn clamped_rate(&self) -> f32 {
        self.rate.clamp(MIN_RATE, MAX_RATE)
    }
}
