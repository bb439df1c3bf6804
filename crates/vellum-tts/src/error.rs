//! Error types for narration engines

use thiserror::Error;

/// Narration engine error types
#[derive(Error, Debug)]
pub enum NarrationError {
    /// Engine is not available or not installed
    #[error("narration engine not available: {0}")]
    EngineNotAvailable(String),

    /// Voice not found or not supported
    #[error("voice not found: {0}")]
    VoiceNotFound(String),

    /// Starting or controlling an utterance failed
    #[error("narration failed: {0}")]
    Synthesis(String),

    /// IO error (process spawning, signalling, ...)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// No active utterance to pause, resume, or cancel
    #[error("no active utterance")]
    NoActiveUtterance,
}

/// Result type for narration operations
pub type NarrationResult<T> = Result<T, NarrationError>;
