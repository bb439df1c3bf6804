//! Narration engine abstraction and per-utterance events

use crate::error::NarrationResult;
use crate::types::{NarrationOptions, VoiceInfo};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Classification of an engine-reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The utterance was interrupted, typically by a cancel issued from this
    /// process. Expected during the cancel-then-restart pattern.
    Interrupted,
    /// The utterance was cancelled before any audio was produced.
    Canceled,
    /// Any other engine failure.
    Engine,
}

impl FaultKind {
    /// Whether a fault of this kind is a routine consequence of driving the
    /// engine (and must not be surfaced to the user).
    pub fn is_benign(self) -> bool {
        matches!(self, FaultKind::Interrupted | FaultKind::Canceled)
    }
}

/// Asynchronous events emitted by an engine, tagged with the utterance id
/// returned from [`NarrationEngine::speak`].
#[derive(Debug, Clone)]
pub enum NarrationEvent {
    /// The engine began producing audio for the utterance.
    Started { utterance_id: u64 },
    /// A word/unit boundary was reached, `char_offset` characters into the
    /// utterance text. Not every engine reports these.
    Progress { utterance_id: u64, char_offset: usize },
    /// The utterance finished playing.
    Ended { utterance_id: u64 },
    /// The utterance failed or was interrupted.
    Failed {
        utterance_id: u64,
        kind: FaultKind,
        message: String,
    },
}

impl NarrationEvent {
    pub fn utterance_id(&self) -> u64 {
        match self {
            NarrationEvent::Started { utterance_id }
            | NarrationEvent::Progress { utterance_id, .. }
            | NarrationEvent::Ended { utterance_id }
            | NarrationEvent::Failed { utterance_id, .. } => *utterance_id,
        }
    }
}

/// Core narration engine interface
///
/// Implementations wrap a concrete speech primitive (eSpeak, a platform TTS
/// service, ...). One utterance is logically active at a time: `speak`
/// replaces whatever was playing. Completion, progress, and failure are
/// delivered asynchronously on the broadcast channel returned by
/// [`subscribe`](NarrationEngine::subscribe); engines are not trusted to
/// deliver anything at all, which is what the caller's watchdog is for.
#[async_trait]
pub trait NarrationEngine: Send + Sync {
    /// Engine name/identifier.
    fn name(&self) -> &str;

    /// Check if the underlying primitive is usable on this system.
    async fn is_available(&self) -> bool;

    /// Start narrating `text`, replacing any active utterance. Returns the
    /// id that tags all events for this utterance.
    async fn speak(&mut self, text: &str, options: &NarrationOptions) -> NarrationResult<u64>;

    /// Pause the active utterance, keeping it resumable.
    async fn pause(&mut self) -> NarrationResult<()>;

    /// Resume a paused utterance.
    async fn resume(&mut self) -> NarrationResult<()>;

    /// Cancel the active utterance, if any. Engines report the cancellation
    /// as a benign [`NarrationEvent::Failed`].
    async fn cancel(&mut self) -> NarrationResult<()>;

    /// Enumerate available voices. May legitimately be empty shortly after
    /// startup; callers poll until the engine has populated its list.
    async fn list_voices(&self) -> NarrationResult<Vec<VoiceInfo>>;

    /// Change the playback rate. Applies to the active utterance where the
    /// primitive supports it, and to every subsequent one.
    async fn set_rate(&mut self, rate: f32) -> NarrationResult<()>;

    /// Subscribe to utterance events.
    fn subscribe(&self) -> broadcast::Receiver<NarrationEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benign_fault_classification() {
        assert!(FaultKind::Interrupted.is_benign());
        assert!(FaultKind::Canceled.is_benign());
        assert!(!FaultKind::Engine.is_benign());
    }

    #[test]
    fn events_expose_their_utterance_id() {
        let ev = NarrationEvent::Progress {
            utterance_id: 7,
            char_offset: 12,
        };
        assert_eq!(ev.utterance_id(), 7);
    }
}
