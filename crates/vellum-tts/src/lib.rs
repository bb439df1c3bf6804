//! Narration-engine abstraction layer for Vellum
//!
//! This crate provides the foundational types and traits for the external
//! narration primitive: the engine trait, per-utterance events, voice
//! metadata, and engine errors. Engines are stateful, asynchronous, and
//! allowed to be unreliable; everything above this layer is written to
//! tolerate that.

use std::sync::atomic::{AtomicU64, Ordering};

pub mod engine;
pub mod error;
pub mod types;

pub use engine::{FaultKind, NarrationEngine, NarrationEvent};
pub use error::{NarrationError, NarrationResult};
pub use types::{NarrationOptions, VoiceInfo, MAX_RATE, MIN_RATE};

/// Generates unique utterance ids
static UTTERANCE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a unique utterance id.
///
/// Ids increase monotonically for the lifetime of the process and tag every
/// event an engine emits, so drivers can discard callbacks from superseded
/// utterances.
pub fn next_utterance_id() -> u64 {
    UTTERANCE_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utterance_ids_are_monotonic() {
        let a = next_utterance_id();
        let b = next_utterance_id();
        assert!(b > a);
    }
}
