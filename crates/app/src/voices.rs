//! Narrator selection policy.
//!
//! Voice enumeration on some hosts returns an empty list until the engine
//! has warmed up, so callers poll. Selection prefers a regional locale,
//! falls back to the base language, then to anything available, and keeps
//! the persisted narrator whenever it survives the filter.

use tokio::time::{sleep, Duration};
use tracing::debug;

use vellum_tts::{NarrationEngine, VoiceInfo};

pub const VOICE_POLL_ATTEMPTS: u32 = 10;
pub const VOICE_POLL_DELAY: Duration = Duration::from_millis(200);

/// Filter `voices` down to narration candidates. Tier one: language tag
/// under `preferred_prefix` (excluding the bare base tag). Tier two: any
/// tag under `base_prefix`. Tier three: everything. Matching is
/// case-insensitive since engines disagree on tag casing.
pub fn filter_candidates<'a>(
    voices: &'a [VoiceInfo],
    preferred_prefix: &str,
    base_prefix: &str,
) -> Vec<&'a VoiceInfo> {
    let preferred = preferred_prefix.to_ascii_lowercase();
    let base = base_prefix.to_ascii_lowercase();

    let tier_one: Vec<&VoiceInfo> = voices
        .iter()
        .filter(|v| {
            let language = v.language.to_ascii_lowercase();
            language.starts_with(&preferred) && language != base
        })
        .collect();
    if !tier_one.is_empty() {
        return tier_one;
    }

    let tier_two: Vec<&VoiceInfo> = voices
        .iter()
        .filter(|v| v.language.to_ascii_lowercase().starts_with(&base))
        .collect();
    if !tier_two.is_empty() {
        return tier_two;
    }

    voices.iter().collect()
}

/// Pick the narrator to use: the persisted one when still present in the
/// filtered candidates, else the first candidate.
pub fn select_voice(
    voices: &[VoiceInfo],
    persisted: Option<&str>,
    preferred_prefix: &str,
    base_prefix: &str,
) -> Option<String> {
    let candidates = filter_candidates(voices, preferred_prefix, base_prefix);
    if let Some(id) = persisted {
        if candidates.iter().any(|v| v.id == id) {
            return Some(id.to_string());
        }
    }
    candidates.first().map(|v| v.id.clone())
}

/// Poll the engine until it reports a non-empty voice list, up to
/// [`VOICE_POLL_ATTEMPTS`]. Returns whatever was last seen (possibly
/// empty).
pub async fn wait_for_voices<E: NarrationEngine>(engine: &E) -> Vec<VoiceInfo> {
    for attempt in 1..=VOICE_POLL_ATTEMPTS {
        match engine.list_voices().await {
            Ok(voices) if !voices.is_empty() => return voices,
            Ok(_) => debug!("Voice list still empty (attempt {})", attempt),
            Err(e) => debug!("Voice listing failed (attempt {}): {}", attempt, e),
        }
        sleep(VOICE_POLL_DELAY).await;
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::broadcast;
    use vellum_tts::{NarrationEvent, NarrationOptions, NarrationResult};

    fn voice(id: &str, language: &str) -> VoiceInfo {
        VoiceInfo {
            id: id.to_string(),
            name: id.to_string(),
            language: language.to_string(),
        }
    }

    #[test]
    fn prefers_the_regional_locale() {
        let voices = vec![
            voice("us", "en-US"),
            voice("gb", "en-GB"),
            voice("fr", "fr-FR"),
        ];
        let candidates = filter_candidates(&voices, "en-GB", "en");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "gb");
    }

    #[test]
    fn falls_back_to_base_language_then_everything() {
        let voices = vec![voice("us", "en-US"), voice("fr", "fr-FR")];
        let candidates = filter_candidates(&voices, "en-GB", "en");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "us");

        let voices = vec![voice("fr", "fr-FR"), voice("de", "de-DE")];
        let candidates = filter_candidates(&voices, "en-GB", "en");
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn matching_ignores_tag_casing() {
        let voices = vec![voice("gb", "en-gb")];
        let candidates = filter_candidates(&voices, "en-GB", "en");
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn persisted_voice_wins_when_still_available() {
        let voices = vec![voice("gb-1", "en-GB"), voice("gb-2", "en-GB")];
        let selected = select_voice(&voices, Some("gb-2"), "en-GB", "en");
        assert_eq!(selected.as_deref(), Some("gb-2"));
    }

    #[test]
    fn vanished_persisted_voice_falls_back_to_first_candidate() {
        let voices = vec![voice("gb-1", "en-GB")];
        let selected = select_voice(&voices, Some("gone"), "en-GB", "en");
        assert_eq!(selected.as_deref(), Some("gb-1"));
        assert_eq!(select_voice(&[], Some("gone"), "en-GB", "en"), None);
    }

    /// Engine whose voice list populates after a few polls.
    struct WarmupEngine {
        remaining_empty_polls: Mutex<u32>,
        events_tx: broadcast::Sender<NarrationEvent>,
    }

    impl WarmupEngine {
        fn new(empty_polls: u32) -> Self {
            let (events_tx, _) = broadcast::channel(4);
            Self {
                remaining_empty_polls: Mutex::new(empty_polls),
                events_tx,
            }
        }
    }

    #[async_trait]
    impl NarrationEngine for WarmupEngine {
        fn name(&self) -> &str {
            "warmup"
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn speak(&mut self, _: &str, _: &NarrationOptions) -> NarrationResult<u64> {
            unimplemented!("not exercised")
        }

        async fn pause(&mut self) -> NarrationResult<()> {
            Ok(())
        }

        async fn resume(&mut self) -> NarrationResult<()> {
            Ok(())
        }

        async fn cancel(&mut self) -> NarrationResult<()> {
            Ok(())
        }

        async fn list_voices(&self) -> NarrationResult<Vec<VoiceInfo>> {
            let mut remaining = self.remaining_empty_polls.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(Vec::new());
            }
            Ok(vec![voice("gb", "en-GB")])
        }

        async fn set_rate(&mut self, _: f32) -> NarrationResult<()> {
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<NarrationEvent> {
            self.events_tx.subscribe()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_the_engine_reports_voices() {
        let engine = WarmupEngine::new(3);
        let voices = wait_for_voices(&engine).await;
        assert_eq!(voices.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_bounded_attempts() {
        let engine = WarmupEngine::new(u32::MAX);
        let voices = wait_for_voices(&engine).await;
        assert!(voices.is_empty());
    }
}
