//! Shared helpers for playback integration tests: a fully scripted
//! narration engine the tests drive by hand, plus book/settings fixtures.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Duration;

use vellum_app::{Book, Settings};
use vellum_tts::{
    next_utterance_id, FaultKind, NarrationEngine, NarrationEvent, NarrationOptions,
    NarrationResult, VoiceInfo,
};

#[derive(Debug, Clone)]
pub struct SpeakCall {
    pub text: String,
    pub voice: Option<String>,
    pub rate: f32,
}

#[derive(Default)]
struct ScriptedState {
    calls: Vec<SpeakCall>,
    current: Option<u64>,
    paused: u32,
    resumed: u32,
    cancelled: u32,
    rate_changes: Vec<f32>,
    available: bool,
    voices: Vec<VoiceInfo>,
}

/// Test-side handle onto a [`ScriptedEngine`]. The engine itself moves into
/// the session; the handle stays behind to observe calls and inject events.
#[derive(Clone)]
pub struct ScriptedHandle {
    events_tx: broadcast::Sender<NarrationEvent>,
    state: Arc<Mutex<ScriptedState>>,
}

pub struct ScriptedEngine {
    handle: ScriptedHandle,
}

impl ScriptedEngine {
    pub fn new() -> (Self, ScriptedHandle) {
        let (events_tx, _) = broadcast::channel(64);
        let state = ScriptedState {
            available: true,
            voices: default_voices(),
            ..Default::default()
        };
        let handle = ScriptedHandle {
            events_tx,
            state: Arc::new(Mutex::new(state)),
        };
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl ScriptedHandle {
    pub fn calls(&self) -> Vec<SpeakCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn current_utterance(&self) -> Option<u64> {
        self.state.lock().current
    }

    pub fn paused_count(&self) -> u32 {
        self.state.lock().paused
    }

    pub fn resumed_count(&self) -> u32 {
        self.state.lock().resumed
    }

    pub fn cancelled_count(&self) -> u32 {
        self.state.lock().cancelled
    }

    pub fn rate_changes(&self) -> Vec<f32> {
        self.state.lock().rate_changes.clone()
    }

    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    /// Report the active utterance as finished.
    pub fn end_current(&self) {
        let id = self
            .current_utterance()
            .expect("no active utterance to end");
        self.emit_ended(id);
    }

    /// Report an arbitrary utterance id as finished (stale-callback tests).
    pub fn emit_ended(&self, utterance_id: u64) {
        let _ = self.events_tx.send(NarrationEvent::Ended { utterance_id });
    }

    pub fn fail_current(&self, kind: FaultKind, message: &str) {
        let utterance_id = self
            .current_utterance()
            .expect("no active utterance to fail");
        self.emit_failed(utterance_id, kind, message);
    }

    pub fn emit_failed(&self, utterance_id: u64, kind: FaultKind, message: &str) {
        let _ = self.events_tx.send(NarrationEvent::Failed {
            utterance_id,
            kind,
            message: message.to_string(),
        });
    }

    /// Report a word boundary `char_offset` characters into the active
    /// utterance's text.
    pub fn progress_current(&self, char_offset: usize) {
        let utterance_id = self
            .current_utterance()
            .expect("no active utterance to progress");
        let _ = self.events_tx.send(NarrationEvent::Progress {
            utterance_id,
            char_offset,
        });
    }
}

#[async_trait]
impl NarrationEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn is_available(&self) -> bool {
        self.handle.state.lock().available
    }

    async fn speak(&mut self, text: &str, options: &NarrationOptions) -> NarrationResult<u64> {
        let utterance_id = next_utterance_id();
        let mut state = self.handle.state.lock();
        state.calls.push(SpeakCall {
            text: text.to_string(),
            voice: options.voice.clone(),
            rate: options.rate,
        });
        state.current = Some(utterance_id);
        Ok(utterance_id)
    }

    async fn pause(&mut self) -> NarrationResult<()> {
        self.handle.state.lock().paused += 1;
        Ok(())
    }

    async fn resume(&mut self) -> NarrationResult<()> {
        self.handle.state.lock().resumed += 1;
        Ok(())
    }

    async fn cancel(&mut self) -> NarrationResult<()> {
        let mut state = self.handle.state.lock();
        state.cancelled += 1;
        state.current = None;
        Ok(())
    }

    async fn list_voices(&self) -> NarrationResult<Vec<VoiceInfo>> {
        Ok(self.handle.state.lock().voices.clone())
    }

    async fn set_rate(&mut self, rate: f32) -> NarrationResult<()> {
        self.handle.state.lock().rate_changes.push(rate);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<NarrationEvent> {
        self.handle.events_tx.subscribe()
    }
}

fn default_voices() -> Vec<VoiceInfo> {
    vec![
        VoiceInfo {
            id: "alloy".to_string(),
            name: "Alloy".to_string(),
            language: "en-US".to_string(),
        },
        VoiceInfo {
            id: "serena".to_string(),
            name: "Serena".to_string(),
            language: "en-GB".to_string(),
        },
        VoiceInfo {
            id: "margaux".to_string(),
            name: "Margaux".to_string(),
            language: "fr-FR".to_string(),
        },
    ]
}

/// Two chapters whose sentences line up with the 20-character test budget:
/// chapter 0 chunks to ["First one.", "Second two.", "Third three."] and
/// chapter 1 to ["Alpha beta.", "Gamma delta."].
pub fn sample_book() -> Book {
    Book {
        title: "Sample".to_string(),
        cover: None,
        chapters: vec![
            "First one. Second two. Third three.".to_string(),
            "Alpha beta. Gamma delta.".to_string(),
        ],
        identity_key: "sample.epub".to_string(),
    }
}

pub fn test_settings() -> Settings {
    Settings {
        chunk_budget: 20,
        ..Settings::default()
    }
}

/// Settings whose watchdog will not fire within any test's virtual
/// timeline, for tests that must control advancement themselves.
pub fn quiet_watchdog_settings() -> Settings {
    Settings {
        watchdog_floor_ms: 600_000,
        ..test_settings()
    }
}

/// Poll `condition` under paused time until it holds; panics after a bounded
/// virtual wait.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(300), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
