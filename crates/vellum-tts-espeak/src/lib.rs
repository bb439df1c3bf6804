//! eSpeak NG narration engine implementation for Vellum
//!
//! Drives the `espeak-ng` (or `espeak`) command line tool, one child process
//! per utterance. The CLI reports no word boundaries, so this engine emits no
//! `Progress` events; completion rides on process exit, and a stalled child
//! is recovered by the caller's watchdog.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use vellum_tts::{
    next_utterance_id, FaultKind, NarrationEngine, NarrationError, NarrationEvent,
    NarrationOptions, NarrationResult, VoiceInfo,
};


/// Words per minute at rate 1.0.
const BASE_WPM: f32 = 180.0;

const EVENT_CHANNEL_CAPACITY: usize = 64;

struct ActiveUtterance {
    id: u64,
    pid: Option<u32>,
    cancelled: Arc<AtomicBool>,
    waiter: JoinHandle<()>,
}

pub struct EspeakEngine {
    events_tx: broadcast::Sender<NarrationEvent>,
    active: Option<ActiveUtterance>,
}

impl Default for EspeakEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EspeakEngine {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            events_tx,
            active: None,
        }
    }

    /// Get the espeak command name (espeak or espeak-ng)
    async fn espeak_command() -> Option<String> {
        if Command::new("espeak").arg("--version").output().await.is_ok() {
            Some("espeak".to_string())
        } else if Command::new("espeak-ng")
            .arg("--version")
            .output()
            .await
            .is_ok()
        {
            Some("espeak-ng".to_string())
        } else {
            None
        }
    }

    /// Parse espeak voice list output
    fn parse_voice_list(output: &str) -> Vec<VoiceInfo> {
        let mut voices = Vec::new();

        // espeak voice list format: Pty Language Age/Gender VoiceName File Other
        // Example: 5  en-gb          M  english            (en 2)
        let voice_regex = Regex::new(r"^\s*(\d+)\s+([\w-]+)\s+([MF\+-]?)\s+([\w\-_]+)\s+").unwrap();

        for line in output.lines().skip(1) {
            if let Some(captures) = voice_regex.captures(line) {
                let language = captures.get(2).map_or("unknown", |m| m.as_str()).to_string();
                let voice_id = captures.get(4).map_or("unknown", |m| m.as_str()).to_string();

                voices.push(VoiceInfo {
                    id: voice_id.clone(),
                    name: format!("{} ({})", language, voice_id),
                    language,
                });
            }
        }

        voices
    }

    /// Build espeak command arguments
    fn build_espeak_args(&self, text: &str, options: &NarrationOptions) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(voice_id) = options.voice.as_ref() {
            args.push("-v".to_string());
            args.push(voice_id.clone());
        }

        let wpm = (BASE_WPM * options.clamped_rate()).round() as u32;
        args.push("-s".to_string());
        args.push(wpm.to_string());

        args.push(text.to_string());

        args
    }

    async fn signal_active(&self, signal: &str) -> NarrationResult<()> {
        let active = self.active.as_ref().ok_or(NarrationError::NoActiveUtterance)?;
        let pid = active.pid.ok_or(NarrationError::NoActiveUtterance)?;

        let status = Command::new("kill")
            .arg(signal)
            .arg(pid.to_string())
            .status()
            .await?;

        if !status.success() {
            return Err(NarrationError::Synthesis(format!(
                "kill {} {} failed: {}",
                signal, pid, status
            )));
        }
        Ok(())
    }

    fn spawn_waiter(
        mut child: tokio::process::Child,
        utterance_id: u64,
        cancelled: Arc<AtomicBool>,
        events_tx: broadcast::Sender<NarrationEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let event = match child.wait().await {
                Ok(status) if status.success() => NarrationEvent::Ended { utterance_id },
                Ok(status) => {
                    let kind = if cancelled.load(Ordering::SeqCst) {
                        FaultKind::Interrupted
                    } else {
                        FaultKind::Engine
                    };
                    NarrationEvent::Failed {
                        utterance_id,
                        kind,
                        message: format!("espeak exited: {}", status),
                    }
                }
                Err(e) => NarrationEvent::Failed {
                    utterance_id,
                    kind: FaultKind::Engine,
                    message: format!("wait failed: {}", e),
                },
            };
            let _ = events_tx.send(event);
        })
    }
}

#[async_trait]
impl NarrationEngine for EspeakEngine {
    fn name(&self) -> &str {
        "eSpeak NG"
    }

    async fn is_available(&self) -> bool {
        Self::espeak_command().await.is_some()
    }

    async fn speak(&mut self, text: &str, options: &NarrationOptions) -> NarrationResult<u64> {
        if text.trim().is_empty() {
            return Err(NarrationError::Synthesis("empty utterance text".to_string()));
        }

        self.cancel().await?;

        let cmd = Self::espeak_command()
            .await
            .ok_or_else(|| NarrationError::EngineNotAvailable("eSpeak not found".to_string()))?;

        let args = self.build_espeak_args(text, options);
        debug!("Running espeak narration: {} {:?}", cmd, args);

        let child = Command::new(&cmd).args(&args).spawn()?;
        let pid = child.id();
        let utterance_id = next_utterance_id();
        let cancelled = Arc::new(AtomicBool::new(false));

        let waiter = Self::spawn_waiter(
            child,
            utterance_id,
            Arc::clone(&cancelled),
            self.events_tx.clone(),
        );
        self.active = Some(ActiveUtterance {
            id: utterance_id,
            pid,
            cancelled,
            waiter,
        });

        let _ = self.events_tx.send(NarrationEvent::Started { utterance_id });
        Ok(utterance_id)
    }

    async fn pause(&mut self) -> NarrationResult<()> {
        self.signal_active("-STOP").await
    }

    async fn resume(&mut self) -> NarrationResult<()> {
        self.signal_active("-CONT").await
    }

    async fn cancel(&mut self) -> NarrationResult<()> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };

        active.cancelled.store(true, Ordering::SeqCst);
        if let Some(pid) = active.pid {
            // A stopped child ignores TERM until continued.
            let _ = Command::new("kill").arg("-CONT").arg(pid.to_string()).status().await;
            if let Err(e) = Command::new("kill")
                .arg("-TERM")
                .arg(pid.to_string())
                .status()
                .await
            {
                warn!("Failed to signal espeak process {}: {}", pid, e);
            }
        } else {
            active.waiter.abort();
        }
        debug!("Cancelled utterance {}", active.id);
        Ok(())
    }

    async fn list_voices(&self) -> NarrationResult<Vec<VoiceInfo>> {
        let cmd = Self::espeak_command()
            .await
            .ok_or_else(|| NarrationError::EngineNotAvailable("eSpeak not found".to_string()))?;

        let output = Command::new(&cmd).arg("--voices").output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(Self::parse_voice_list(&stdout))
    }

    /// The CLI cannot re-pace a running process; callers carry the new rate
    /// in the options of the next utterance.
    async fn set_rate(&mut self, rate: f32) -> NarrationResult<()> {
        debug!("Rate change to {} takes effect from the next utterance", rate);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<NarrationEvent> {
        self.events_tx.subscribe()
    }
}
