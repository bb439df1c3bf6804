//! Stall watchdog for the narration primitive.
//!
//! The engine can silently stop emitting progress and completion signals on
//! some platforms. Whenever a segment is issued the watchdog is armed with a
//! deadline scaled to the segment's estimated speech duration; if nothing is
//! heard by then, it signals the driver to advance as if the engine had
//! reported end-of-segment.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::warn;

use vellum_text::CHARS_PER_SECOND;

use crate::driver::DriverSignal;

const SUPERVISION_INTERVAL: Duration = Duration::from_secs(1);

/// Deadline for a segment of `chars` characters narrated at `rate`:
/// estimated duration from the shared speed heuristic, plus a safety
/// margin, never below the floor.
pub fn deadline_for(chars: usize, rate: f32, floor_ms: u64, margin_ms: u64) -> Duration {
    let estimated_ms = (chars as f64 / (CHARS_PER_SECOND * rate as f64) * 1000.0).round() as u64;
    Duration::from_millis((estimated_ms + margin_ms).max(floor_ms))
}

pub struct StallWatchdog {
    floor_ms: u64,
    margin_ms: u64,
    last_feed: Arc<RwLock<Option<Instant>>>,
    handle: Option<JoinHandle<()>>,
}

impl StallWatchdog {
    pub fn new(floor_ms: u64, margin_ms: u64) -> Self {
        Self {
            floor_ms,
            margin_ms,
            last_feed: Arc::new(RwLock::new(None)),
            handle: None,
        }
    }

    /// Arm for a freshly issued segment, replacing any previous arming.
    pub fn arm(
        &mut self,
        utterance_id: u64,
        chars: usize,
        rate: f32,
        signal_tx: mpsc::Sender<DriverSignal>,
    ) {
        self.disarm();
        let deadline = deadline_for(chars, rate, self.floor_ms, self.margin_ms);
        *self.last_feed.write() = Some(Instant::now());
        let last_feed = Arc::clone(&self.last_feed);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(SUPERVISION_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                let stalled = last_feed
                    .read()
                    .map(|fed| fed.elapsed() > deadline)
                    .unwrap_or(false);
                if stalled {
                    warn!(
                        utterance_id,
                        "No narration signal within {:?}; reporting stall", deadline
                    );
                    let _ = signal_tx.send(DriverSignal::Stalled { utterance_id }).await;
                    break;
                }
            }
        });
        self.handle = Some(handle);
    }

    /// Record a progress signal, pushing the deadline out.
    pub fn feed(&self) {
        *self.last_feed.write() = Some(Instant::now());
    }

    /// Stop supervising. Called on pause, cancel, completion, and teardown.
    pub fn disarm(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        *self.last_feed.write() = None;
    }
}

impl Drop for StallWatchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}
