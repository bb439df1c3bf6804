use crate::error::PlaybackError;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Playback status of a narration session.
///
/// `Idle` and `Paused` both mean "not producing sound"; the difference is
/// whether continuing requires a fresh narration request from the stored
/// position (`Idle`) or resuming the engine's in-flight utterance (`Paused`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackStatus {
    Idle,
    Speaking,
    Paused,
}

pub struct StatusTracker {
    status: Arc<RwLock<PlaybackStatus>>,
    status_tx: Sender<PlaybackStatus>,
    status_rx: Receiver<PlaybackStatus>,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusTracker {
    pub fn new() -> Self {
        let (status_tx, status_rx) = crossbeam_channel::unbounded();
        Self {
            status: Arc::new(RwLock::new(PlaybackStatus::Idle)),
            status_tx,
            status_rx,
        }
    }

    pub fn transition(&self, new_status: PlaybackStatus) -> Result<(), PlaybackError> {
        let mut current = self.status.write();

        if *current == new_status {
            return Ok(());
        }

        // Validate status transitions
        let valid = matches!(
            (&*current, &new_status),
            (PlaybackStatus::Idle, PlaybackStatus::Speaking)
                | (PlaybackStatus::Speaking, PlaybackStatus::Paused)
                | (PlaybackStatus::Speaking, PlaybackStatus::Idle)
                | (PlaybackStatus::Paused, PlaybackStatus::Speaking)
                | (PlaybackStatus::Paused, PlaybackStatus::Idle)
        );

        if !valid {
            return Err(PlaybackError::InvalidTransition(format!(
                "{:?} -> {:?}",
                *current, new_status
            )));
        }

        tracing::debug!("Status transition: {:?} -> {:?}", *current, new_status);
        *current = new_status;
        let _ = self.status_tx.send(new_status);
        Ok(())
    }

    pub fn current(&self) -> PlaybackStatus {
        *self.status.read()
    }

    pub fn subscribe(&self) -> Receiver<PlaybackStatus> {
        self.status_rx.clone()
    }
}
