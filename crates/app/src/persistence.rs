//! Progress and preference persistence over a small key-value surface.
//!
//! Resume is chunk-granular on purpose: the persisted subset of a position
//! is (chapter, chunk) only, and the character index always seeds back to 0.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use vellum_tts::{MAX_RATE, MIN_RATE};

/// Fixed global key for the narrator/rate preference.
pub const VOICE_PREFERENCE_KEY: &str = "voice-preference";

pub fn progress_key(identity_key: &str) -> String {
    format!("progress:{}", identity_key)
}

/// Chunk-granular resume point for one book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedProgress {
    pub chapter_index: usize,
    pub chunk_index: usize,
    pub saved_at: DateTime<Utc>,
}

/// Narrator identity and speech rate, persisted globally rather than per
/// book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoicePreference {
    pub voice_id: Option<String>,
    pub rate: f32,
}

impl Default for VoicePreference {
    fn default() -> Self {
        Self {
            voice_id: None,
            rate: 1.0,
        }
    }
}

impl VoicePreference {
    pub fn clamped(mut self) -> Self {
        self.rate = self.rate.clamp(MIN_RATE, MAX_RATE);
        self
    }
}

/// Key-value persistence surface, provided by the host environment.
pub trait ProgressStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> io::Result<()>;
}

/// In-memory store. Clones share the same entries, which lets a caller keep
/// a handle to inspect or reuse what a session persisted.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> io::Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One JSON blob per key, under a data directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let sanitized: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", sanitized))
    }
}

impl ProgressStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&mut self, key: &str, value: &str) -> io::Result<()> {
        std::fs::write(self.path_for(key), value)
    }
}

/// Load a book's saved progress. Malformed blobs are discarded with a
/// warning; resume then falls back to the start of the book.
pub fn load_progress(store: &dyn ProgressStore, identity_key: &str) -> Option<SavedProgress> {
    let raw = store.get(&progress_key(identity_key))?;
    match serde_json::from_str(&raw) {
        Ok(progress) => Some(progress),
        Err(e) => {
            warn!("Discarding corrupt saved progress for '{}': {}", identity_key, e);
            None
        }
    }
}

pub fn save_progress(
    store: &mut dyn ProgressStore,
    identity_key: &str,
    chapter_index: usize,
    chunk_index: usize,
) {
    let progress = SavedProgress {
        chapter_index,
        chunk_index,
        saved_at: Utc::now(),
    };
    match serde_json::to_string(&progress) {
        Ok(blob) => {
            if let Err(e) = store.set(&progress_key(identity_key), &blob) {
                warn!("Failed to save progress for '{}': {}", identity_key, e);
            }
        }
        Err(e) => warn!("Failed to encode progress for '{}': {}", identity_key, e),
    }
}

pub fn load_voice_preference(store: &dyn ProgressStore) -> VoicePreference {
    let Some(raw) = store.get(VOICE_PREFERENCE_KEY) else {
        return VoicePreference::default();
    };
    match serde_json::from_str::<VoicePreference>(&raw) {
        Ok(preference) => preference.clamped(),
        Err(e) => {
            warn!("Discarding corrupt voice preference: {}", e);
            VoicePreference::default()
        }
    }
}

pub fn save_voice_preference(store: &mut dyn ProgressStore, preference: &VoicePreference) {
    match serde_json::to_string(preference) {
        Ok(blob) => {
            if let Err(e) = store.set(VOICE_PREFERENCE_KEY, &blob) {
                warn!("Failed to save voice preference: {}", e);
            }
        }
        Err(e) => warn!("Failed to encode voice preference: {}", e),
    }
}
