//! The playback session facade.
//!
//! One session per open book. Opening spawns the narration driver task;
//! closing flushes persistence and tears it down. Switching books means
//! closing one session and opening another; no playback state outlives a
//! session.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use vellum_foundation::{PlaybackStatus, StatusTracker};
use vellum_text::{clamp_position, Position};
use vellum_tts::{NarrationEngine, VoiceInfo};

use crate::book::{Book, ChunkedBook};
use crate::driver::{self, Command, DriverContext};
use crate::media::{NowPlaying, TransportCommand};
use crate::persistence::{self, ProgressStore};
use crate::settings::Settings;
use crate::sleep_timer::SleepTimer;

/// Read-only view of the session's state, refreshed by the driver on every
/// change.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub status: PlaybackStatus,
    pub position: Position,
    pub current_chunk: String,
    pub chapter_count: usize,
    pub book_progress: f32,
    pub chapter_progress: f32,
    pub error: Option<String>,
    pub voices: Vec<VoiceInfo>,
    pub selected_voice: Option<String>,
    pub rate: f32,
    pub sleep_timer: Option<SleepTimer>,
}

pub struct PlaybackSession {
    cmd_tx: mpsc::Sender<Command>,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    status: Arc<StatusTracker>,
    now_playing_tx: broadcast::Sender<NowPlaying>,
    driver_handle: JoinHandle<()>,
}

impl PlaybackSession {
    /// Open a book for narration. Seeds the position from persisted
    /// progress (chunk-granular: the character index always starts at 0)
    /// and spawns the driver.
    pub fn open<E: NarrationEngine + 'static>(
        book: Book,
        engine: E,
        store: Box<dyn ProgressStore>,
        settings: Settings,
    ) -> Self {
        let book = ChunkedBook::new(book, settings.chunk_budget);

        let saved = persistence::load_progress(store.as_ref(), book.identity_key());
        let initial_position = clamp_position(
            saved
                .map(|p| Position::new(p.chapter_index, p.chunk_index, 0))
                .unwrap_or_default(),
            book.chapters(),
        );
        let prefs = persistence::load_voice_preference(store.as_ref());
        info!(
            "Opening '{}' ({} chapters) at {:?}",
            book.title(),
            book.chapter_count(),
            initial_position
        );

        let status = Arc::new(StatusTracker::new());
        let snapshot = Arc::new(RwLock::new(SessionSnapshot {
            status: PlaybackStatus::Idle,
            position: initial_position,
            current_chunk: book
                .chunk_text(initial_position)
                .unwrap_or_default()
                .to_string(),
            chapter_count: book.chapter_count(),
            book_progress: book.book_progress(initial_position),
            chapter_progress: book.chapter_progress(initial_position),
            error: None,
            voices: Vec::new(),
            selected_voice: None,
            rate: prefs.rate,
            sleep_timer: None,
        }));
        let (now_playing_tx, _) = broadcast::channel(32);
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let ctx = DriverContext {
            book,
            store,
            prefs,
            initial_position,
            settings,
            status: Arc::clone(&status),
            snapshot: Arc::clone(&snapshot),
            now_playing_tx: now_playing_tx.clone(),
        };
        let driver_handle = tokio::spawn(driver::run(engine, ctx, cmd_rx));

        Self {
            cmd_tx,
            snapshot,
            status,
            now_playing_tx,
            driver_handle,
        }
    }

    pub async fn play(&self, chapter: usize, chunk: usize) {
        self.send(Command::Play { chapter, chunk }).await;
    }

    pub async fn pause(&self) {
        self.send(Command::Pause).await;
    }

    pub async fn resume(&self) {
        self.send(Command::Resume).await;
    }

    pub async fn skip(&self, seconds: i64) {
        self.send(Command::Skip { seconds }).await;
    }

    pub async fn jump_to_chapter(&self, chapter: usize) {
        self.send(Command::JumpToChapter { chapter }).await;
    }

    pub async fn set_selected_voice(&self, voice_id: String) {
        self.send(Command::SetVoice { voice_id }).await;
    }

    pub async fn set_playback_rate(&self, rate: f32) {
        self.send(Command::SetRate { rate }).await;
    }

    pub async fn set_sleep_timer(&self, timer: Option<SleepTimer>) {
        self.send(Command::SetSleepTimer { timer }).await;
    }

    /// Map an external transport command onto the facade.
    pub async fn handle_transport(&self, command: TransportCommand) {
        match command {
            TransportCommand::Resume => self.resume().await,
            TransportCommand::Pause => self.pause().await,
            TransportCommand::NextChapter => {
                let chapter = self.snapshot().position.chapter;
                self.jump_to_chapter(chapter + 1).await;
            }
            TransportCommand::PreviousChapter => {
                let chapter = self.snapshot().position.chapter;
                self.jump_to_chapter(chapter.saturating_sub(1)).await;
            }
            TransportCommand::Skip { seconds } => self.skip(seconds).await,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.read().clone()
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status.current()
    }

    pub fn subscribe_status(&self) -> crossbeam_channel::Receiver<PlaybackStatus> {
        self.status.subscribe()
    }

    pub fn subscribe_now_playing(&self) -> broadcast::Receiver<NowPlaying> {
        self.now_playing_tx.subscribe()
    }

    /// Tear the session down, flushing persistence. Waits for the driver to
    /// finish so the store is quiescent when this returns.
    pub async fn close(self) {
        if self.cmd_tx.send(Command::Shutdown).await.is_err() {
            warn!("Playback driver already gone at close");
        }
        let _ = self.driver_handle.await;
    }

    async fn send(&self, cmd: Command) {
        if self.cmd_tx.send(cmd).await.is_err() {
            warn!("Playback driver is gone; command dropped");
        }
    }
}
