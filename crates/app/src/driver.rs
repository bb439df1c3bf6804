//! The narration driver: one task owning all mutable playback state.
//!
//! The external engine is stateful, asynchronous, and allowed to misbehave:
//! completion callbacks may arrive late, out of order, or never. The driver
//! therefore runs everything through a single `select!` loop (facade
//! commands, engine events, internal signals, and a one-second housekeeping
//! tick) and tags every issued segment with a monotonically increasing
//! utterance id so callbacks from superseded segments are discarded.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, sleep, Duration, Instant};
use tracing::{debug, info, warn};

use vellum_foundation::{PlaybackError, PlaybackStatus, StatusTracker};
use vellum_text::{advance_offset, chars_for_seconds, clamp_position, Position};
use vellum_tts::{NarrationEngine, NarrationEvent, NarrationOptions, VoiceInfo};

use crate::book::ChunkedBook;
use crate::media::NowPlaying;
use crate::persistence::{self, ProgressStore, VoicePreference};
use crate::session::SessionSnapshot;
use crate::settings::Settings;
use crate::sleep_timer::{self, SleepTimer};
use crate::voices;
use crate::watchdog::StallWatchdog;

/// Facade operations, delivered over the session's command channel.
#[derive(Debug)]
pub(crate) enum Command {
    Play { chapter: usize, chunk: usize },
    Pause,
    Resume,
    Skip { seconds: i64 },
    JumpToChapter { chapter: usize },
    SetVoice { voice_id: String },
    SetRate { rate: f32 },
    SetSleepTimer { timer: Option<SleepTimer> },
    Shutdown,
}

/// Signals the driver sends itself: delayed narration starts and watchdog
/// stall reports.
#[derive(Debug)]
pub enum DriverSignal {
    DebouncedSpeak { generation: u64 },
    Stalled { utterance_id: u64 },
}

/// Everything the session hands the driver at spawn time.
pub(crate) struct DriverContext {
    pub book: ChunkedBook,
    pub store: Box<dyn ProgressStore>,
    pub prefs: VoicePreference,
    pub initial_position: Position,
    pub settings: Settings,
    pub status: Arc<StatusTracker>,
    pub snapshot: Arc<RwLock<SessionSnapshot>>,
    pub now_playing_tx: broadcast::Sender<NowPlaying>,
}

pub(crate) async fn run<E: NarrationEngine>(engine: E, ctx: DriverContext, mut cmd_rx: mpsc::Receiver<Command>) {
    let (signal_tx, mut signal_rx) = mpsc::channel(16);
    let mut engine_rx = engine.subscribe();

    let watchdog = StallWatchdog::new(ctx.settings.watchdog_floor_ms, ctx.settings.watchdog_margin_ms);
    let mut driver = NarrationDriver {
        engine,
        engine_available: false,
        book: ctx.book,
        store: ctx.store,
        prefs: ctx.prefs,
        selected_voice: None,
        voices: Vec::new(),
        position: ctx.initial_position,
        sleep_timer: None,
        error: None,
        current_utterance: None,
        segment_base: 0,
        restart_generation: 0,
        watchdog,
        last_save: Instant::now(),
        status: ctx.status,
        snapshot: ctx.snapshot,
        now_playing_tx: ctx.now_playing_tx,
        signal_tx,
        settings: ctx.settings,
    };

    driver.initialize().await;

    let mut tick = interval(Duration::from_secs(1));
    tick.tick().await;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Shutdown) | None => break,
                Some(cmd) => driver.handle_command(cmd).await,
            },
            Some(signal) = signal_rx.recv() => driver.handle_signal(signal).await,
            event = engine_rx.recv() => match event {
                Ok(event) => driver.handle_engine_event(event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Dropped {} engine events; resynchronizing", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tick.tick() => driver.handle_tick().await,
        }
    }

    driver.teardown().await;
}

struct NarrationDriver<E: NarrationEngine> {
    engine: E,
    engine_available: bool,
    book: ChunkedBook,
    store: Box<dyn ProgressStore>,
    prefs: VoicePreference,
    selected_voice: Option<String>,
    voices: Vec<VoiceInfo>,
    position: Position,
    sleep_timer: Option<SleepTimer>,
    error: Option<String>,
    /// Id of the utterance currently in flight, if any. Engine events
    /// carrying any other id are stale.
    current_utterance: Option<u64>,
    /// Character offset within the chunk where the in-flight utterance
    /// started; engine progress offsets are relative to it.
    segment_base: usize,
    /// Bumped on every cancel-then-restart; a debounced start whose
    /// generation no longer matches has been superseded.
    restart_generation: u64,
    watchdog: StallWatchdog,
    last_save: Instant,
    status: Arc<StatusTracker>,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    now_playing_tx: broadcast::Sender<NowPlaying>,
    signal_tx: mpsc::Sender<DriverSignal>,
    settings: Settings,
}

impl<E: NarrationEngine> NarrationDriver<E> {
    async fn initialize(&mut self) {
        if !self.engine.is_available().await {
            warn!("Narration engine '{}' is not available; playback disabled", self.engine.name());
            self.error =
                Some(PlaybackError::EngineUnavailable(self.engine.name().to_string()).to_string());
            self.publish_snapshot();
            return;
        }
        self.engine_available = true;

        self.voices = voices::wait_for_voices(&self.engine).await;
        self.selected_voice = voices::select_voice(
            &self.voices,
            self.prefs.voice_id.as_deref(),
            &self.settings.preferred_voice_prefix,
            &self.settings.base_language_prefix,
        );
        if self.selected_voice != self.prefs.voice_id {
            self.prefs.voice_id = self.selected_voice.clone();
            persistence::save_voice_preference(self.store.as_mut(), &self.prefs);
        }
        info!(
            "Narration ready: {} voices, selected {:?}, rate {}",
            self.voices.len(),
            self.selected_voice,
            self.prefs.rate
        );
        self.publish_snapshot();
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Play { chapter, chunk } => self.play(chapter, chunk).await,
            Command::Pause => self.pause().await,
            Command::Resume => self.resume().await,
            Command::Skip { seconds } => self.skip(seconds).await,
            Command::JumpToChapter { chapter } => self.jump_to_chapter(chapter).await,
            Command::SetVoice { voice_id } => self.set_voice(voice_id),
            Command::SetRate { rate } => self.set_rate(rate).await,
            Command::SetSleepTimer { timer } => self.set_sleep_timer(timer),
            Command::Shutdown => {}
        }
    }

    async fn play(&mut self, chapter: usize, chunk: usize) {
        if !self.engine_available {
            return;
        }
        self.error = None;
        self.position = clamp_position(Position::new(chapter, chunk, 0), self.book.chapters());
        self.set_status(PlaybackStatus::Speaking);
        self.restart_narration().await;
    }

    async fn pause(&mut self) {
        if self.status.current() != PlaybackStatus::Speaking {
            return;
        }
        self.watchdog.disarm();
        if self.current_utterance.is_some() {
            if let Err(e) = self.engine.pause().await {
                warn!("Engine pause failed: {}", e);
            }
        }
        self.set_status(PlaybackStatus::Paused);
        self.save_progress();
    }

    async fn resume(&mut self) {
        if !self.engine_available || self.status.current() != PlaybackStatus::Paused {
            return;
        }
        self.set_status(PlaybackStatus::Speaking);
        match self.current_utterance {
            Some(utterance_id) => {
                if let Err(e) = self.engine.resume().await {
                    warn!("Engine resume failed: {}", e);
                }
                let remaining = self.remaining_chars();
                self.watchdog
                    .arm(utterance_id, remaining, self.prefs.rate, self.signal_tx.clone());
            }
            // The paused utterance was cancelled by an intervening seek;
            // start fresh from the stored position.
            None => self.start_segment().await,
        }
    }

    async fn skip(&mut self, seconds: i64) {
        if !self.engine_available {
            return;
        }
        let offset = chars_for_seconds(seconds, self.prefs.rate);
        self.position = advance_offset(self.position, self.book.chapters(), offset);
        debug!(seconds, offset, "Skipped to {:?}", self.position);
        self.after_seek().await;
    }

    async fn jump_to_chapter(&mut self, chapter: usize) {
        if !self.engine_available {
            return;
        }
        let chapter = chapter.min(self.book.chapter_count().saturating_sub(1));
        self.position = Position::chapter_start(chapter);
        debug!("Jumped to chapter {}", chapter);
        self.after_seek().await;
    }

    /// Shared tail of every seek: restart while speaking, otherwise drop the
    /// now-stale utterance so the next resume starts fresh.
    async fn after_seek(&mut self) {
        if self.status.current() == PlaybackStatus::Speaking {
            self.restart_narration().await;
        } else {
            self.watchdog.disarm();
            self.current_utterance = None;
            if let Err(e) = self.engine.cancel().await {
                warn!("Cancel after seek failed: {}", e);
            }
            self.publish_snapshot();
        }
    }

    fn set_voice(&mut self, voice_id: String) {
        if !self.voices.is_empty() && !self.voices.iter().any(|v| v.id == voice_id) {
            warn!("Ignoring unknown voice '{}'", voice_id);
            return;
        }
        // Takes effect from the next segment.
        self.selected_voice = Some(voice_id.clone());
        self.prefs.voice_id = Some(voice_id);
        persistence::save_voice_preference(self.store.as_mut(), &self.prefs);
        self.publish_snapshot();
    }

    async fn set_rate(&mut self, rate: f32) {
        let rate = rate.clamp(vellum_tts::MIN_RATE, vellum_tts::MAX_RATE);
        self.prefs.rate = rate;
        persistence::save_voice_preference(self.store.as_mut(), &self.prefs);
        if let Err(e) = self.engine.set_rate(rate).await {
            debug!("Engine deferred rate change: {}", e);
        }
        self.publish_snapshot();
    }

    fn set_sleep_timer(&mut self, timer: Option<SleepTimer>) {
        self.sleep_timer = match timer {
            Some(SleepTimer::Countdown(0)) => None,
            other => other,
        };
        self.publish_snapshot();
    }

    /// Cancel whatever is in flight and schedule a fresh start for the
    /// current position after the debounce delay. The engine needs the gap
    /// to settle after a cancel; the generation check discards starts that a
    /// later command has superseded in the meantime.
    async fn restart_narration(&mut self) {
        self.watchdog.disarm();
        self.current_utterance = None;
        if let Err(e) = self.engine.cancel().await {
            warn!("Cancel before restart failed: {}", e);
        }

        self.restart_generation += 1;
        let generation = self.restart_generation;
        let debounce = Duration::from_millis(self.settings.debounce_ms);
        let signal_tx = self.signal_tx.clone();
        tokio::spawn(async move {
            sleep(debounce).await;
            let _ = signal_tx.send(DriverSignal::DebouncedSpeak { generation }).await;
        });
    }

    async fn handle_signal(&mut self, signal: DriverSignal) {
        match signal {
            DriverSignal::DebouncedSpeak { generation } => {
                if generation != self.restart_generation
                    || self.status.current() != PlaybackStatus::Speaking
                {
                    debug!("Discarding superseded narration start");
                    return;
                }
                self.start_segment().await;
            }
            DriverSignal::Stalled { utterance_id } => {
                if self.current_utterance != Some(utterance_id)
                    || self.status.current() != PlaybackStatus::Speaking
                {
                    return;
                }
                warn!(utterance_id, "Narration stalled; forcing segment completion");
                self.finish_segment().await;
            }
        }
    }

    async fn handle_engine_event(&mut self, event: NarrationEvent) {
        if Some(event.utterance_id()) != self.current_utterance {
            debug!("Ignoring event from superseded utterance {}", event.utterance_id());
            return;
        }
        match event {
            NarrationEvent::Started { .. } => self.watchdog.feed(),
            NarrationEvent::Progress { char_offset, .. } => {
                let chunk_len = self
                    .book
                    .chunk_text(self.position)
                    .map(|c| c.chars().count())
                    .unwrap_or(0);
                self.position.char_offset = (self.segment_base + char_offset).min(chunk_len);
                self.watchdog.feed();
                self.publish_snapshot();
            }
            NarrationEvent::Ended { .. } => self.finish_segment().await,
            NarrationEvent::Failed { kind, message, .. } => {
                if kind.is_benign() {
                    debug!("Benign narration interruption: {}", message);
                } else {
                    warn!("Narration fault: {}", message);
                    self.watchdog.disarm();
                    self.current_utterance = None;
                    self.error = Some(PlaybackError::Narration(message).to_string());
                    self.set_status(PlaybackStatus::Idle);
                }
            }
        }
    }

    /// The completion path, entered for a real `Ended` event or synthesized
    /// by the watchdog.
    async fn finish_segment(&mut self) {
        if self.status.current() != PlaybackStatus::Speaking {
            return;
        }
        self.watchdog.disarm();
        self.current_utterance = None;

        let chapter_exhausted =
            self.position.chunk + 1 >= self.book.chunk_count(self.position.chapter);
        if chapter_exhausted && matches!(self.sleep_timer, Some(SleepTimer::EndOfChapter)) {
            self.sleep_timer = None;
            info!("Sleep timer: chapter finished; pausing");
            if let Some(next) = self.next_position() {
                self.position = next;
            }
            self.set_status(PlaybackStatus::Paused);
            self.save_progress();
            return;
        }

        match self.next_position() {
            Some(next) => {
                self.position = next;
                self.start_segment().await;
            }
            None => {
                info!("Book finished");
                self.set_status(PlaybackStatus::Idle);
                self.save_progress();
            }
        }
    }

    /// Position of the next narratable chunk, if the book has one.
    fn next_position(&self) -> Option<Position> {
        if self.position.chunk + 1 < self.book.chunk_count(self.position.chapter) {
            return Some(Position::new(self.position.chapter, self.position.chunk + 1, 0));
        }
        self.book
            .next_chapter_with_chunks(self.position.chapter + 1)
            .map(Position::chapter_start)
    }

    /// Tail of the chunk at the current position, from the resume character
    /// onward.
    fn segment_text(&self) -> Option<String> {
        self.book
            .chunk_text(self.position)
            .map(|chunk| chunk.chars().skip(self.position.char_offset).collect())
    }

    /// Issue narration for the chunk tail at the current position.
    async fn start_segment(&mut self) {
        loop {
            let Some(text) = self.segment_text() else {
                info!("Nothing narratable at {:?}; going idle", self.position);
                self.set_status(PlaybackStatus::Idle);
                self.save_progress();
                return;
            };
            if text.is_empty() {
                // Resume point sits at the very end of the chunk.
                match self.next_position() {
                    Some(next) => {
                        self.position = next;
                        continue;
                    }
                    None => {
                        self.set_status(PlaybackStatus::Idle);
                        self.save_progress();
                        return;
                    }
                }
            }

            let options = NarrationOptions {
                voice: self.selected_voice.clone(),
                rate: self.prefs.rate,
            };
            match self.engine.speak(&text, &options).await {
                Ok(utterance_id) => {
                    self.current_utterance = Some(utterance_id);
                    self.segment_base = self.position.char_offset;
                    self.watchdog.arm(
                        utterance_id,
                        text.chars().count(),
                        self.prefs.rate,
                        self.signal_tx.clone(),
                    );
                    debug!(
                        utterance_id,
                        chapter = self.position.chapter,
                        chunk = self.position.chunk,
                        "Narrating segment"
                    );
                    self.publish_snapshot();
                    self.publish_now_playing();
                }
                Err(e) => {
                    warn!("Narration request failed: {}", e);
                    self.error = Some(PlaybackError::Narration(e.to_string()).to_string());
                    self.set_status(PlaybackStatus::Idle);
                }
            }
            return;
        }
    }

    async fn handle_tick(&mut self) {
        let speaking = self.status.current() == PlaybackStatus::Speaking;

        if speaking && self.sleep_timer.is_some() {
            if sleep_timer::tick(&mut self.sleep_timer) {
                info!("Sleep timer expired; pausing");
                self.pause().await;
                return;
            }
            self.publish_snapshot();
        }

        if matches!(
            self.status.current(),
            PlaybackStatus::Speaking | PlaybackStatus::Paused
        ) && self.last_save.elapsed() >= Duration::from_secs(self.settings.save_interval_secs)
        {
            self.save_progress();
        }
    }

    fn remaining_chars(&self) -> usize {
        self.book
            .chunk_text(self.position)
            .map(|c| c.chars().count().saturating_sub(self.position.char_offset))
            .unwrap_or(0)
    }

    fn save_progress(&mut self) {
        persistence::save_progress(
            self.store.as_mut(),
            self.book.identity_key(),
            self.position.chapter,
            self.position.chunk,
        );
        self.last_save = Instant::now();
    }

    fn set_status(&mut self, status: PlaybackStatus) {
        if let Err(e) = self.status.transition(status) {
            warn!("{}", e);
            return;
        }
        self.publish_snapshot();
        self.publish_now_playing();
    }

    fn publish_snapshot(&self) {
        let mut snapshot = self.snapshot.write();
        snapshot.status = self.status.current();
        snapshot.position = self.position;
        snapshot.current_chunk = self
            .book
            .chunk_text(self.position)
            .unwrap_or_default()
            .to_string();
        snapshot.book_progress = self.book.book_progress(self.position);
        snapshot.chapter_progress = self.book.chapter_progress(self.position);
        snapshot.error = self.error.clone();
        snapshot.voices = self.voices.clone();
        snapshot.selected_voice = self.selected_voice.clone();
        snapshot.rate = self.prefs.rate;
        snapshot.sleep_timer = self.sleep_timer;
    }

    fn publish_now_playing(&self) {
        let _ = self.now_playing_tx.send(NowPlaying {
            title: self.book.title().to_string(),
            cover: self.book.cover().map(|p| p.to_path_buf()),
            is_speaking: self.status.current() == PlaybackStatus::Speaking,
            chapter_index: self.position.chapter,
        });
    }

    async fn teardown(mut self) {
        self.watchdog.disarm();
        if self.engine_available {
            if let Err(e) = self.engine.cancel().await {
                debug!("Cancel during teardown failed: {}", e);
            }
        }
        self.save_progress();
        let _ = self.status.transition(PlaybackStatus::Idle);
        self.publish_snapshot();
        info!("Playback session for '{}' torn down", self.book.title());
    }
}
