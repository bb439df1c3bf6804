//! Background/session control channel types.
//!
//! External transport surfaces (media keys, a lock-screen widget, a desktop
//! session integration) deliver [`TransportCommand`]s, each mapping 1:1 onto
//! a facade operation, and mirror now-playing metadata published on every
//! relevant state change.

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCommand {
    Resume,
    Pause,
    NextChapter,
    PreviousChapter,
    Skip { seconds: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub title: String,
    pub cover: Option<PathBuf>,
    pub is_speaking: bool,
    pub chapter_index: usize,
}
