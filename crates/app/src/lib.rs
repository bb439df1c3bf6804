pub mod book;
pub mod driver;
pub mod media;
pub mod persistence;
pub mod session;
pub mod settings;
pub mod sleep_timer;
pub mod voices;
pub mod watchdog;

pub use book::{Book, ChunkedBook};
pub use media::{NowPlaying, TransportCommand};
pub use persistence::{FileStore, MemoryStore, ProgressStore, VoicePreference};
pub use session::{PlaybackSession, SessionSnapshot};
pub use settings::Settings;
pub use sleep_timer::SleepTimer;
