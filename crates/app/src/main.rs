use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use vellum_app::{
    Book, FileStore, PlaybackSession, Settings, SleepTimer, TransportCommand,
};
use vellum_tts_espeak::EspeakEngine;

#[derive(Parser, Debug)]
#[command(name = "vellum", about = "Narrated book reader")]
struct Cli {
    /// Plain-text book; chapters separated by blank-line runs
    book: PathBuf,

    /// TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for saved progress and preferences
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "vellum.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();
    std::mem::forget(guard);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging().map_err(|e| anyhow::anyhow!("{}", e))?;
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::from_path(path).map_err(anyhow::Error::msg)?,
        None => Settings::default(),
    };
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }

    let book = Book::from_text_file(&cli.book)?;
    info!("Loaded '{}': {} chapters", book.title, book.chapters.len());

    let engine = EspeakEngine::new();
    let store = FileStore::new(settings.data_dir.clone())?;
    let session = PlaybackSession::open(book, engine, Box::new(store), settings);

    let status_rx = session.subscribe_status();
    std::thread::spawn(move || {
        for status in status_rx {
            info!("Playback status: {:?}", status);
        }
    });

    let mut now_playing_rx = session.subscribe_now_playing();
    tokio::spawn(async move {
        while let Ok(now_playing) = now_playing_rx.recv().await {
            debug!(
                "Now playing: '{}' chapter {} (speaking: {})",
                now_playing.title, now_playing.chapter_index, now_playing.is_speaking
            );
        }
    });

    let start = session.snapshot().position;
    session.play(start.chapter, start.chunk).await;
    println!("commands: p(ause) r(esume) s <±secs> n(ext) b(ack) t <secs|chapter|off> v <voice> x <rate> i(nfo) q(uit)");

    let mut lines = tokio::io::AsyncBufReadExt::lines(tokio::io::BufReader::new(tokio::io::stdin()));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; shutting down");
                break;
            }
            line = lines.next_line() => match line? {
                None => break,
                Some(line) => {
                    if !handle_line(&session, line.trim()).await {
                        break;
                    }
                }
            },
        }
    }

    session.close().await;
    Ok(())
}

async fn handle_line(session: &PlaybackSession, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("p") => session.pause().await,
        Some("r") => session.resume().await,
        Some("s") => {
            if let Some(Ok(seconds)) = parts.next().map(str::parse::<i64>) {
                session.skip(seconds).await;
            }
        }
        Some("n") => session.handle_transport(TransportCommand::NextChapter).await,
        Some("b") => session.handle_transport(TransportCommand::PreviousChapter).await,
        Some("t") => match parts.next() {
            Some("off") => session.set_sleep_timer(None).await,
            Some("chapter") => session.set_sleep_timer(Some(SleepTimer::EndOfChapter)).await,
            Some(secs) => {
                if let Ok(secs) = secs.parse() {
                    session.set_sleep_timer(Some(SleepTimer::Countdown(secs))).await;
                }
            }
            None => {}
        },
        Some("v") => {
            if let Some(voice_id) = parts.next() {
                session.set_selected_voice(voice_id.to_string()).await;
            }
        }
        Some("x") => {
            if let Some(Ok(rate)) = parts.next().map(str::parse::<f32>) {
                session.set_playback_rate(rate).await;
            }
        }
        Some("i") => {
            let snapshot = session.snapshot();
            println!(
                "{:?} ch {}/{} ({:.0}% of chapter, {:.0}% of book)",
                snapshot.status,
                snapshot.position.chapter + 1,
                snapshot.chapter_count,
                snapshot.chapter_progress * 100.0,
                snapshot.book_progress * 100.0
            );
            if let Some(error) = &snapshot.error {
                println!("error: {}", error);
            }
            println!("> {}", snapshot.current_chunk);
        }
        Some("q") => return false,
        Some(_) | None => {
            println!("commands: p r s <±secs> n b t <secs|chapter|off> v <voice> x <rate> i q");
        }
    }
    true
}
