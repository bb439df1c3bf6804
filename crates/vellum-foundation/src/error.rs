use thiserror::Error;

/// Playback-level faults. Nothing here escapes to callers as a panic or a
/// thrown error; the driver renders faults into its single error observable.
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("narration engine '{0}' is not available")]
    EngineUnavailable(String),

    #[error("narration failed: {0}")]
    Narration(String),

    #[error("invalid status transition: {0}")]
    InvalidTransition(String),
}
