use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Capture backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Probe failed: {0}")]
    ProbeFailed(String),

    #[error("Replay disallowed: {0}")]
    ReplayDisallowed(String),

    #[error("No pending highlights to build a replay from")]
    NothingToReplay,

    #[error("Replay id space exhausted")]
    ReplayIdsExhausted,

    #[error("Replay window must be greater than zero")]
    EmptyWindow,

    #[error("Highlights carry no event offsets")]
    NoEvents,

    #[error("No clips produced")]
    NoClipsProduced,

    #[error("Deadline exceeded waiting for {0}")]
    DeadlineExceeded(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transcoder error: {0}")]
    Transcoder(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
