use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Demux error: {0}")]
    Demux(String),

    #[error("WebRTC error: {0}")]
    WebRtc(String),

    #[error("Session error: {0}")]
    Session(String),
}

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, AppError>;
