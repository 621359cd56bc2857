//! Error types for the aven voice stack

use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur in the voice pipeline or worker runtime
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Room transport error: {0}")]
    Room(String),

    #[error("Access token error: {0}")]
    Token(String),

    #[error("VAD processing error: {0}")]
    VadProcessing(String),

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<livekit::RoomError> for VoiceError {
    fn from(err: livekit::RoomError) -> Self {
        VoiceError::Room(err.to_string())
    }
}
