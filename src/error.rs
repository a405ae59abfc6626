//! Error types for the transcription pipeline

/// Errors raised while turning a waveform into a MIDI file
#[derive(Debug, Clone, thiserror::Error)]
pub enum TranscribeError {
    /// E001: Input path missing or not a regular file
    #[error("E001: Invalid input path - {0}")]
    InvalidPath(String),
    /// E002: Sample layout the downmixer cannot decode
    #[error("E002: Unsupported format - {0}")]
    UnsupportedFormat(String),
    /// E003: Mapping matrix with the wrong shape handed to the scheduler
    #[error("E003: Malformed input - {0}")]
    MalformedInput(String),
    /// E004: Spectral analysis could not reserve its working memory
    #[error("E004: Spectral analysis produced no result - {0}")]
    SpectralAllocation(String),
    /// E005: Audio file I/O error
    #[error("E005: Audio file error - {0}")]
    AudioFile(String),
    /// E006: MIDI serialization or write error
    #[error("E006: MIDI export error - {0}")]
    MidiExport(String),
    /// E007: Pass executed without the output of its predecessor
    #[error("E007: Processing pipeline error - {0}")]
    Pipeline(String),
    /// E008: Configuration validation failed
    #[error("E008: Configuration validation failed - {0}")]
    ConfigValidation(String),
    /// E009: Report or QA artifact export error
    #[error("E009: Report export error - {0}")]
    ReportExport(String),
}

impl From<std::io::Error> for TranscribeError {
    fn from(err: std::io::Error) -> Self {
        TranscribeError::AudioFile(format!("File I/O error: {}", err))
    }
}

impl From<hound::Error> for TranscribeError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::Unsupported => {
                TranscribeError::UnsupportedFormat("unsupported WAV layout".to_string())
            }
            other => TranscribeError::AudioFile(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for TranscribeError {
    fn from(err: serde_json::Error) -> Self {
        TranscribeError::ReportExport(format!("JSON serialization error: {}", err))
    }
}

impl From<anyhow::Error> for TranscribeError {
    fn from(err: anyhow::Error) -> Self {
        TranscribeError::ConfigValidation(err.to_string())
    }
}

/// Result type alias for transcription operations
pub type Result<T> = std::result::Result<T, TranscribeError>;
