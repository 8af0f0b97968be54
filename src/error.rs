use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub(crate) enum AcquisitionError {
    #[error("network failure while fetching video: {0}")]
    Network(String),

    #[error("unsupported url: {0}")]
    UnsupportedUrl(String),

    #[error("video is too long: {duration:.1}s exceeds the {limit:.0}s limit")]
    PolicyRejected { duration: f64, limit: f64 },

    #[error("download failed: {0}")]
    Unknown(String),
}

impl AcquisitionError {
    pub(crate) fn reason(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::UnsupportedUrl(_) => "unsupported-url",
            Self::PolicyRejected { .. } => "policy-rejected",
            Self::Unknown(_) => "unknown",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum LibraryError {
    #[error("no downloaded video named {name:?} in {dir}")]
    NotFound { name: String, dir: PathBuf },

    #[error("failed to read video directory {dir}: {source}")]
    Io { dir: PathBuf, source: io::Error },
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum StoreError {
    #[error("failed to prepare artifact directory {path}: {source}")]
    Prepare { path: PathBuf, source: io::Error },

    #[error("failed to remove artifact {path}: {source}")]
    Remove { path: PathBuf, source: io::Error },

    #[error("failed to write artifact {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to read artifact {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ExtractionError {
    #[error("cannot read video {path}: {message}")]
    UnreadableVideo { path: PathBuf, message: String },

    #[error("failed to capture frame at {second}s: {message}")]
    FrameCapture { second: u32, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ExtractionError {
    pub(crate) fn reason(&self) -> &'static str {
        match self {
            Self::UnreadableVideo { .. } => "unreadable-video",
            Self::FrameCapture { .. } => "frame-capture",
            Self::Store(_) => "artifact-store",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum TranscriptionError {
    #[error("failed to encode audio track: {0}")]
    EncodeFailed(String),

    #[error("transcription service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("transcription service error: {0}")]
    ServiceError(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TranscriptionError {
    pub(crate) fn reason(&self) -> &'static str {
        match self {
            Self::EncodeFailed(_) => "encode-failed",
            Self::ServiceUnavailable(_) => "service-unavailable",
            Self::ServiceError(_) => "service-error",
            Self::Store(_) => "artifact-store",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum AnnotateError {
    #[error("artifact reset failed: {0}")]
    Reset(#[from] StoreError),

    #[error("frame extraction failed ({reason}): {0}", reason = .0.reason())]
    Extraction(#[from] ExtractionError),

    #[error("transcription failed ({reason}): {0}", reason = .0.reason())]
    Transcription(#[from] TranscriptionError),
}
