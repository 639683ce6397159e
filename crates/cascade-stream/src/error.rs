//! Stream layer error types

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while opening or reading a data handle
#[derive(Error, Debug)]
pub enum StreamError {
    /// File could not be opened or stat'ed
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No recognizable stream header at the start of the file
    #[error("No recognizable audio header in {0}")]
    NoHeader(PathBuf),

    /// Stream metadata is readable but describes an unusable layout
    #[error("Unsupported stream layout: {0}")]
    UnsupportedLayout(String),

    /// Stream opened cleanly but contains zero decodable values
    #[error("Stream contains no decodable data")]
    NoData,

    /// The open-time forward scan could not produce a seek table
    #[error("Failed to build seek table: {0}")]
    NoSeekInfo(String),

    /// Repositioning within the stream failed
    #[error("Seek to value offset {0} failed")]
    SeekFailed(u64),

    /// Decoder rejected a frame/packet and sync could not be recovered
    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    /// Filter design for a derived handle failed
    #[error("Filter design failed: {0}")]
    Design(#[from] cascade_dsp::DesignError),

    /// Operation requires an open handle
    #[error("Handle is not open")]
    NotOpen,

    /// Underlying I/O error
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result type for data handle operations
pub type StreamResult<T> = Result<T, StreamError>;

impl From<symphonia::core::errors::Error> for StreamError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        use symphonia::core::errors::Error;
        match err {
            Error::IoError(e) => StreamError::Io(e),
            Error::SeekError(e) => StreamError::DecodeFailed(format!("seek: {e:?}")),
            other => StreamError::DecodeFailed(other.to_string()),
        }
    }
}
