use std::io;
use thiserror::Error;

/// Engine startup failures. Per-connection I/O errors never surface here.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("No ports could be bound")]
    NoListeners,
}

pub type ServerResult<T> = Result<T, ServerError>;
