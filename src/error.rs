//! Error types for the client.

use thiserror::Error;

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur while talking to a broker.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error ({addr}): {source}")]
    Connection {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timeout reading from the socket")]
    Timeout,

    #[error("Connection closed by peer after {received} of {expected} bytes")]
    ConnectionClosed { received: usize, expected: usize },

    #[error("Not connected")]
    NotConnected,

    #[error("Checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl ClientError {
    /// True for write failures the transport retries once after reconnecting.
    pub fn is_reset(err: &std::io::Error) -> bool {
        matches!(
            err.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::ConnectionAborted
        )
    }
}
