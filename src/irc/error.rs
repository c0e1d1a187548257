use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IrcError {
    #[error("IRC connection timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("IRC connection failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("TLS handshake failed: {0}")]
    Tls(String),
    #[error("This client is not running")]
    NotRunning,
    #[error("This client is already running (or still starting)")]
    AlreadyRunning,
    #[error("This client has terminated; construct a new one to reconnect")]
    Terminated,
    #[error("IRC server sent malformed message: '{0}'")]
    MalformedLine(String),
    #[error("Outgoing line contains a line break")]
    InvalidLine,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = IrcError> = std::result::Result<T, E>;
