use std::io;

use thiserror::Error;

/// Failures of the serial link. The `Display` text is what ends up in
/// [`ConnectionState::Error`](crate::state::ConnectionState::Error).
#[derive(Debug, Error)]
pub enum SerialError {
    #[error("serial ports are not supported in this environment")]
    Unsupported,
    #[error("no port selected")]
    NoPortSelected,
    /// The user cancelled the selection or the host refused it; the two can't be told apart.
    #[error("couldn't select a serial port: {0}")]
    Selection(String),
    #[error("already connected")]
    AlreadyConnected,
    #[error("couldn't open serial port: {0}")]
    Open(String),
    #[error("port not connected")]
    NotConnected,
    #[error("Read error: {0}")]
    Read(#[source] io::Error),
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
    #[error("couldn't close serial port: {0}")]
    Close(String),
}
