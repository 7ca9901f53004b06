//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to the stimulator
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("No matching response within the deadline")]
    Timeout,

    #[error("Not connected to stimulator")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Malformed frame: {0}")]
    Framing(String),

    #[error("CRC mismatch: expected {expected:#04x}, got {actual:#04x}")]
    CrcMismatch { expected: u8, actual: u8 },

    #[error("Invalid parameter: {0}")]
    Validation(String),

    #[error("Connection shut down while a request was pending")]
    Shutdown,

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
