//! Engine errors

use std::time::Duration;

use thiserror::Error;

use crate::protocol::AffectedRegisters;

/// Errors raised while configuring the engine or driving the serial line.
///
/// Malformed or unacceptable requests are not errors: they are discarded
/// and reported to the host as an idle poll (see [`crate::protocol::Discard`]).
#[derive(Error, Debug)]
pub enum SlaveError {
    #[error("Invalid register window: start {start}, length {length}")]
    InvalidWindow { start: u16, length: u32 },

    #[error("Register index {index} out of range (window holds {len} registers)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Register address {0} is outside the configured window")]
    AddressOutOfWindow(u16),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Line error: {0}")]
    LineError(String),

    #[error("Transmission timed out after {elapsed:?} ({sent}/{total} bytes sent)")]
    TransmitTimeout {
        sent: usize,
        total: usize,
        elapsed: Duration,
    },

    #[error("Reply exceeds the {0}-byte transmit buffer")]
    ReplyTooLong(usize),

    /// The request was served but its reply did not make it onto the line.
    /// A write has already been applied to the store.
    #[error("Reply for {affected:?} failed: {source}")]
    ReplyFailed {
        affected: AffectedRegisters,
        #[source]
        source: Box<SlaveError>,
    },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SlaveError {
    /// Registers a failed reply accounted for, if the request was served
    pub fn affected(&self) -> Option<AffectedRegisters> {
        match self {
            SlaveError::ReplyFailed { affected, .. } => Some(*affected),
            _ => None,
        }
    }
}

impl From<serialport::Error> for SlaveError {
    fn from(e: serialport::Error) -> Self {
        SlaveError::SerialError(e.to_string())
    }
}
