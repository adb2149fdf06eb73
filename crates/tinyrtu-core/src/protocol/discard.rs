//! Reasons a received frame is dropped without a reply

use thiserror::Error;

/// Why a frame was discarded.
///
/// Every variant is handled the same way: nothing is sent, nothing is
/// mutated and the poll reports idle. The variant only feeds diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Discard {
    #[error("Frame too short: {0} bytes")]
    TooShort(usize),

    #[error("Frame addressed to instrument {0}")]
    AddressMismatch(u8),

    #[error("CRC mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("Unsupported function code {0:#04x}")]
    UnsupportedFunction(u8),

    #[error("Payload too short: need {needed} bytes, got {actual}")]
    PayloadTooShort { needed: usize, actual: usize },

    #[error("Declared byte count {declared} does not match {count} registers")]
    ByteCountMismatch { declared: u8, count: u16 },

    #[error("Register quantity {count} exceeds {max}")]
    QuantityOutOfLimits { count: u16, max: u16 },

    #[error("Registers {start}+{count} fall outside the window")]
    OutsideWindow { start: u16, count: u16 },
}
