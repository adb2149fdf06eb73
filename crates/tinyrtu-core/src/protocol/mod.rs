//! MODBUS RTU protocol
//!
//! Checksums, the supported function codes and their handlers, and the
//! dispatcher that validates a ready frame before handing it over.
//!
//! Rejected requests never produce an exception response; they are
//! discarded and the poll reports [`Operation::Idle`].

pub mod crc;
mod discard;
mod dispatch;
pub mod function;
pub mod handlers;

use serde::{Deserialize, Serialize};

use crate::frame::OutboundFrame;

pub use discard::Discard;
pub use dispatch::dispatch;
pub use function::FunctionCode;

/// Address + function code + checksum
pub const MIN_FRAME_LEN: usize = 4;

/// Largest register count accepted by a read request
pub const MAX_READ_REGISTERS: u16 = 125;

/// Largest register count accepted by a write request
pub const MAX_WRITE_REGISTERS: u16 = 124;

/// What a poll did to the register store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Operation {
    /// No request was served
    #[default]
    Idle,
    /// Registers were read by the master
    Read,
    /// Registers were written by the master
    Write,
}

impl From<FunctionCode> for Operation {
    fn from(function: FunctionCode) -> Self {
        match function {
            FunctionCode::ReadHoldingRegisters => Operation::Read,
            FunctionCode::WriteMultipleRegisters => Operation::Write,
        }
    }
}

/// Result of one poll: the operation served and the index range it touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AffectedRegisters {
    /// Operation served
    pub operation: Operation,
    /// First affected index in the register store
    pub start_index: u16,
    /// Number of affected registers
    pub count: u16,
}

impl AffectedRegisters {
    /// Nothing served
    pub const IDLE: AffectedRegisters = AffectedRegisters {
        operation: Operation::Idle,
        start_index: 0,
        count: 0,
    };

    /// Describe an operation on `count` registers from `start_index`
    pub fn new(operation: Operation, start_index: u16, count: u16) -> Self {
        Self {
            operation,
            start_index,
            count,
        }
    }

    /// True when the poll served nothing
    pub fn is_idle(&self) -> bool {
        self.operation == Operation::Idle
    }

    /// Affected store indices
    pub fn indices(&self) -> std::ops::Range<usize> {
        if self.is_idle() {
            return 0..0;
        }
        let start = usize::from(self.start_index);
        start..start + usize::from(self.count)
    }
}

/// A sealed reply and the registers it accounts for
#[derive(Debug, Clone)]
pub struct Reply {
    /// Frame to transmit
    pub frame: OutboundFrame,
    /// Registers read or written
    pub affected: AffectedRegisters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_has_no_indices() {
        assert!(AffectedRegisters::IDLE.is_idle());
        assert_eq!(AffectedRegisters::IDLE.indices(), 0..0);
        assert_eq!(AffectedRegisters::default(), AffectedRegisters::IDLE);
    }

    #[test]
    fn test_indices() {
        let affected = AffectedRegisters::new(Operation::Write, 3, 2);
        assert_eq!(affected.indices(), 3..5);
    }

    #[test]
    fn test_operation_from_function() {
        assert_eq!(
            Operation::from(FunctionCode::WriteMultipleRegisters),
            Operation::Write
        );
    }
}
