//! Supported function codes
//!
//! The slave answers a closed set of function codes. Each code maps to the
//! handler that validates the request payload and builds the reply.

use serde::{Deserialize, Serialize};

use super::handlers::{read_holding_registers, write_multiple_registers, Handler};

/// Function codes this slave answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FunctionCode {
    /// Read holding registers (0x03)
    ReadHoldingRegisters = 0x03,
    /// Write multiple registers (0x10)
    WriteMultipleRegisters = 0x10,
}

impl FunctionCode {
    /// Every supported code
    pub const ALL: [FunctionCode; 2] = [
        FunctionCode::ReadHoldingRegisters,
        FunctionCode::WriteMultipleRegisters,
    ];

    /// Wire value
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Handler serving this code
    pub fn handler(self) -> Handler {
        match self {
            FunctionCode::ReadHoldingRegisters => read_holding_registers,
            FunctionCode::WriteMultipleRegisters => write_multiple_registers,
        }
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|f| f.code() == code)
            .ok_or(code)
    }
}

impl std::fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionCode::ReadHoldingRegisters => write!(f, "Read Holding Registers"),
            FunctionCode::WriteMultipleRegisters => write!(f, "Write Multiple Registers"),
        }
    }
}
