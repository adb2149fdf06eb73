//! # TinyRTU Core Library
//!
//! A MODBUS RTU slave engine for half-duplex (RS-485) serial links.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Silence-delimited frame assembly driven by byte and timer events
//! - CRC-16/MODBUS validation and generation
//! - Read Holding Registers (0x03) and Write Multiple Registers (0x10)
//! - A fixed holding register window with address/index mapping
//! - Reply transmission with direction-line turnaround guards
//!
//! ## Example
//!
//! ```rust,ignore
//! use tinyrtu_core::{serial::SerialBus, RtuSlave, SlaveConfig, StdDelay};
//!
//! let config: SlaveConfig = serde_json::from_str(&std::fs::read_to_string("slave.json")?)?;
//! let mut bus = SerialBus::open(&config.line, config.timing())?;
//! let slave = RtuSlave::from_config(&config, bus.line(), Box::new(StdDelay))?;
//! bus.start(slave.events())?;
//!
//! loop {
//!     let affected = slave.poll()?;
//!     for change in slave.changes(&affected) {
//!         println!("{} = {}", change.address, change.value);
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod loopback;
pub mod protocol;
pub mod registers;
pub mod serial;
pub mod slave;
pub mod timing;
pub mod transmit;

pub use config::{LineConfig, SlaveConfig};
pub use error::SlaveError;
pub use events::SlaveEvents;
pub use protocol::{AffectedRegisters, Discard, FunctionCode, Operation};
pub use registers::{RegisterStore, RegisterWindow};
pub use slave::{RegisterChange, RtuSlave, SlaveStats};
pub use timing::{Delay, LineTiming, StdDelay};
pub use transmit::{LineDirection, SerialLine};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{LineConfig, SlaveConfig};
    pub use crate::error::SlaveError;
    pub use crate::events::SlaveEvents;
    pub use crate::protocol::{AffectedRegisters, Operation};
    pub use crate::registers::RegisterWindow;
    pub use crate::slave::{RegisterChange, RtuSlave};
    pub use crate::timing::{Delay, LineTiming, StdDelay};
    pub use crate::transmit::{LineDirection, SerialLine};
}
