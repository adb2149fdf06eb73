//! Slave configuration

use serde::{Deserialize, Serialize};

use crate::error::SlaveError;
use crate::registers::RegisterWindow;
use crate::timing::LineTiming;

/// Default baud rate for the RS-485 link
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

/// Serial channel settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineConfig {
    /// Serial port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub port_name: String,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Everything needed to construct a slave
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaveConfig {
    /// Instrument address and register window
    #[serde(flatten)]
    pub window: RegisterWindow,
    /// Serial channel
    #[serde(default)]
    pub line: LineConfig,
    /// Explicit timing; derived from the baud rate when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<LineTiming>,
}

impl SlaveConfig {
    /// Configuration for `window_length` registers from `window_start`
    pub fn new(
        instrument_address: u8,
        window_start: u16,
        window_length: u32,
        line: LineConfig,
    ) -> Result<Self, SlaveError> {
        Ok(Self {
            window: RegisterWindow::new(instrument_address, window_start, window_length)?,
            line,
            timing: None,
        })
    }

    /// Timing in effect: the explicit override, or one sized to the baud rate
    pub fn timing(&self) -> LineTiming {
        self.timing
            .unwrap_or_else(|| LineTiming::for_baud(self.line.baud_rate))
    }

    /// Check settings the window itself cannot
    pub fn validate(&self) -> Result<(), SlaveError> {
        if self.line.baud_rate == 0 {
            return Err(SlaveError::InvalidConfig("baud rate must be non-zero".into()));
        }
        let timing = self.timing();
        if timing.tick_us == 0 || timing.silence_ticks == 0 {
            return Err(SlaveError::InvalidConfig(
                "silence timer needs a non-zero tick and threshold".into(),
            ));
        }
        Ok(())
    }
}
