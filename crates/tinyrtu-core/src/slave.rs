//! RTU slave engine
//!
//! Ties the frame assembler, dispatcher, register store and transmitter
//! together behind a single [`RtuSlave::poll`] entry point.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::config::SlaveConfig;
use crate::error::SlaveError;
use crate::events::{lock, Link, SlaveEvents};
use crate::protocol::{dispatch, AffectedRegisters, Reply};
use crate::registers::{RegisterStore, RegisterWindow};
use crate::timing::{Delay, LineTiming};
use crate::transmit::{SerialLine, Transmitter};

/// A register value paired with its absolute address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterChange {
    /// Absolute register address
    pub address: u16,
    /// Register value
    pub value: u16,
}

/// Traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaveStats {
    /// Silence-delimited frames taken for dispatch
    pub frames_received: u64,
    /// Replies fully transmitted
    pub replies_sent: u64,
    /// Frames dropped without a reply
    pub frames_discarded: u64,
    /// Bytes lost because the receive buffer was full
    pub bytes_dropped: u64,
    /// Replies that failed on the line
    pub transmit_failures: u64,
}

/// MODBUS RTU slave serving one instrument address and one register window
pub struct RtuSlave {
    window: RegisterWindow,
    registers: Mutex<RegisterStore>,
    link: Arc<Link>,
    transmitter: Mutex<Transmitter>,
    stats: Mutex<SlaveStats>,
}

impl RtuSlave {
    /// Create a slave on `line`, with every register zeroed
    pub fn new(
        window: RegisterWindow,
        timing: LineTiming,
        line: Box<dyn SerialLine>,
        delay: Box<dyn Delay>,
    ) -> Self {
        let link = Arc::new(Link::new(timing.silence_ticks, line));
        Self {
            window,
            registers: Mutex::new(RegisterStore::new(window)),
            transmitter: Mutex::new(Transmitter::new(link.clone(), delay, timing)),
            link,
            stats: Mutex::new(SlaveStats::default()),
        }
    }

    /// Create a slave from a validated configuration
    pub fn from_config(
        config: &SlaveConfig,
        line: Box<dyn SerialLine>,
        delay: Box<dyn Delay>,
    ) -> Result<Self, SlaveError> {
        config.validate()?;
        Ok(Self::new(config.window, config.timing(), line, delay))
    }

    /// Handle for the receive, transmit-complete and timer events
    pub fn events(&self) -> SlaveEvents {
        SlaveEvents::new(self.link.clone())
    }

    /// Instrument address and register window
    pub fn window(&self) -> &RegisterWindow {
        &self.window
    }

    /// Serve at most one pending request.
    ///
    /// Returns [`AffectedRegisters::IDLE`] at once when no frame is ready.
    /// Otherwise the frame is validated and dispatched; an accepted request
    /// is answered before this returns, which takes a few milliseconds
    /// because of the turnaround guards. Rejected frames are dropped
    /// silently and also report idle.
    ///
    /// The ready frame was moved out of the receive buffer when its silence
    /// elapsed, so bytes arriving while a reply is built or sent start a new
    /// frame.
    ///
    /// A reply that fails on the line yields [`SlaveError::ReplyFailed`],
    /// which still carries the served registers: a write is applied before
    /// its acknowledgement goes out.
    pub fn poll(&self) -> Result<AffectedRegisters, SlaveError> {
        let Some(frame) = lock(&self.link.rx).take_ready() else {
            return Ok(AffectedRegisters::IDLE);
        };

        {
            let mut stats = lock(&self.stats);
            stats.frames_received += 1;
            stats.bytes_dropped += frame.dropped() as u64;
        }
        if frame.dropped() > 0 {
            debug!(
                "Receive buffer overflowed, {} bytes dropped",
                frame.dropped()
            );
        }

        let outcome = dispatch(&frame, &mut lock(&self.registers));
        let Reply {
            frame: reply,
            affected,
        } = match outcome {
            Ok(reply) => reply,
            Err(reason) => {
                debug!("Discarding frame {:02x?}: {}", frame.as_bytes(), reason);
                lock(&self.stats).frames_discarded += 1;
                return Ok(AffectedRegisters::IDLE);
            }
        };

        debug!("Sending reply {:02x?}", reply.as_bytes());
        let sent = lock(&self.transmitter).send(reply);
        let mut stats = lock(&self.stats);
        match sent {
            Ok(()) => {
                stats.replies_sent += 1;
                Ok(affected)
            }
            Err(e) => {
                stats.transmit_failures += 1;
                Err(SlaveError::ReplyFailed {
                    affected,
                    source: Box::new(e),
                })
            }
        }
    }

    /// Register value by store index
    pub fn register(&self, index: usize) -> Option<u16> {
        lock(&self.registers).get(index)
    }

    /// Set a register by store index
    pub fn set_register(&self, index: usize, value: u16) -> Result<(), SlaveError> {
        lock(&self.registers).set(index, value)
    }

    /// Register value by absolute address
    pub fn register_at(&self, address: u16) -> Option<u16> {
        lock(&self.registers).get_at(address)
    }

    /// Set a register by absolute address
    pub fn set_register_at(&self, address: u16, value: u16) -> Result<(), SlaveError> {
        lock(&self.registers).set_at(address, value)
    }

    /// Absolute address of a store index
    pub fn address_of(&self, index: usize) -> Option<u16> {
        self.window.address_of(index)
    }

    /// Current values of the registers a poll touched
    pub fn changes(&self, affected: &AffectedRegisters) -> Vec<RegisterChange> {
        let store = lock(&self.registers);
        affected
            .indices()
            .filter_map(|index| {
                Some(RegisterChange {
                    address: self.window.address_of(index)?,
                    value: store.get(index)?,
                })
            })
            .collect()
    }

    /// Snapshot of the traffic counters
    pub fn stats(&self) -> SlaveStats {
        *lock(&self.stats)
    }
}

impl std::fmt::Debug for RtuSlave {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtuSlave")
            .field("window", &self.window)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
