//! Shared fixtures for engine tests

#![allow(dead_code)]

use tinyrtu_core::loopback::{LineLog, Loopback};
use tinyrtu_core::protocol::crc::{crc16, crc_bytes};
use tinyrtu_core::{AffectedRegisters, LineTiming, RegisterWindow, RtuSlave, SlaveEvents};

/// Instrument address used by the fixtures
pub const ADDRESS: u8 = 0x11;

/// Slave plus the loopback line it talks to
pub struct Rig {
    pub slave: RtuSlave,
    pub events: SlaveEvents,
    pub log: LineLog,
    pub loopback: Loopback,
    pub timing: LineTiming,
}

impl Rig {
    /// Feed raw bytes and let the silence threshold elapse
    pub fn deliver(&self, bytes: &[u8]) {
        Loopback::deliver(&self.events, bytes, self.timing.silence_ticks);
    }

    /// Seal `body` with its checksum, deliver it and poll once
    pub fn request(&self, body: &[u8]) -> AffectedRegisters {
        self.deliver(&frame(body));
        self.slave.poll().expect("poll should not fail on loopback")
    }

    /// Store contents as a vector
    pub fn registers(&self) -> Vec<u16> {
        (0..self.slave.window().len())
            .map(|i| self.slave.register(i).unwrap())
            .collect()
    }
}

/// Instrument 17 serving addresses 100..=104, completions attached
pub fn rig() -> Rig {
    rig_with(RegisterWindow::new(ADDRESS, 100, 5).unwrap(), true)
}

/// Rig over `window`; with `attach == false` no byte ever completes
pub fn rig_with(window: RegisterWindow, attach: bool) -> Rig {
    let timing = LineTiming::default();
    let mut loopback = Loopback::new();
    let slave = RtuSlave::new(window, timing, loopback.line(), loopback.delay());
    let events = slave.events();
    if attach {
        loopback.attach(events.clone());
    }
    Rig {
        slave,
        log: loopback.log(),
        events,
        loopback,
        timing,
    }
}

/// Append the MODBUS CRC (low byte first) to `body`
pub fn frame(body: &[u8]) -> Vec<u8> {
    let mut bytes = body.to_vec();
    bytes.extend_from_slice(&crc_bytes(crc16(body)));
    bytes
}

/// Write Multiple Registers request body
pub fn write_request(address: u8, start: u16, values: &[u16]) -> Vec<u8> {
    let mut body = vec![address, 0x10];
    body.extend_from_slice(&start.to_be_bytes());
    body.extend_from_slice(&(values.len() as u16).to_be_bytes());
    body.push((values.len() * 2) as u8);
    for v in values {
        body.extend_from_slice(&v.to_be_bytes());
    }
    body
}

/// Read Holding Registers request body
pub fn read_request(address: u8, start: u16, count: u16) -> Vec<u8> {
    let mut body = vec![address, 0x03];
    body.extend_from_slice(&start.to_be_bytes());
    body.extend_from_slice(&count.to_be_bytes());
    body
}
