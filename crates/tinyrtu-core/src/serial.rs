//! Serial port adapter
//!
//! Runs the engine on a host serial port. RTS drives the RS-485 direction
//! line; three worker threads stand in for the receive interrupt, the
//! transmit-complete interrupt and the silence timer.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::LineConfig;
use crate::error::SlaveError;
use crate::events::SlaveEvents;
use crate::timing::LineTiming;
use crate::transmit::{LineDirection, SerialLine};

/// Read timeout used by the receiver thread between stop checks
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, product) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => {
                (Some(usb_info.vid), Some(usb_info.pid), usb_info.product)
            }
            _ => (None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            product,
        }
    }
}

/// List available serial ports, sorted by name
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(PortInfo::from)
        .collect();
    ports.sort_by(|a, b| a.name.cmp(&b.name));
    ports
}

/// Open a serial port for RTU traffic (8N1, no flow control)
pub fn open_port(config: &LineConfig) -> Result<Box<dyn SerialPort>, SlaveError> {
    if config.port_name.is_empty() {
        return Err(SlaveError::InvalidConfig("no serial port configured".into()));
    }

    let mut port = serialport::new(&config.port_name, config.baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(READ_TIMEOUT)
        .open()?;

    // Start with the driver off so the bus is free for the master
    port.write_request_to_send(false)?;
    port.clear(serialport::ClearBuffer::All)?;
    Ok(port)
}

/// Commands queued from the engine to the writer thread
#[derive(Debug, Clone, Copy)]
enum LineCommand {
    Direction(LineDirection),
    Byte(u8),
}

/// Engine-side line that forwards to the writer thread
struct PortLine {
    commands: Sender<LineCommand>,
}

impl SerialLine for PortLine {
    fn set_direction(&mut self, direction: LineDirection) -> Result<(), SlaveError> {
        self.commands
            .send(LineCommand::Direction(direction))
            .map_err(|_| SlaveError::LineError("serial writer stopped".into()))
    }

    fn put_byte(&mut self, byte: u8) -> Result<(), SlaveError> {
        self.commands
            .send(LineCommand::Byte(byte))
            .map_err(|_| SlaveError::LineError("serial writer stopped".into()))
    }
}

/// Serial port plus the worker threads that drive an engine
pub struct SerialBus {
    port: Box<dyn SerialPort>,
    timing: LineTiming,
    commands: Sender<LineCommand>,
    pending: Option<Receiver<LineCommand>>,
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl SerialBus {
    /// Open the configured port
    pub fn open(config: &LineConfig, timing: LineTiming) -> Result<Self, SlaveError> {
        let port = open_port(config)?;
        info!(
            "Opened {} at {} baud (silence {:?})",
            config.port_name,
            config.baud_rate,
            timing.silence()
        );
        let (commands, pending) = mpsc::channel();
        Ok(Self {
            port,
            timing,
            commands,
            pending: Some(pending),
            stop: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
        })
    }

    /// Line to hand to the engine
    pub fn line(&self) -> Box<dyn SerialLine> {
        Box::new(PortLine {
            commands: self.commands.clone(),
        })
    }

    /// Start the receiver, writer and ticker threads feeding `events`
    pub fn start(&mut self, events: SlaveEvents) -> Result<(), SlaveError> {
        let Some(commands) = self.pending.take() else {
            return Err(SlaveError::LineError("serial bus already started".into()));
        };

        let reader = self.port.try_clone()?;
        let writer = self.port.try_clone()?;

        let stop = self.stop.clone();
        let rx_events = events.clone();
        self.workers.push(
            thread::Builder::new()
                .name("rtu-rx".into())
                .spawn(move || receive_loop(reader, rx_events, stop))?,
        );

        let stop = self.stop.clone();
        let tx_events = events.clone();
        self.workers.push(
            thread::Builder::new()
                .name("rtu-tx".into())
                .spawn(move || transmit_loop(writer, commands, tx_events, stop))?,
        );

        let stop = self.stop.clone();
        let tick = self.timing.tick();
        self.workers.push(
            thread::Builder::new()
                .name("rtu-tick".into())
                .spawn(move || tick_loop(tick, events, stop))?,
        );

        debug!("Serial bus workers started");
        Ok(())
    }

    /// Stop the worker threads and wait for them to exit
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("Serial bus worker panicked");
            }
        }
    }
}

impl Drop for SerialBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn receive_loop(mut port: Box<dyn SerialPort>, events: SlaveEvents, stop: Arc<AtomicBool>) {
    let mut buffer = [0u8; 64];
    while !stop.load(Ordering::Relaxed) {
        match port.read(&mut buffer) {
            Ok(0) => {}
            Ok(n) => events.bytes_received(&buffer[..n]),
            Err(ref e) if e.kind() == ErrorKind::TimedOut => {}
            Err(e) => {
                warn!("Serial read failed: {}", e);
                thread::sleep(READ_TIMEOUT);
            }
        }
    }
}

fn transmit_loop(
    mut port: Box<dyn SerialPort>,
    commands: Receiver<LineCommand>,
    events: SlaveEvents,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Relaxed) {
        let command = match commands.recv_timeout(READ_TIMEOUT) {
            Ok(command) => command,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match command {
            LineCommand::Direction(direction) => {
                let level = direction == LineDirection::Transmit;
                if let Err(e) = port.write_request_to_send(level) {
                    warn!("Failed to drive RTS: {}", e);
                }
            }
            LineCommand::Byte(byte) => {
                // Completion is reported even on failure so the transmitter
                // does not wait out its deadline on a dead port.
                if let Err(e) = port.write_all(&[byte]).and_then(|_| port.flush()) {
                    warn!("Serial write failed: {}", e);
                }
                events.byte_sent();
            }
        }
    }
}

fn tick_loop(tick: Duration, events: SlaveEvents, stop: Arc<AtomicBool>) {
    let mut next = Instant::now() + tick;
    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now < next {
            thread::sleep(next - now);
        }
        events.tick();
        next += tick;
        // Do not replay a backlog of ticks after a long stall
        let now = Instant::now();
        if next + tick < now {
            next = now + tick;
        }
    }
}
