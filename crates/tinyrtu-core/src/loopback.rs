//! In-memory serial line
//!
//! Stands in for the UART and direction pin in tests and dry runs. Every
//! direction change, transmitted byte and guard pause is recorded in order,
//! and byte completions are reported back to the engine from a worker
//! thread, the way a transmit interrupt would.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::SlaveError;
use crate::events::{lock, SlaveEvents};
use crate::timing::Delay;
use crate::transmit::{LineDirection, SerialLine};

/// One recorded line action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent {
    /// Direction line driven
    Direction(LineDirection),
    /// Byte handed to the line
    Byte(u8),
    /// Guard pause taken by the transmitter
    Pause(Duration),
}

/// Ordered record of everything the engine did to the line
#[derive(Debug, Clone, Default)]
pub struct LineLog {
    events: Arc<Mutex<Vec<LineEvent>>>,
}

impl LineLog {
    fn record(&self, event: LineEvent) {
        lock(&self.events).push(event);
    }

    /// All events so far
    pub fn events(&self) -> Vec<LineEvent> {
        lock(&self.events).clone()
    }

    /// Bytes transmitted so far
    pub fn sent_bytes(&self) -> Vec<u8> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                LineEvent::Byte(b) => Some(*b),
                _ => None,
            })
            .collect()
    }

    /// Last direction driven, `Receive` if never driven
    pub fn direction(&self) -> LineDirection {
        lock(&self.events)
            .iter()
            .rev()
            .find_map(|e| match e {
                LineEvent::Direction(d) => Some(*d),
                _ => None,
            })
            .unwrap_or(LineDirection::Receive)
    }

    /// Forget recorded events
    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

/// Loopback line, delay and completion worker
pub struct Loopback {
    log: LineLog,
    notify: Sender<()>,
    completions: Option<Receiver<()>>,
    unplugged: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Default for Loopback {
    fn default() -> Self {
        Self::new()
    }
}

impl Loopback {
    /// Create a detached loopback; completions queue until [`Loopback::attach`]
    pub fn new() -> Self {
        let (notify, completions) = mpsc::channel();
        Self {
            log: LineLog::default(),
            notify,
            completions: Some(completions),
            unplugged: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Line to hand to the engine
    pub fn line(&self) -> Box<dyn SerialLine> {
        Box::new(LoopbackLine {
            log: self.log.clone(),
            notify: self.notify.clone(),
            unplugged: self.unplugged.clone(),
        })
    }

    /// Delay that records pauses instead of sleeping
    pub fn delay(&self) -> Box<dyn Delay> {
        Box::new(RecordingDelay {
            log: self.log.clone(),
        })
    }

    /// Shared event log
    pub fn log(&self) -> LineLog {
        self.log.clone()
    }

    /// Make every further byte fail on the line
    pub fn unplug(&self) {
        self.unplugged.store(true, Ordering::SeqCst);
    }

    /// Start reporting byte completions to `events`.
    ///
    /// Only the first call has an effect. Without it, replies never
    /// complete and the transmitter times out. The worker holds the engine
    /// weakly and exits once the engine and this loopback are dropped.
    pub fn attach(&mut self, events: SlaveEvents) {
        let Some(completions) = self.completions.take() else {
            return;
        };
        let link = events.downgrade();
        let worker = thread::spawn(move || {
            for () in completions {
                let Some(link) = link.upgrade() else {
                    break;
                };
                SlaveEvents::new(link).byte_sent();
            }
        });
        self.worker = Some(worker);
    }

    /// Completion worker, once attached
    pub fn take_worker(&mut self) -> Option<JoinHandle<()>> {
        self.worker.take()
    }

    /// Feed `bytes` as one frame and let the line fall silent for `ticks`
    pub fn deliver(events: &SlaveEvents, bytes: &[u8], ticks: u32) {
        events.bytes_received(bytes);
        for _ in 0..ticks {
            events.tick();
        }
    }
}

struct LoopbackLine {
    log: LineLog,
    notify: Sender<()>,
    unplugged: Arc<AtomicBool>,
}

impl SerialLine for LoopbackLine {
    fn set_direction(&mut self, direction: LineDirection) -> Result<(), SlaveError> {
        self.log.record(LineEvent::Direction(direction));
        Ok(())
    }

    fn put_byte(&mut self, byte: u8) -> Result<(), SlaveError> {
        if self.unplugged.load(Ordering::SeqCst) {
            return Err(SlaveError::LineError("loopback unplugged".into()));
        }
        self.log.record(LineEvent::Byte(byte));
        // Completion worker gone means nobody is listening; the transmitter
        // will time out on its own.
        let _ = self.notify.send(());
        Ok(())
    }
}

struct RecordingDelay {
    log: LineLog,
}

impl Delay for RecordingDelay {
    fn pause(&mut self, duration: Duration) {
        self.log.record(LineEvent::Pause(duration));
    }
}
