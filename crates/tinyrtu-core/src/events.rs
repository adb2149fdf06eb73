//! Event context
//!
//! The serial driver and the periodic timer report into the engine through a
//! [`SlaveEvents`] handle. Every entry point takes a short critical section
//! on the state it touches and never blocks on the poll context.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

use crate::frame::FrameAssembler;
use crate::transmit::{SerialLine, TxState};

/// State shared between the event context and the poll context
pub(crate) struct Link {
    pub(crate) rx: Mutex<FrameAssembler>,
    pub(crate) tx: Mutex<TxState>,
    pub(crate) tx_done: Condvar,
    pub(crate) line: Mutex<Box<dyn SerialLine>>,
}

impl Link {
    pub(crate) fn new(silence_ticks: u32, line: Box<dyn SerialLine>) -> Self {
        Self {
            rx: Mutex::new(FrameAssembler::new(silence_ticks)),
            tx: Mutex::new(TxState::default()),
            tx_done: Condvar::new(),
            line: Mutex::new(line),
        }
    }
}

/// Lock a mutex, recovering the data if a holder panicked.
///
/// The guarded state is plain buffers and counters, each left consistent
/// between statements, so a poisoned lock is still safe to use.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable handle through which the driver reports line events
#[derive(Clone)]
pub struct SlaveEvents {
    link: Arc<Link>,
}

impl SlaveEvents {
    pub(crate) fn new(link: Arc<Link>) -> Self {
        Self { link }
    }

    /// Reference that does not keep the engine alive
    pub(crate) fn downgrade(&self) -> Weak<Link> {
        Arc::downgrade(&self.link)
    }

    /// A byte arrived on the line
    pub fn byte_received(&self, byte: u8) {
        lock(&self.link.rx).push(byte);
    }

    /// Several bytes arrived back to back
    pub fn bytes_received(&self, bytes: &[u8]) {
        let mut rx = lock(&self.link.rx);
        for &byte in bytes {
            rx.push(byte);
        }
    }

    /// The silence timer fired.
    ///
    /// Returns true on the tick that closes a frame.
    pub fn tick(&self) -> bool {
        lock(&self.link.rx).tick()
    }

    /// The line finished shifting out the byte last handed to it.
    ///
    /// Feeds the next byte of the active reply, or marks the reply complete
    /// and wakes the waiting transmitter. Spurious completions outside a
    /// transmission are ignored.
    pub fn byte_sent(&self) {
        let next = lock(&self.link.tx).advance();
        let Some(byte) = next else {
            self.link.tx_done.notify_all();
            return;
        };

        let result = lock(&self.link.line).put_byte(byte);
        if let Err(e) = result {
            lock(&self.link.tx).fail(e.to_string());
            self.link.tx_done.notify_all();
        }
    }
}

impl std::fmt::Debug for SlaveEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlaveEvents").finish_non_exhaustive()
    }
}
