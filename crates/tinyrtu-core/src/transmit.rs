//! Reply transmission
//!
//! Sends a sealed reply one byte at a time under direction-line control.
//! The line reports each finished byte through [`crate::SlaveEvents::byte_sent`];
//! the caller of [`Transmitter::send`] blocks until the whole reply and the
//! trailing guard are done.
//!
//! Sequence: assert direction, 1.9 ms guard, bytes, 50 µs guard, release
//! direction, 0.9 ms trailing guard.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError};
use std::time::Instant;
use tracing::{trace, warn};

use crate::error::SlaveError;
use crate::events::{lock, Link};
use crate::frame::{OutboundFrame, TX_CAPACITY};
use crate::timing::{Delay, LineTiming};

/// Half-duplex driver direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineDirection {
    /// Driver off, listening to the bus
    Receive,
    /// Driver on, the slave owns the bus
    Transmit,
}

/// Byte-oriented half-duplex serial line.
///
/// `put_byte` starts shifting out one byte and returns immediately; the
/// driver must call [`crate::SlaveEvents::byte_sent`] once that byte has left
/// the line.
pub trait SerialLine: Send {
    /// Drive the direction control line
    fn set_direction(&mut self, direction: LineDirection) -> Result<(), SlaveError>;

    /// Start sending one byte
    fn put_byte(&mut self, byte: u8) -> Result<(), SlaveError>;
}

/// Outbound buffer, send cursor and completion flag
#[derive(Default)]
pub(crate) struct TxState {
    frame: Option<OutboundFrame>,
    cursor: usize,
    completed: bool,
    fault: Option<String>,
}

impl TxState {
    fn load(&mut self, frame: OutboundFrame) {
        self.frame = Some(frame);
        self.cursor = 0;
        self.completed = false;
        self.fault = None;
    }

    /// Next byte to hand to the line, or `None` once the reply is out
    pub(crate) fn advance(&mut self) -> Option<u8> {
        if self.completed {
            return None;
        }
        let frame = self.frame.as_ref()?;
        match frame.get(self.cursor) {
            Some(byte) => {
                self.cursor += 1;
                Some(byte)
            }
            None => {
                self.completed = true;
                None
            }
        }
    }

    pub(crate) fn fail(&mut self, reason: String) {
        self.fault = Some(reason);
        self.completed = true;
    }

    fn clear(&mut self) {
        self.frame = None;
        self.completed = false;
    }
}

/// Poll-context side of reply transmission
pub struct Transmitter {
    link: Arc<Link>,
    delay: Box<dyn Delay>,
    timing: LineTiming,
}

impl Transmitter {
    pub(crate) fn new(link: Arc<Link>, delay: Box<dyn Delay>, timing: LineTiming) -> Self {
        Self {
            link,
            delay,
            timing,
        }
    }

    /// Send `frame` and block until the trailing guard has elapsed.
    ///
    /// The direction line is returned to receive even when sending fails.
    pub fn send(&mut self, frame: OutboundFrame) -> Result<(), SlaveError> {
        if frame.is_truncated() {
            return Err(SlaveError::ReplyTooLong(TX_CAPACITY));
        }
        trace!("Asserting direction line for {} byte reply", frame.len());
        lock(&self.link.line).set_direction(LineDirection::Transmit)?;

        let outcome = self.shift_out(frame);

        self.delay.pause(self.timing.last_byte_guard());
        let released = lock(&self.link.line).set_direction(LineDirection::Receive);
        self.delay.pause(self.timing.trailing_guard());
        trace!("Direction line released");

        if let Err(e) = &outcome {
            warn!("Reply transmission failed: {}", e);
        }
        outcome.and(released)
    }

    fn shift_out(&mut self, frame: OutboundFrame) -> Result<(), SlaveError> {
        self.delay.pause(self.timing.pre_transmit_guard());

        let total = frame.len();
        let first = {
            let mut tx = lock(&self.link.tx);
            tx.load(frame);
            tx.advance()
        };
        if let Some(byte) = first {
            if let Err(e) = lock(&self.link.line).put_byte(byte) {
                lock(&self.link.tx).clear();
                return Err(e);
            }
        }

        let started = Instant::now();
        let deadline = self.timing.transmit_deadline(total);
        let (mut tx, wait) = self
            .link
            .tx_done
            .wait_timeout_while(lock(&self.link.tx), deadline, |tx| !tx.completed)
            .unwrap_or_else(PoisonError::into_inner);

        let sent = tx.cursor;
        let fault = tx.fault.take();
        tx.clear();
        drop(tx);

        if let Some(reason) = fault {
            return Err(SlaveError::LineError(reason));
        }
        if wait.timed_out() {
            return Err(SlaveError::TransmitTimeout {
                sent,
                total,
                elapsed: started.elapsed(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(bytes: &[u8]) -> OutboundFrame {
        let mut f = OutboundFrame::new(bytes[0], bytes[1]);
        for &b in &bytes[2..] {
            f.push(b);
        }
        f
    }

    #[test]
    fn test_advance_walks_frame_then_completes() {
        let mut tx = TxState::default();
        tx.load(frame(&[1, 2, 3]));
        assert_eq!(tx.advance(), Some(1));
        assert_eq!(tx.advance(), Some(2));
        assert_eq!(tx.advance(), Some(3));
        assert!(!tx.completed);
        assert_eq!(tx.advance(), None);
        assert!(tx.completed);
        assert_eq!(tx.advance(), None);
    }

    #[test]
    fn test_advance_without_frame_is_ignored() {
        let mut tx = TxState::default();
        assert_eq!(tx.advance(), None);
        assert!(!tx.completed);
    }

    #[test]
    fn test_truncated_reply_never_reaches_line() {
        use crate::loopback::Loopback;

        let loopback = Loopback::new();
        let link = Arc::new(Link::new(9, loopback.line()));
        let mut transmitter = Transmitter::new(link, loopback.delay(), LineTiming::default());

        let mut reply = OutboundFrame::new(0x11, 0x03);
        for _ in 0..TX_CAPACITY {
            reply.push(0);
        }
        assert!(matches!(
            transmitter.send(reply),
            Err(SlaveError::ReplyTooLong(TX_CAPACITY))
        ));
        assert!(loopback.log().events().is_empty());
    }

    #[test]
    fn test_fail_marks_completed() {
        let mut tx = TxState::default();
        tx.load(frame(&[1, 2]));
        tx.advance();
        tx.fail("line unplugged".into());
        assert!(tx.completed);
        assert_eq!(tx.advance(), None);
        assert_eq!(tx.fault.as_deref(), Some("line unplugged"));
    }
}
