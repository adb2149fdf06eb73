//! Reception while a frame is waiting or a reply is on the line

mod common;

use common::{frame, read_request, write_request, ADDRESS};
use pretty_assertions::assert_eq;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tinyrtu_core::{
    AffectedRegisters, Delay, LineDirection, LineTiming, Operation, RegisterWindow, RtuSlave,
    SerialLine, SlaveError, SlaveEvents,
};

/// Bytes a master sends while the slave is still replying
#[derive(Default)]
struct Interjection {
    events: Option<SlaveEvents>,
    bytes: Vec<u8>,
    ticks: u32,
}

/// Line that records what it sends and, on the first byte of a reply,
/// delivers a pending interjection as if it arrived on the wire
struct InterjectingLine {
    sent: Arc<Mutex<Vec<u8>>>,
    interjection: Arc<Mutex<Interjection>>,
    completions: Sender<()>,
}

impl SerialLine for InterjectingLine {
    fn set_direction(&mut self, _direction: LineDirection) -> Result<(), SlaveError> {
        Ok(())
    }

    fn put_byte(&mut self, byte: u8) -> Result<(), SlaveError> {
        self.sent.lock().unwrap().push(byte);

        let mut pending = self.interjection.lock().unwrap();
        if let Some(events) = pending.events.take() {
            events.bytes_received(&pending.bytes);
            for _ in 0..pending.ticks {
                events.tick();
            }
        }
        drop(pending);

        let _ = self.completions.send(());
        Ok(())
    }
}

struct NoDelay;

impl Delay for NoDelay {
    fn pause(&mut self, _duration: Duration) {}
}

struct Bench {
    slave: RtuSlave,
    events: SlaveEvents,
    sent: Arc<Mutex<Vec<u8>>>,
    interjection: Arc<Mutex<Interjection>>,
    timing: LineTiming,
}

impl Bench {
    fn new() -> Self {
        let timing = LineTiming::default();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let interjection = Arc::new(Mutex::new(Interjection::default()));
        let (completions, completed) = mpsc::channel();

        let line = InterjectingLine {
            sent: sent.clone(),
            interjection: interjection.clone(),
            completions,
        };
        let window = RegisterWindow::new(ADDRESS, 100, 5).unwrap();
        let slave = RtuSlave::new(window, timing, Box::new(line), Box::new(NoDelay));
        let events = slave.events();

        let worker_events = events.clone();
        thread::spawn(move || {
            for () in completed {
                worker_events.byte_sent();
            }
        });

        Self {
            slave,
            events,
            sent,
            interjection,
            timing,
        }
    }

    fn deliver(&self, bytes: &[u8]) {
        self.events.bytes_received(bytes);
        for _ in 0..self.timing.silence_ticks {
            self.events.tick();
        }
    }

    /// Deliver `bytes` and a full silence during the next reply
    fn interject(&self, bytes: Vec<u8>) {
        self.interject_with(bytes, self.timing.silence_ticks);
    }

    /// Deliver `bytes` followed by `ticks` timer ticks during the next reply
    fn interject_with(&self, bytes: Vec<u8>, ticks: u32) {
        *self.interjection.lock().unwrap() = Interjection {
            events: Some(self.events.clone()),
            bytes,
            ticks,
        };
    }

    fn take_sent(&self) -> Vec<u8> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

#[test]
fn test_request_during_reply_is_served_next() {
    let bench = Bench::new();
    bench.interject(frame(&read_request(ADDRESS, 100, 2)));

    bench.deliver(&frame(&write_request(ADDRESS, 100, &[0xAA, 0xBB])));
    assert_eq!(
        bench.slave.poll().unwrap(),
        AffectedRegisters::new(Operation::Write, 0, 2)
    );
    assert_eq!(
        bench.take_sent(),
        vec![0x11, 0x10, 0x00, 0x64, 0x00, 0x02, 0x02, 0x87]
    );

    assert_eq!(
        bench.slave.poll().unwrap(),
        AffectedRegisters::new(Operation::Read, 0, 2)
    );
    assert_eq!(
        bench.take_sent(),
        vec![0x11, 0x03, 0x04, 0x00, 0xAA, 0x00, 0xBB, 0x8B, 0xA1]
    );
    assert!(bench.slave.poll().unwrap().is_idle());
    assert_eq!(bench.slave.stats().frames_discarded, 0);
}

#[test]
fn test_partial_request_during_reply_completes_later() {
    let bench = Bench::new();
    let next = frame(&read_request(ADDRESS, 101, 1));
    let (head, tail) = next.split_at(4);

    // No silence follows, so the head stays open across the poll
    bench.interject_with(head.to_vec(), 0);

    bench.deliver(&frame(&write_request(ADDRESS, 101, &[0x0102])));
    assert!(!bench.slave.poll().unwrap().is_idle());
    assert!(bench.slave.poll().unwrap().is_idle());
    bench.take_sent();

    bench.deliver(tail);
    assert_eq!(
        bench.slave.poll().unwrap(),
        AffectedRegisters::new(Operation::Read, 1, 1)
    );
    assert_eq!(
        bench.take_sent(),
        frame(&[0x11, 0x03, 0x02, 0x01, 0x02])
    );
}

#[test]
fn test_bytes_after_silence_do_not_touch_waiting_frame() {
    let bench = Bench::new();
    let next = frame(&read_request(ADDRESS, 100, 1));
    let (head, tail) = next.split_at(3);

    bench.deliver(&frame(&write_request(ADDRESS, 102, &[7, 8])));
    // The master starts the next request before the slave polls
    bench.events.bytes_received(head);

    assert_eq!(
        bench.slave.poll().unwrap(),
        AffectedRegisters::new(Operation::Write, 2, 2)
    );
    assert_eq!(
        bench.take_sent(),
        frame(&[0x11, 0x10, 0x00, 0x66, 0x00, 0x02])
    );
    assert!(bench.slave.poll().unwrap().is_idle());

    bench.deliver(tail);
    assert_eq!(
        bench.slave.poll().unwrap(),
        AffectedRegisters::new(Operation::Read, 0, 1)
    );
    assert_eq!(bench.slave.register_at(103), Some(8));
}
