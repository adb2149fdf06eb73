//! Line timing
//!
//! Silence detection and bus turnaround intervals for MODBUS RTU over a
//! half-duplex link.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Bits per RTU character (start + 8 data + parity/stop + stop)
const BITS_PER_CHAR: u64 = 11;

/// Inter-frame silence in character times
const SILENCE_CHARS_X10: u64 = 35;

/// Timer period and guard intervals, in microseconds.
///
/// `Default` uses a 100 µs tick with a 9-tick (900 µs) silence threshold,
/// a 1.9 ms guard before the first byte, 50 µs after the last byte before
/// releasing the line and 0.9 ms of trailing silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineTiming {
    /// Period of the silence timer
    pub tick_us: u64,
    /// Ticks of silence that end a frame
    pub silence_ticks: u32,
    /// Pause between asserting the direction line and the first byte
    pub pre_transmit_guard_us: u64,
    /// Pause between the last byte and releasing the direction line
    pub last_byte_guard_us: u64,
    /// Silence held after releasing the line before returning to the caller
    pub trailing_guard_us: u64,
    /// Time to shift out one character, bounds the completion wait
    pub char_time_us: u64,
}

impl Default for LineTiming {
    fn default() -> Self {
        Self {
            tick_us: 100,
            silence_ticks: 9,
            pre_transmit_guard_us: 1900,
            last_byte_guard_us: 50,
            trailing_guard_us: 900,
            char_time_us: char_time_us(115_200),
        }
    }
}

impl LineTiming {
    /// Size the silence threshold to 3.5 character times at `baud_rate`.
    ///
    /// Guard intervals keep their defaults.
    pub fn for_baud(baud_rate: u32) -> Self {
        let defaults = Self::default();
        let char_us = char_time_us(baud_rate);
        let silence_us = (char_us * SILENCE_CHARS_X10).div_ceil(10);
        let ticks = silence_us.div_ceil(defaults.tick_us).max(1);

        Self {
            silence_ticks: u32::try_from(ticks).unwrap_or(u32::MAX),
            char_time_us: char_us,
            ..defaults
        }
    }

    /// Timer period
    pub fn tick(&self) -> Duration {
        Duration::from_micros(self.tick_us)
    }

    /// Silence needed to end a frame
    pub fn silence(&self) -> Duration {
        Duration::from_micros(self.tick_us * u64::from(self.silence_ticks))
    }

    /// Guard before the first byte
    pub fn pre_transmit_guard(&self) -> Duration {
        Duration::from_micros(self.pre_transmit_guard_us)
    }

    /// Guard after the last byte
    pub fn last_byte_guard(&self) -> Duration {
        Duration::from_micros(self.last_byte_guard_us)
    }

    /// Trailing silence after the line is released
    pub fn trailing_guard(&self) -> Duration {
        Duration::from_micros(self.trailing_guard_us)
    }

    /// Upper bound on how long `len` bytes may take to go out
    pub fn transmit_deadline(&self, len: usize) -> Duration {
        // Four character times per byte plus a fixed margin for scheduler jitter
        Duration::from_micros(self.char_time_us * 4 * len as u64) + Duration::from_millis(50)
    }
}

/// Microseconds needed to shift out one character
fn char_time_us(baud_rate: u32) -> u64 {
    let baud = u64::from(baud_rate.max(1));
    (BITS_PER_CHAR * 1_000_000).div_ceil(baud)
}

/// Blocking pause used for the turnaround guards
pub trait Delay: Send {
    /// Block the caller for `duration`
    fn pause(&mut self, duration: Duration);
}

/// Delay backed by the OS scheduler.
///
/// Pauses under a millisecond spin instead of sleeping, since sleep
/// granularity on most hosts is coarser than the RTU guards.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn pause(&mut self, duration: Duration) {
        if duration >= Duration::from_millis(1) {
            std::thread::sleep(duration);
            return;
        }
        let until = Instant::now() + duration;
        while Instant::now() < until {
            std::hint::spin_loop();
        }
    }
}
