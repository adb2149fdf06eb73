//! Frame buffers
//!
//! RTU frames carry no length field. Inbound bytes are accumulated until the
//! line has been silent for the configured number of timer ticks; outbound
//! frames are built in full before transmission starts.

use byteorder::{BigEndian, ByteOrder};

use crate::protocol::crc::{crc16, crc_bytes};

/// Receive buffer capacity.
///
/// One byte above the 256-byte RTU ADU limit so that a full 124-register
/// write request (257 bytes on the wire) can be buffered.
pub const RX_CAPACITY: usize = 257;

/// Transmit buffer capacity (largest reply is a 125-register read, 255 bytes)
pub const TX_CAPACITY: usize = 256;

/// A silence-delimited frame taken out of the receive buffer
#[derive(Clone)]
pub struct InboundFrame {
    data: [u8; RX_CAPACITY],
    len: usize,
    dropped: usize,
}

impl InboundFrame {
    /// Build a frame from raw bytes, truncating to the receive capacity
    pub fn from_slice(bytes: &[u8]) -> Self {
        let len = bytes.len().min(RX_CAPACITY);
        let mut data = [0u8; RX_CAPACITY];
        data[..len].copy_from_slice(&bytes[..len]);
        Self {
            data,
            len,
            dropped: bytes.len() - len,
        }
    }

    /// Buffered bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no byte was buffered
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes that arrived after the buffer was full
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl std::fmt::Debug for InboundFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundFrame")
            .field("data", &format_args!("{:02x?}", self.as_bytes()))
            .field("dropped", &self.dropped)
            .finish()
    }
}

/// Accumulates received bytes and detects end-of-frame by silence.
///
/// The tick that completes the silence moves the frame out of the receive
/// buffer; a later frame closed before the first is taken replaces it.
/// Driven from the event context: [`FrameAssembler::push`] on every received
/// byte, [`FrameAssembler::tick`] on every timer period.
pub struct FrameAssembler {
    buffer: [u8; RX_CAPACITY],
    cursor: usize,
    dropped: usize,
    countdown: u32,
    threshold: u32,
    ready: Option<InboundFrame>,
}

impl FrameAssembler {
    /// Create an empty assembler that ends frames after `silence_ticks` ticks
    pub fn new(silence_ticks: u32) -> Self {
        Self {
            buffer: [0u8; RX_CAPACITY],
            cursor: 0,
            dropped: 0,
            countdown: 0,
            threshold: silence_ticks.max(1),
            ready: None,
        }
    }

    /// Record a received byte.
    ///
    /// Bytes beyond [`RX_CAPACITY`] are dropped and counted. The silence
    /// countdown restarts either way.
    pub fn push(&mut self, byte: u8) {
        if self.cursor < RX_CAPACITY {
            self.buffer[self.cursor] = byte;
            self.cursor += 1;
        } else {
            self.dropped += 1;
        }
        self.countdown = self.threshold;
    }

    /// Advance the silence timer by one tick.
    ///
    /// Returns true on the tick that completes the silence, which is also
    /// the only tick that raises the ready flag.
    pub fn tick(&mut self) -> bool {
        if self.countdown == 0 {
            return false;
        }
        self.countdown -= 1;
        if self.countdown == 0 {
            self.ready = Some(self.close());
            return true;
        }
        false
    }

    /// Move the accumulated bytes out and start an empty frame
    fn close(&mut self) -> InboundFrame {
        let frame = InboundFrame {
            data: self.buffer,
            len: self.cursor,
            dropped: self.dropped,
        };
        self.cursor = 0;
        self.dropped = 0;
        frame
    }

    /// True once a silence has closed a frame that was not taken yet
    pub fn is_ready(&self) -> bool {
        self.ready.is_some()
    }

    /// Bytes accumulated so far
    pub fn len(&self) -> usize {
        self.cursor
    }

    /// True when no byte is buffered
    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    /// Take the ready frame.
    ///
    /// Returns `None` when no frame is ready. The frame was moved out of the
    /// receive buffer when the silence closed it, so bytes received since
    /// then already belong to the next frame.
    pub fn take_ready(&mut self) -> Option<InboundFrame> {
        self.ready.take()
    }
}

/// A reply frame under construction or in transmission.
///
/// Built completely by a handler, sealed with its checksum, then handed to
/// the transmitter unchanged.
#[derive(Clone)]
pub struct OutboundFrame {
    data: [u8; TX_CAPACITY],
    len: usize,
    truncated: bool,
}

impl OutboundFrame {
    /// Start a reply with the address and function code header
    pub fn new(address: u8, function: u8) -> Self {
        let mut frame = Self {
            data: [0u8; TX_CAPACITY],
            len: 0,
            truncated: false,
        };
        frame.push(address);
        frame.push(function);
        frame
    }

    /// Append a single byte.
    ///
    /// Bytes past [`TX_CAPACITY`] are dropped and the frame is marked
    /// truncated; the transmitter refuses truncated frames.
    pub fn push(&mut self, byte: u8) -> &mut Self {
        match self.data.get_mut(self.len) {
            Some(slot) => {
                *slot = byte;
                self.len += 1;
            }
            None => self.truncated = true,
        }
        self
    }

    /// Append a big-endian 16-bit value
    pub fn push_u16(&mut self, value: u16) -> &mut Self {
        let mut bytes = [0u8; 2];
        BigEndian::write_u16(&mut bytes, value);
        self.push(bytes[0]).push(bytes[1])
    }

    /// Append the CRC of everything pushed so far, low byte first
    pub fn seal(mut self) -> Self {
        let [lo, hi] = crc_bytes(crc16(self.as_bytes()));
        self.push(lo).push(hi);
        self
    }

    /// Frame bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Byte at `index`
    pub fn get(&self, index: usize) -> Option<u8> {
        self.as_bytes().get(index).copied()
    }

    /// Frame length
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when nothing has been pushed
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when a push did not fit
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

impl std::fmt::Debug for OutboundFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OutboundFrame({:02x?})", self.as_bytes())
    }
}
