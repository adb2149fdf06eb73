//! Request dispatch
//!
//! Validates a ready frame (length, instrument address, checksum) and hands
//! its payload to the handler of its function code.

use tracing::debug;

use super::crc::{crc16, trailing_crc};
use super::{Discard, FunctionCode, Reply, MIN_FRAME_LEN};
use crate::frame::InboundFrame;
use crate::registers::RegisterStore;

/// Validate `frame` and run the matching handler against `store`.
///
/// Broadcast (address 0) is not served: only frames carrying the configured
/// instrument address are considered.
pub fn dispatch(frame: &InboundFrame, store: &mut RegisterStore) -> Result<Reply, Discard> {
    let bytes = frame.as_bytes();
    if bytes.len() < MIN_FRAME_LEN {
        return Err(Discard::TooShort(bytes.len()));
    }

    let address = bytes[0];
    if address != store.window().instrument_address() {
        return Err(Discard::AddressMismatch(address));
    }

    let body = &bytes[..bytes.len() - 2];
    let expected = crc16(body);
    let actual = trailing_crc(bytes).ok_or(Discard::TooShort(bytes.len()))?;
    if expected != actual {
        return Err(Discard::ChecksumMismatch { expected, actual });
    }

    let function = FunctionCode::try_from(bytes[1]).map_err(Discard::UnsupportedFunction)?;
    debug!(
        "Dispatching {} request ({} payload bytes)",
        function,
        body.len() - 2
    );
    (function.handler())(&body[2..], store)
}
