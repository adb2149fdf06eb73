//! Function handlers
//!
//! A handler receives the request payload (the bytes between the function
//! code and the checksum) and either builds a sealed reply or names the
//! reason the request is dropped.

use byteorder::{BigEndian, ByteOrder};

use super::{AffectedRegisters, Discard, FunctionCode, Reply};
use super::{MAX_READ_REGISTERS, MAX_WRITE_REGISTERS};
use crate::frame::OutboundFrame;
use crate::registers::RegisterStore;

/// Handler signature shared by every function code
pub type Handler = fn(&[u8], &mut RegisterStore) -> Result<Reply, Discard>;

/// Start address and register count heading every supported request
#[derive(Debug, Clone, Copy)]
struct RangeHeader {
    start: u16,
    count: u16,
}

fn range_header(payload: &[u8], needed: usize) -> Result<RangeHeader, Discard> {
    if payload.len() < needed {
        return Err(Discard::PayloadTooShort {
            needed,
            actual: payload.len(),
        });
    }
    Ok(RangeHeader {
        start: BigEndian::read_u16(&payload[0..2]),
        count: BigEndian::read_u16(&payload[2..4]),
    })
}

/// Resolve the requested range against the store's window
fn resolve(store: &RegisterStore, header: RangeHeader, max: u16) -> Result<usize, Discard> {
    let RangeHeader { start, count } = header;
    if count > max {
        return Err(Discard::QuantityOutOfLimits { count, max });
    }
    store
        .window()
        .range_index(start, count)
        .ok_or(Discard::OutsideWindow { start, count })
}

/// Read holding registers (0x03).
///
/// Payload: start address, register count. Reply: byte count followed by
/// the register values, big-endian, in ascending address order.
pub fn read_holding_registers(payload: &[u8], store: &mut RegisterStore) -> Result<Reply, Discard> {
    let header = range_header(payload, 4)?;
    let index = resolve(store, header, MAX_READ_REGISTERS)?;
    let count = header.count;
    let values = store
        .slice(index, usize::from(count))
        .ok_or(Discard::OutsideWindow {
            start: header.start,
            count,
        })?;

    let function = FunctionCode::ReadHoldingRegisters;
    let mut frame = OutboundFrame::new(store.window().instrument_address(), function.code());
    frame.push((count * 2) as u8);
    for &value in values {
        frame.push_u16(value);
    }

    Ok(Reply {
        frame: frame.seal(),
        affected: AffectedRegisters::new(function.into(), index as u16, count),
    })
}

/// Write multiple registers (0x10).
///
/// Payload: start address, register count, byte count, values. The store
/// is updated before the reply is built. Reply: start address and count.
pub fn write_multiple_registers(
    payload: &[u8],
    store: &mut RegisterStore,
) -> Result<Reply, Discard> {
    let header = range_header(payload, 5)?;
    let declared = payload[4];
    if usize::from(declared) != usize::from(header.count) * 2 {
        return Err(Discard::ByteCountMismatch {
            declared,
            count: header.count,
        });
    }
    let index = resolve(store, header, MAX_WRITE_REGISTERS)?;

    let needed = 5 + usize::from(declared);
    if payload.len() < needed {
        return Err(Discard::PayloadTooShort {
            needed,
            actual: payload.len(),
        });
    }

    let RangeHeader { start, count } = header;
    let registers = store
        .slice_mut(index, usize::from(count))
        .ok_or(Discard::OutsideWindow { start, count })?;
    BigEndian::read_u16_into(&payload[5..needed], registers);

    let function = FunctionCode::WriteMultipleRegisters;
    let mut frame = OutboundFrame::new(store.window().instrument_address(), function.code());
    frame.push_u16(start).push_u16(count);

    Ok(Reply {
        frame: frame.seal(),
        affected: AffectedRegisters::new(function.into(), index as u16, count),
    })
}
