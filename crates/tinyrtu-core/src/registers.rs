//! Holding register storage
//!
//! Maps the absolute register addresses a master uses onto a contiguous,
//! zero-initialised array.

use serde::{Deserialize, Serialize};

use crate::error::SlaveError;

/// Largest window a 16-bit register address space can hold
pub const MAX_WINDOW_LENGTH: u32 = 0x1_0000;

/// Instrument address plus the contiguous address range served by the slave.
///
/// Immutable after construction; `end` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WindowFields", into = "WindowFields")]
pub struct RegisterWindow {
    instrument_address: u8,
    start: u16,
    end: u16,
}

impl RegisterWindow {
    /// Create a window of `length` registers starting at `start`
    pub fn new(instrument_address: u8, start: u16, length: u32) -> Result<Self, SlaveError> {
        let last = u32::from(start) + length;
        if length == 0 || length > MAX_WINDOW_LENGTH || last > MAX_WINDOW_LENGTH {
            return Err(SlaveError::InvalidWindow { start, length });
        }

        Ok(Self {
            instrument_address,
            start,
            end: (last - 1) as u16,
        })
    }

    /// Address this slave answers to
    pub fn instrument_address(&self) -> u8 {
        self.instrument_address
    }

    /// First register address
    pub fn start(&self) -> u16 {
        self.start
    }

    /// Last register address (inclusive)
    pub fn end(&self) -> u16 {
        self.end
    }

    /// Number of registers in the window
    pub fn len(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    /// A window always holds at least one register
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Check whether an absolute address falls inside the window
    pub fn contains(&self, address: u16) -> bool {
        (self.start..=self.end).contains(&address)
    }

    /// Index of an absolute address in the backing array
    pub fn index_of(&self, address: u16) -> Option<usize> {
        self.contains(address)
            .then(|| usize::from(address - self.start))
    }

    /// Absolute address of a backing array index
    pub fn address_of(&self, index: usize) -> Option<u16> {
        (index < self.len()).then(|| self.start + index as u16)
    }

    /// Resolve a request range to its first index.
    ///
    /// The request covers `start..=start + count - 1`; it must start at or
    /// after the window start and end at or before the window end. Partial
    /// overlap resolves to `None`. An empty range passes when its start lies
    /// in `window_start..=window_end + 1`, except at address 0 where the last
    /// address would be negative.
    pub fn range_index(&self, start: u16, count: u16) -> Option<usize> {
        let last = i32::from(start) + i32::from(count) - 1;
        if start < self.start || last < 0 || last > i32::from(self.end) {
            return None;
        }
        Some(usize::from(start - self.start))
    }
}

/// Serialized form of a window, validated on the way in
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct WindowFields {
    instrument_address: u8,
    window_start: u16,
    window_length: u32,
}

impl TryFrom<WindowFields> for RegisterWindow {
    type Error = SlaveError;

    fn try_from(fields: WindowFields) -> Result<Self, Self::Error> {
        RegisterWindow::new(fields.instrument_address, fields.window_start, fields.window_length)
    }
}

impl From<RegisterWindow> for WindowFields {
    fn from(window: RegisterWindow) -> Self {
        Self {
            instrument_address: window.instrument_address,
            window_start: window.start,
            window_length: window.len() as u32,
        }
    }
}

/// Fixed-length holding register array
#[derive(Debug, Clone)]
pub struct RegisterStore {
    window: RegisterWindow,
    values: Box<[u16]>,
}

impl RegisterStore {
    /// Create a zeroed store covering `window`
    pub fn new(window: RegisterWindow) -> Self {
        Self {
            window,
            values: vec![0u16; window.len()].into_boxed_slice(),
        }
    }

    /// The window this store represents
    pub fn window(&self) -> &RegisterWindow {
        &self.window
    }

    /// Number of registers
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// A store always holds at least one register
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Read a register by index
    pub fn get(&self, index: usize) -> Option<u16> {
        self.values.get(index).copied()
    }

    /// Write a register by index
    pub fn set(&mut self, index: usize, value: u16) -> Result<(), SlaveError> {
        let len = self.values.len();
        let slot = self
            .values
            .get_mut(index)
            .ok_or(SlaveError::IndexOutOfRange { index, len })?;
        *slot = value;
        Ok(())
    }

    /// Read a register by absolute address
    pub fn get_at(&self, address: u16) -> Option<u16> {
        self.window.index_of(address).and_then(|i| self.get(i))
    }

    /// Write a register by absolute address
    pub fn set_at(&mut self, address: u16, value: u16) -> Result<(), SlaveError> {
        let index = self
            .window
            .index_of(address)
            .ok_or(SlaveError::AddressOutOfWindow(address))?;
        self.set(index, value)
    }

    /// Borrow `count` consecutive registers starting at `index`
    pub fn slice(&self, index: usize, count: usize) -> Option<&[u16]> {
        self.values.get(index..index.checked_add(count)?)
    }

    /// Mutably borrow `count` consecutive registers starting at `index`
    pub fn slice_mut(&mut self, index: usize, count: usize) -> Option<&mut [u16]> {
        self.values.get_mut(index..index.checked_add(count)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> RegisterWindow {
        RegisterWindow::new(17, 100, 5).unwrap()
    }

    #[test]
    fn test_window_bounds() {
        let w = window();
        assert_eq!(w.start(), 100);
        assert_eq!(w.end(), 104);
        assert_eq!(w.len(), 5);
        assert!(w.contains(100));
        assert!(w.contains(104));
        assert!(!w.contains(99));
        assert!(!w.contains(105));
    }

    #[test]
    fn test_window_rejects_invalid_lengths() {
        assert!(RegisterWindow::new(1, 0, 0).is_err());
        assert!(RegisterWindow::new(1, 1, MAX_WINDOW_LENGTH).is_err());
        assert!(RegisterWindow::new(1, 0xFFFF, 2).is_err());

        let full = RegisterWindow::new(1, 0, MAX_WINDOW_LENGTH).unwrap();
        assert_eq!(full.end(), 0xFFFF);
        assert_eq!(full.len(), 65536);

        let last = RegisterWindow::new(1, 0xFFFF, 1).unwrap();
        assert_eq!(last.end(), 0xFFFF);
    }

    #[test]
    fn test_index_address_mapping() {
        let w = window();
        assert_eq!(w.index_of(102), Some(2));
        assert_eq!(w.index_of(105), None);
        assert_eq!(w.address_of(4), Some(104));
        assert_eq!(w.address_of(5), None);
    }

    #[test]
    fn test_range_index_requires_full_containment() {
        let w = window();
        assert_eq!(w.range_index(100, 5), Some(0));
        assert_eq!(w.range_index(103, 2), Some(3));
        assert_eq!(w.range_index(103, 3), None);
        assert_eq!(w.range_index(99, 2), None);
        assert_eq!(w.range_index(0xFFFF, 0xFFFF), None);
    }

    #[test]
    fn test_range_index_empty_ranges() {
        let w = window();
        assert_eq!(w.range_index(100, 0), Some(0));
        assert_eq!(w.range_index(105, 0), Some(5));
        assert_eq!(w.range_index(106, 0), None);
        assert_eq!(w.range_index(99, 0), None);

        // Address 0 with no registers ends below the address space
        let low = RegisterWindow::new(1, 0, 4).unwrap();
        assert_eq!(low.range_index(0, 0), None);
        assert_eq!(low.range_index(1, 0), Some(1));
    }

    #[test]
    fn test_store_zero_initialised() {
        let store = RegisterStore::new(window());
        assert_eq!(store.len(), 5);
        assert!((0..5).all(|i| store.get(i) == Some(0)));
    }

    #[test]
    fn test_store_set_by_index_and_address() {
        let mut store = RegisterStore::new(window());
        store.set(1, 0x1234).unwrap();
        store.set_at(104, 0xBEEF).unwrap();

        assert_eq!(store.get_at(101), Some(0x1234));
        assert_eq!(store.get(4), Some(0xBEEF));
        assert!(matches!(
            store.set(5, 1),
            Err(SlaveError::IndexOutOfRange { index: 5, len: 5 })
        ));
        assert!(matches!(
            store.set_at(99, 1),
            Err(SlaveError::AddressOutOfWindow(99))
        ));
    }

    #[test]
    fn test_store_slices() {
        let mut store = RegisterStore::new(window());
        store.slice_mut(2, 3).unwrap().copy_from_slice(&[7, 8, 9]);
        assert_eq!(store.slice(1, 3), Some(&[0, 7, 8][..]));
        assert_eq!(store.slice(3, 3), None);
    }

    #[test]
    fn test_window_deserialize_validates() {
        let ok: RegisterWindow = serde_json::from_str(
            r#"{"instrument_address": 17, "window_start": 100, "window_length": 5}"#,
        )
        .unwrap();
        assert_eq!(ok, window());

        let bad = serde_json::from_str::<RegisterWindow>(
            r#"{"instrument_address": 17, "window_start": 65535, "window_length": 5}"#,
        );
        assert!(bad.is_err());
    }
}
