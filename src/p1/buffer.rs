//! Fixed-capacity telegram buffer with checked access.
//!
//! The session owns one buffer and reuses it for every read. Writes never
//! grow it past the capacity chosen at open time, and reads by offset return
//! `None` instead of running off either end.

use crate::error::P1Error;

#[derive(Debug, Default)]
pub struct TelegramBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl TelegramBuffer {
    /// Allocates a buffer holding at most `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Result<Self, P1Error> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| P1Error::BufferAllocation(capacity))?;
        Ok(TelegramBuffer { data, capacity })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.data.len())
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Appends `byte`; returns `false` and leaves the buffer untouched when full.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.data.push(byte);
        true
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.data.get(index).copied()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Frees the storage; the buffer has capacity 0 afterwards.
    pub fn release(&mut self) {
        self.data = Vec::new();
        self.capacity = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_stops_at_capacity() {
        let mut buffer = TelegramBuffer::with_capacity(3).unwrap();
        assert!(buffer.push(b'/'));
        assert!(buffer.push(b'A'));
        assert!(buffer.push(b'!'));
        assert!(buffer.is_full());
        assert!(!buffer.push(b'\r'));
        assert_eq!(buffer.as_slice(), b"/A!");
        assert_eq!(buffer.remaining(), 0);
    }

    #[test]
    fn test_get_is_bounds_checked() {
        let mut buffer = TelegramBuffer::with_capacity(8).unwrap();
        buffer.push(b'/');
        assert_eq!(buffer.get(0), Some(b'/'));
        assert_eq!(buffer.get(1), None);
        assert_eq!(buffer.get(usize::MAX), None);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut buffer = TelegramBuffer::with_capacity(4).unwrap();
        buffer.push(1);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 4);
        assert_eq!(buffer.remaining(), 4);
    }

    #[test]
    fn test_release() {
        let mut buffer = TelegramBuffer::with_capacity(4).unwrap();
        buffer.push(1);
        buffer.release();
        assert_eq!(buffer.capacity(), 0);
        assert!(buffer.is_full());
        assert!(!buffer.push(2));
    }

    #[test]
    fn test_huge_allocation_fails_cleanly() {
        let err = TelegramBuffer::with_capacity(usize::MAX).unwrap_err();
        assert!(matches!(err, P1Error::BufferAllocation(usize::MAX)));
    }
}
