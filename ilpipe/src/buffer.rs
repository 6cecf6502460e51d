// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Buffer descriptors exchanged between callers and the engine.
//!
//! A [`Buffer`] is moved, never shared: at any instant it sits in exactly one
//! of a port pool, the engine, or a caller's hands. Every transfer across the
//! engine boundary is a move of the value, so the single-owner invariant is
//! enforced by the type system rather than by bookkeeping.

use bitflags::bitflags;

use crate::{Error, Result};

bitflags! {
    /// Per-buffer flags carried alongside the payload.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        const END_OF_STREAM = ilpipe_sys::BUFFERFLAG_EOS;
        const START_TIME = ilpipe_sys::BUFFERFLAG_STARTTIME;
        const DECODE_ONLY = ilpipe_sys::BUFFERFLAG_DECODEONLY;
        const DATA_CORRUPT = ilpipe_sys::BUFFERFLAG_DATACORRUPT;
        const END_OF_FRAME = ilpipe_sys::BUFFERFLAG_ENDOFFRAME;
        const SYNC_FRAME = ilpipe_sys::BUFFERFLAG_SYNCFRAME;
        const EXTRA_DATA = ilpipe_sys::BUFFERFLAG_EXTRADATA;
        const CODEC_CONFIG = ilpipe_sys::BUFFERFLAG_CODECCONFIG;
        const TIME_UNKNOWN = ilpipe_sys::BUFFERFLAG_TIME_UNKNOWN;
    }
}

/// A fixed-capacity, singly-owned unit of media data.
///
/// The valid payload is the `filled_len` bytes starting at `offset` inside the
/// buffer's storage. Timestamps are in microseconds.
///
/// # Examples
///
/// ```
/// use ilpipe::{Buffer, BufferFlags};
///
/// let mut buffer = Buffer::new(130, 16);
/// buffer.fill(b"frame");
/// buffer.set_timestamp(40_000);
/// buffer.set_flags(BufferFlags::END_OF_FRAME);
/// assert_eq!(buffer.payload(), b"frame");
/// ```
pub struct Buffer {
    data: Vec<u8>,
    /// Padding in front of the storage needed to honor the port alignment.
    start: usize,
    capacity: usize,
    filled_len: usize,
    offset: usize,
    timestamp: i64,
    flags: BufferFlags,
    port: u32,
    index: usize,
}

impl Buffer {
    /// Creates a zeroed buffer of `capacity` bytes attached to `port`.
    pub fn new(port: u32, capacity: usize) -> Self {
        Self::aligned(port, capacity, 1)
    }

    /// Creates a zeroed buffer whose storage starts on an `alignment` boundary.
    ///
    /// An alignment of 0 or 1 means no constraint. Non power-of-two alignments
    /// are rounded up to the next power of two.
    pub fn aligned(port: u32, capacity: usize, alignment: usize) -> Self {
        let alignment = alignment.max(1).next_power_of_two();
        let data = vec![0u8; capacity + alignment - 1];
        let start = data.as_ptr().align_offset(alignment);
        Self {
            data,
            start,
            capacity,
            filled_len: 0,
            offset: 0,
            timestamp: 0,
            flags: BufferFlags::empty(),
            port,
            index: 0,
        }
    }

    /// Total number of bytes the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn filled_len(&self) -> usize {
        self.filled_len
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Presentation timestamp in microseconds.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    /// Index of the port this buffer belongs to.
    pub fn port(&self) -> u32 {
        self.port
    }

    /// Slot of this buffer inside its pool.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Address of the storage, stable for the lifetime of the buffer.
    ///
    /// Engines use it to recognise buffers they have seen before.
    pub fn as_ptr(&self) -> *const u8 {
        self.storage().as_ptr()
    }

    /// The whole storage region, regardless of how much is filled.
    pub fn storage(&self) -> &[u8] {
        &self.data[self.start..self.start + self.capacity]
    }

    pub fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.start..self.start + self.capacity]
    }

    /// The valid payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.storage()[self.offset..self.offset + self.filled_len]
    }

    /// Copies as much of `bytes` as fits, starting at offset 0.
    ///
    /// Returns the number of bytes copied.
    pub fn fill(&mut self, bytes: &[u8]) -> usize {
        let len = bytes.len().min(self.capacity);
        self.storage_mut()[..len].copy_from_slice(&bytes[..len]);
        self.offset = 0;
        self.filled_len = len;
        len
    }

    /// Marks `len` bytes starting at `offset` as the valid payload.
    pub fn set_filled(&mut self, offset: usize, len: usize) -> Result<()> {
        if offset.checked_add(len).is_none_or(|end| end > self.capacity) {
            return Err(Error::Other(format!(
                "Payload {offset}+{len} exceeds buffer capacity {}.",
                self.capacity
            )));
        }
        self.offset = offset;
        self.filled_len = len;
        Ok(())
    }

    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    pub fn set_flags(&mut self, flags: BufferFlags) {
        self.flags = flags;
    }

    /// Clears payload, timestamp and flags so the buffer can be reused.
    pub fn reset(&mut self) {
        self.filled_len = 0;
        self.offset = 0;
        self.timestamp = 0;
        self.flags = BufferFlags::empty();
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("port", &self.port)
            .field("index", &self.index)
            .field("capacity", &self.capacity)
            .field("filled_len", &self.filled_len)
            .field("offset", &self.offset)
            .field("timestamp", &self.timestamp)
            .field("flags", &self.flags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_storage_honors_alignment() {
        let buffer = Buffer::aligned(0, 100, 64);
        assert_eq!(buffer.as_ptr() as usize % 64, 0);
        assert_eq!(buffer.storage().len(), 100);
    }

    #[test]
    fn fill_truncates_to_capacity() {
        let mut buffer = Buffer::new(0, 4);
        assert_eq!(buffer.fill(b"abcdef"), 4);
        assert_eq!(buffer.payload(), b"abcd");
    }

    #[test]
    fn set_filled_rejects_overflow() {
        let mut buffer = Buffer::new(0, 8);
        assert!(buffer.set_filled(4, 4).is_ok());
        assert!(buffer.set_filled(4, 5).is_err());
        assert!(buffer.set_filled(usize::MAX, 2).is_err());
    }
}
