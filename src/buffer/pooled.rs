//! Pooled Network Buffers
//!
//! Three views over packet bytes:
//!
//! - [`PooledBuffer`]: a uniquely owned, fixed-capacity buffer cut from a
//!   [`BufferPool`]. It has a write cursor (`len`) and is where outbound
//!   packets are built and where a session stages received bytes. Dropping
//!   it zeroes the memory and returns it to the pool.
//! - [`SharedBuffer`]: a frozen, reference-counted `PooledBuffer`. Every
//!   holder (the application, each in-flight write) owns one reference; the
//!   holder that drops the last reference recycles the memory, exactly once.
//! - [`BufferReader`]: a read-only cursor over borrowed bytes, used to pick
//!   fields out of a received packet without copying. It never owns, and so
//!   never frees, the bytes it reads.
//!
//! All multi-byte integers are little-endian, matching the packet header.

use crate::buffer::pool::BufferPool;
use std::sync::Arc;
use thiserror::Error;

/// Errors from buffer reads and writes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// A write would run past the buffer capacity. Nothing was written.
    #[error("buffer capacity exceeded: need {needed} bytes, {available} available")]
    CapacityExceeded { needed: usize, available: usize },

    /// A read asked for more bytes than remain. The cursor did not move.
    #[error("insufficient data: need {needed} bytes, {available} remaining")]
    InsufficientData { needed: usize, available: usize },

    /// A length-prefixed string field was not valid UTF-8
    #[error("invalid UTF-8 in string field")]
    InvalidString,
}

/// A fixed-capacity byte buffer owned by one holder and recycled on drop.
pub struct PooledBuffer {
    storage: Box<[u8]>,
    len: usize,
    pool: BufferPool,
}

impl PooledBuffer {
    pub(crate) fn from_parts(storage: Box<[u8]>, pool: BufferPool) -> Self {
        Self {
            storage,
            len: 0,
            pool,
        }
    }

    /// Total capacity; fixed for the life of the buffer.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Room left after the write cursor.
    pub fn remaining(&self) -> usize {
        self.capacity() - self.len
    }

    /// The written bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.storage[..self.len]
    }

    /// Appends `bytes` at the write cursor.
    ///
    /// Fails with [`BufferError::CapacityExceeded`] and leaves the buffer
    /// untouched if the bytes do not fit.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        if bytes.len() > self.remaining() {
            return Err(BufferError::CapacityExceeded {
                needed: bytes.len(),
                available: self.remaining(),
            });
        }
        self.storage[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    /// Replaces the contents with `bytes`.
    pub fn set_data(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        if bytes.len() > self.capacity() {
            return Err(BufferError::CapacityExceeded {
                needed: bytes.len(),
                available: self.capacity(),
            });
        }
        self.clear();
        self.write(bytes)
    }

    pub fn put_u8(&mut self, value: u8) -> Result<(), BufferError> {
        self.write(&[value])
    }

    pub fn put_u16(&mut self, value: u16) -> Result<(), BufferError> {
        self.write(&value.to_le_bytes())
    }

    pub fn put_u32(&mut self, value: u32) -> Result<(), BufferError> {
        self.write(&value.to_le_bytes())
    }

    pub fn put_u64(&mut self, value: u64) -> Result<(), BufferError> {
        self.write(&value.to_le_bytes())
    }

    pub fn put_i32(&mut self, value: i32) -> Result<(), BufferError> {
        self.write(&value.to_le_bytes())
    }

    /// Writes a `u32` byte length followed by the UTF-8 bytes of `value`.
    ///
    /// Either both parts are written or neither is.
    pub fn put_str(&mut self, value: &str) -> Result<(), BufferError> {
        let needed = 4 + value.len();
        if needed > self.remaining() {
            return Err(BufferError::CapacityExceeded {
                needed,
                available: self.remaining(),
            });
        }
        self.put_u32(value.len() as u32)?;
        self.write(value.as_bytes())
    }

    /// Zeroes the written region and rewinds the write cursor.
    pub fn clear(&mut self) {
        self.storage[..self.len].fill(0);
        self.len = 0;
    }

    /// The whole backing storage, ignoring the write cursor.
    ///
    /// Used by the receive path, which tracks its own fill level.
    pub(crate) fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    /// Freezes the buffer into a shareable, reference-counted handle.
    pub fn freeze(self) -> SharedBuffer {
        SharedBuffer {
            inner: Arc::new(self),
        }
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let storage = std::mem::take(&mut self.storage);
        if !storage.is_empty() {
            self.pool.recycle(storage);
        }
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len)
            .finish()
    }
}

/// An immutable, reference-counted pooled buffer.
///
/// Cloning (or [`retain`](Self::retain)) adds a reference; dropping (or
/// [`release`](Self::release)) removes one. The count is a single atomic,
/// and only the decrement that takes it to zero runs the recycle, so a
/// buffer shared between the application and any number of in-flight
/// writes is returned to the pool exactly once.
#[derive(Clone)]
pub struct SharedBuffer {
    inner: Arc<PooledBuffer>,
}

impl SharedBuffer {
    pub fn as_slice(&self) -> &[u8] {
        self.inner.as_slice()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Adds a reference.
    pub fn retain(&self) -> SharedBuffer {
        self.clone()
    }

    /// Drops this reference.
    ///
    /// Returns `true` if it was the last one, in which case the buffer has
    /// been recycled by this call.
    pub fn release(self) -> bool {
        Arc::into_inner(self.inner).is_some()
    }

    /// Number of live references.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl AsRef<[u8]> for SharedBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl std::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("len", &self.len())
            .field("refs", &self.ref_count())
            .finish()
    }
}

/// A read-only cursor over borrowed bytes.
#[derive(Debug, Clone)]
pub struct BufferReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BufferReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Consumes and returns the next `count` bytes.
    pub fn read(&mut self, count: usize) -> Result<&'a [u8], BufferError> {
        if count > self.remaining() {
            return Err(BufferError::InsufficientData {
                needed: count,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], BufferError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read(N)?);
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8, BufferError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16, BufferError> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn get_u32(&mut self) -> Result<u32, BufferError> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub fn get_u64(&mut self) -> Result<u64, BufferError> {
        self.read_array().map(u64::from_le_bytes)
    }

    pub fn get_i32(&mut self) -> Result<i32, BufferError> {
        self.read_array().map(i32::from_le_bytes)
    }

    /// Reads a string written by [`PooledBuffer::put_str`].
    ///
    /// On any error the cursor is left where it was.
    pub fn get_str(&mut self) -> Result<&'a str, BufferError> {
        let start = self.pos;
        let result = self
            .get_u32()
            .and_then(|len| self.read(len as usize))
            .and_then(|bytes| std::str::from_utf8(bytes).map_err(|_| BufferError::InvalidString));
        if result.is_err() {
            self.pos = start;
        }
        result
    }
}
