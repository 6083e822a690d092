//! Byte-addressable memory for the VM
//!
//! This module provides the storage abstractions everything else builds on:
//! - [`MemoryArea`]: a growable, capacity-capped byte buffer with big-endian accessors
//! - [`heap`]: the first-fit allocator behind `malloc`/`mfree`
//! - [`stack`]: the call/value stack with its frame registers and call stubs
//!
//! # Access Rules
//!
//! All multi-byte values are big-endian. Reads and writes past the current
//! logical size fail with [`MemoryError::OutOfRange`]. Writes also reject a
//! value that does not fit the access width, so a narrow store of a wide value
//! shows up as an error instead of silent truncation.

pub mod heap;
pub mod stack;

use thiserror::Error;

/// Errors raised by [`MemoryArea`] accessors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("memory access out of range: {len} byte(s) at {address:#010x} (size {size:#x})")]
    OutOfRange { address: u32, len: u32, size: u32 },

    #[error("value {value:#x} does not fit in {width} byte(s)")]
    ValueTooWide { value: u32, width: u32 },
}

/// A contiguous big-endian byte region with a hard capacity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryArea {
    bytes: Vec<u8>,
    max_size: u32,
}

impl MemoryArea {
    /// Create a zero-filled region of `size` bytes that may grow up to `max_size`
    pub fn new(size: u32, max_size: u32) -> Self {
        MemoryArea {
            bytes: vec![0; size as usize],
            max_size: max_size.max(size),
        }
    }

    /// Wrap existing bytes; the capacity is at least their length
    pub fn from_bytes(bytes: Vec<u8>, max_size: u32) -> Self {
        let len = bytes.len() as u32;
        MemoryArea {
            bytes,
            max_size: max_size.max(len),
        }
    }

    pub fn size(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    fn range(&self, address: u32, len: u32) -> Result<std::ops::Range<usize>, MemoryError> {
        let start = address as usize;
        let end = start + len as usize;
        if end > self.bytes.len() {
            return Err(MemoryError::OutOfRange {
                address,
                len,
                size: self.size(),
            });
        }
        Ok(start..end)
    }

    pub fn read_byte(&self, address: u32) -> Result<u8, MemoryError> {
        let r = self.range(address, 1)?;
        Ok(self.bytes[r.start])
    }

    pub fn read_u16(&self, address: u32) -> Result<u16, MemoryError> {
        let r = self.range(address, 2)?;
        Ok(u16::from_be_bytes([self.bytes[r.start], self.bytes[r.start + 1]]))
    }

    pub fn read_u32(&self, address: u32) -> Result<u32, MemoryError> {
        let r = self.range(address, 4)?;
        let b = &self.bytes[r];
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_bytes(&self, address: u32, len: u32) -> Result<&[u8], MemoryError> {
        let r = self.range(address, len)?;
        Ok(&self.bytes[r])
    }

    pub fn write_byte(&mut self, address: u32, value: u32) -> Result<(), MemoryError> {
        if value > 0xFF {
            return Err(MemoryError::ValueTooWide { value, width: 1 });
        }
        let r = self.range(address, 1)?;
        self.bytes[r.start] = value as u8;
        Ok(())
    }

    pub fn write_u16(&mut self, address: u32, value: u32) -> Result<(), MemoryError> {
        if value > 0xFFFF {
            return Err(MemoryError::ValueTooWide { value, width: 2 });
        }
        let r = self.range(address, 2)?;
        self.bytes[r].copy_from_slice(&(value as u16).to_be_bytes());
        Ok(())
    }

    pub fn write_u32(&mut self, address: u32, value: u32) -> Result<(), MemoryError> {
        let r = self.range(address, 4)?;
        self.bytes[r].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn write_bytes(&mut self, address: u32, data: &[u8]) -> Result<(), MemoryError> {
        let r = self.range(address, data.len() as u32)?;
        self.bytes[r].copy_from_slice(data);
        Ok(())
    }

    /// Set `len` bytes starting at `address` to `value`
    pub fn fill(&mut self, address: u32, len: u32, value: u8) -> Result<(), MemoryError> {
        let r = self.range(address, len)?;
        self.bytes[r].fill(value);
        Ok(())
    }

    /// Read `len` bytes as Latin-1 text
    pub fn read_ascii(&self, address: u32, len: u32) -> Result<String, MemoryError> {
        Ok(self.read_bytes(address, len)?.iter().map(|&b| b as char).collect())
    }

    /// Read a zero-terminated Latin-1 string
    pub fn read_cstring(&self, address: u32) -> Result<String, MemoryError> {
        let start = address as usize;
        if start > self.bytes.len() {
            return Err(MemoryError::OutOfRange {
                address,
                len: 1,
                size: self.size(),
            });
        }
        match self.bytes[start..].iter().position(|&b| b == 0) {
            Some(len) => self.read_ascii(address, len as u32),
            None => Err(MemoryError::OutOfRange {
                address,
                len: self.size() - address + 1,
                size: self.size(),
            }),
        }
    }

    /// Write text as Latin-1, replacing characters above U+00FF with `?`
    pub fn write_ascii(&mut self, address: u32, text: &str) -> Result<(), MemoryError> {
        let bytes: Vec<u8> = text
            .chars()
            .map(|c| if (c as u32) < 0x100 { c as u8 } else { b'?' })
            .collect();
        self.write_bytes(address, &bytes)
    }

    /// Resize the logical region. Returns `false` (leaving the region alone)
    /// when `new_size` exceeds the capacity.
    pub fn set_end_mem(&mut self, new_size: u32) -> bool {
        if new_size > self.max_size {
            return false;
        }
        self.bytes.resize(new_size as usize, 0);
        true
    }

    /// Copy `len` bytes starting at `offset` into a new region. Bytes past
    /// the current end read as zero.
    pub fn copy(&self, offset: u32, len: u32) -> MemoryArea {
        let mut bytes = vec![0; len as usize];
        let start = (offset as usize).min(self.bytes.len());
        let end = (offset as usize + len as usize).min(self.bytes.len());
        bytes[..end - start].copy_from_slice(&self.bytes[start..end]);
        MemoryArea::from_bytes(bytes, len)
    }
}
