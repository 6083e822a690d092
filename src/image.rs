//! Loaded game image: header, ROM and RAM
//!
//! The [`Image`] keeps the original file bytes alongside the live memory so the
//! game can be reverted for `restart`, fingerprinted for saves, and verified.

use crate::interpreter::errors::{VmError, VmResult};
use crate::memory::heap::HeapBacking;
use crate::memory::MemoryArea;
use crate::snapshot::quetzal::Quetzal;
use log::debug;

pub const HEADER_SIZE: u32 = 36;
pub const MAGIC: u32 = 0x476C_756C; // "Glul"

/// Size of the header fingerprint stored in saves
pub const IFHD_SIZE: usize = 128;

/// Fixed fields at the start of a game file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub version: u32,
    pub ram_start: u32,
    pub ext_start: u32,
    pub end_mem: u32,
    pub stack_size: u32,
    pub start_func: u32,
    pub decoding_table: u32,
    pub checksum: u32,
}

impl Header {
    /// Parse and validate the header fields
    pub fn parse(bytes: &[u8]) -> VmResult<Header> {
        if bytes.len() < HEADER_SIZE as usize {
            return Err(VmError::ImageTooShort(bytes.len()));
        }
        let word = |i: usize| u32::from_be_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        let header = Header {
            magic: word(0),
            version: word(4),
            ram_start: word(8),
            ext_start: word(12),
            end_mem: word(16),
            stack_size: word(20),
            start_func: word(24),
            decoding_table: word(28),
            checksum: word(32),
        };

        if header.magic != MAGIC {
            return Err(VmError::BadMagic(header.magic));
        }
        let (major, minor) = (header.major_version(), header.minor_version());
        if !(2..=3).contains(&major) || (major == 3 && minor > 1) {
            return Err(VmError::UnsupportedVersion { major, minor });
        }
        if header.ram_start > header.end_mem || header.end_mem < HEADER_SIZE {
            return Err(VmError::InconsistentHeader {
                ram_start: header.ram_start,
                end_mem: header.end_mem,
            });
        }
        Ok(header)
    }

    pub fn major_version(&self) -> u32 {
        self.version >> 16
    }

    pub fn minor_version(&self) -> u32 {
        (self.version >> 8) & 0xFF
    }
}

/// Game memory with a read-only ROM below `ram_start`
#[derive(Debug, Clone)]
pub struct Image {
    original: Vec<u8>,
    header: Header,
    memory: MemoryArea,
}

impl Image {
    /// Load a game file. Memory may later grow up to `max_memory` bytes.
    pub fn new(original: Vec<u8>, max_memory: u32) -> VmResult<Image> {
        let header = Header::parse(&original)?;
        if header.end_mem > max_memory {
            return Err(VmError::MemoryLimit {
                requested: header.end_mem,
                limit: max_memory,
            });
        }
        let memory = Self::initial_memory(&original, &header, max_memory);
        Ok(Image {
            original,
            header,
            memory,
        })
    }

    fn initial_memory(original: &[u8], header: &Header, max_memory: u32) -> MemoryArea {
        let mut bytes = vec![0; header.end_mem as usize];
        let len = original
            .len()
            .min(header.ext_start as usize)
            .min(bytes.len());
        bytes[..len].copy_from_slice(&original[..len]);
        MemoryArea::from_bytes(bytes, max_memory)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn memory(&self) -> &MemoryArea {
        &self.memory
    }

    pub fn ram_start(&self) -> u32 {
        self.header.ram_start
    }

    /// Current end of memory
    pub fn end_mem(&self) -> u32 {
        self.memory.size()
    }

    /// `end_mem` as declared by the game file
    pub fn original_end_mem(&self) -> u32 {
        self.header.end_mem
    }

    pub fn get_ram_address(&self, relative: u32) -> u32 {
        self.header.ram_start.wrapping_add(relative)
    }

    pub fn read_byte(&self, address: u32) -> VmResult<u8> {
        Ok(self.memory.read_byte(address)?)
    }

    pub fn read_u16(&self, address: u32) -> VmResult<u16> {
        Ok(self.memory.read_u16(address)?)
    }

    pub fn read_u32(&self, address: u32) -> VmResult<u32> {
        Ok(self.memory.read_u32(address)?)
    }

    pub fn read_bytes(&self, address: u32, len: u32) -> VmResult<&[u8]> {
        Ok(self.memory.read_bytes(address, len)?)
    }

    pub fn read_cstring(&self, address: u32) -> VmResult<String> {
        Ok(self.memory.read_cstring(address)?)
    }

    fn check_ram(&self, address: u32) -> VmResult<()> {
        if address < self.header.ram_start {
            return Err(VmError::RomWrite(address));
        }
        Ok(())
    }

    pub fn write_byte(&mut self, address: u32, value: u32) -> VmResult<()> {
        self.check_ram(address)?;
        Ok(self.memory.write_byte(address, value)?)
    }

    pub fn write_u16(&mut self, address: u32, value: u32) -> VmResult<()> {
        self.check_ram(address)?;
        Ok(self.memory.write_u16(address, value)?)
    }

    pub fn write_u32(&mut self, address: u32, value: u32) -> VmResult<()> {
        self.check_ram(address)?;
        Ok(self.memory.write_u32(address, value)?)
    }

    pub fn write_bytes(&mut self, address: u32, data: &[u8]) -> VmResult<()> {
        self.check_ram(address)?;
        Ok(self.memory.write_bytes(address, data)?)
    }

    /// Zero `len` bytes of RAM starting at `address`
    pub fn zero_bytes(&mut self, address: u32, len: u32) -> VmResult<()> {
        if len == 0 {
            return Ok(());
        }
        self.check_ram(address)?;
        Ok(self.memory.fill(address, len, 0)?)
    }

    /// Resize memory, rounding `value` up to a multiple of 256
    pub fn set_end_mem(&mut self, value: u32) -> bool {
        let rounded = match value.checked_add(0xFF) {
            Some(v) => v & !0xFF,
            None => return false,
        };
        if rounded < self.header.ram_start {
            return false;
        }
        self.memory.set_end_mem(rounded)
    }

    /// The first 128 bytes of the original file
    pub fn original_ifhd(&self) -> Vec<u8> {
        let mut ifhd = vec![0; IFHD_SIZE];
        let len = self.original.len().min(IFHD_SIZE);
        ifhd[..len].copy_from_slice(&self.original[..len]);
        ifhd
    }

    /// Whether the file checksum matches its contents
    pub fn verify(&self) -> bool {
        let len = self.original.len().min(self.header.ext_start as usize) / 4 * 4;
        let sum = self.original[..len]
            .chunks_exact(4)
            .enumerate()
            .filter(|(i, _)| *i != 8)
            .fold(0u32, |acc, (_, w)| {
                acc.wrapping_add(u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
            });
        sum == self.header.checksum
    }

    /// Add the `IFhd` fingerprint and an uncompressed `UMem` RAM dump
    pub fn save_to_quetzal(&self, quetzal: &mut Quetzal) {
        quetzal.add_chunk(*b"IFhd", self.original_ifhd());

        let ram = &self.memory.as_slice()[self.header.ram_start as usize..];
        let mut umem = Vec::with_capacity(4 + ram.len());
        umem.extend_from_slice(&(ram.len() as u32).to_be_bytes());
        umem.extend_from_slice(ram);
        quetzal.add_chunk(*b"UMem", umem);
    }

    /// Load RAM from a `UMem` chunk, keeping `protect` (start, length) intact
    pub fn restore_from_quetzal(
        &mut self,
        quetzal: &Quetzal,
        protect: Option<(u32, u32)>,
    ) -> VmResult<()> {
        let umem = match quetzal.get_chunk(*b"UMem") {
            Some(umem) => umem,
            None if quetzal.get_chunk(*b"CMem").is_some() => {
                return Err(VmError::CompressedMemory)
            }
            None => return Err(VmError::MissingChunk("UMem")),
        };
        if umem.len() < 4 {
            return Err(VmError::CorruptChunk("UMem"));
        }
        let len = u32::from_be_bytes([umem[0], umem[1], umem[2], umem[3]]);
        let ram = &umem[4..];
        if ram.len() != len as usize {
            return Err(VmError::CorruptChunk("UMem"));
        }

        let saved = self.save_protected(protect);
        let new_end = self.header.ram_start + len;
        if !self.memory.set_end_mem(new_end) {
            return Err(VmError::CorruptChunk("UMem"));
        }
        self.memory.write_bytes(self.header.ram_start, ram)?;
        self.restore_protected(saved)?;
        debug!("restored {:#x} bytes of RAM", len);
        Ok(())
    }

    /// Reload everything from the original file, keeping `protect` intact
    pub fn revert(&mut self, protect: Option<(u32, u32)>) -> VmResult<()> {
        let saved = self.save_protected(protect);
        let max = self.memory.max_size();
        self.memory = Self::initial_memory(&self.original, &self.header, max);
        self.restore_protected(saved)
    }

    fn save_protected(&self, protect: Option<(u32, u32)>) -> Option<(u32, Vec<u8>)> {
        let (start, len) = protect.filter(|&(_, len)| len > 0)?;
        let len = len.min(self.memory.size().saturating_sub(start));
        let region = self.memory.copy(start, len);
        Some((start, region.as_slice().to_vec()))
    }

    fn restore_protected(&mut self, saved: Option<(u32, Vec<u8>)>) -> VmResult<()> {
        let Some((start, bytes)) = saved else {
            return Ok(());
        };
        let end = (start as usize + bytes.len()).min(self.memory.size() as usize);
        if (start as usize) < end {
            let len = end - start as usize;
            self.memory.write_bytes(start, &bytes[..len])?;
        }
        Ok(())
    }
}

impl HeapBacking for Image {
    fn end_mem(&self) -> u32 {
        self.memory.size()
    }

    fn resize(&mut self, new_end: u32) -> bool {
        self.set_end_mem(new_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: u32 = 0x10000;

    fn game(version: u32, ram_start: u32, end_mem: u32) -> Vec<u8> {
        let mut bytes = vec![0u8; 512];
        let fields = [MAGIC, version, ram_start, 512, end_mem, 1024, 256, 0, 0];
        for (i, f) in fields.iter().enumerate() {
            bytes[i * 4..i * 4 + 4].copy_from_slice(&f.to_be_bytes());
        }
        bytes
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = game(0x0003_0102, 256, 1024);
        bytes[0] = b'X';
        assert!(matches!(Image::new(bytes, LIMIT), Err(VmError::BadMagic(_))));
    }

    #[test]
    fn test_version_gate() {
        assert!(Image::new(game(0x0002_0000, 256, 1024), LIMIT).is_ok());
        assert!(Image::new(game(0x0003_0100, 256, 1024), LIMIT).is_ok());
        assert!(matches!(
            Image::new(game(0x0003_0200, 256, 1024), LIMIT),
            Err(VmError::UnsupportedVersion { major: 3, minor: 2 })
        ));
        assert!(Image::new(game(0x0001_0000, 256, 1024), LIMIT).is_err());
        assert!(Image::new(game(0x0004_0000, 256, 1024), LIMIT).is_err());
    }

    #[test]
    fn test_inconsistent_header() {
        assert!(matches!(
            Image::new(game(0x0003_0102, 2048, 1024), LIMIT),
            Err(VmError::InconsistentHeader { .. })
        ));
    }

    #[test]
    fn test_rom_is_read_only() {
        let mut image = Image::new(game(0x0003_0102, 256, 1024), LIMIT).unwrap();
        assert!(matches!(image.write_u32(0x40, 1), Err(VmError::RomWrite(0x40))));
        image.write_u32(0x100, 7).unwrap();
        assert_eq!(image.read_u32(0x100).unwrap(), 7);
        assert_eq!(image.end_mem(), 1024);
    }

    #[test]
    fn test_set_end_mem_rounds_up() {
        let mut image = Image::new(game(0x0003_0102, 256, 1024), 0x10000).unwrap();
        assert!(image.set_end_mem(1025));
        assert_eq!(image.end_mem(), 1280);
        assert!(!image.set_end_mem(0x20000));
    }

    #[test]
    fn test_revert_keeps_protected_range() {
        let mut image = Image::new(game(0x0003_0102, 256, 1024), LIMIT).unwrap();
        image.write_u32(0x100, 0xAAAA_AAAA).unwrap();
        image.write_u32(0x200, 0xBBBB_BBBB).unwrap();
        image.revert(Some((0x200, 4))).unwrap();
        assert_eq!(image.read_u32(0x100).unwrap(), 0);
        assert_eq!(image.read_u32(0x200).unwrap(), 0xBBBB_BBBB);
    }

    #[test]
    fn test_revert_clamps_protected_range_to_memory() {
        let mut image = Image::new(game(0x0003_0102, 256, 1024), LIMIT).unwrap();
        image.write_u32(0x3FC, 0xCCCC_CCCC).unwrap();
        image.revert(Some((0x3FC, u32::MAX))).unwrap();
        assert_eq!(image.read_u32(0x3FC).unwrap(), 0xCCCC_CCCC);
        assert_eq!(image.end_mem(), 1024);
    }

    #[test]
    fn test_quetzal_ram_round_trip() {
        let mut image = Image::new(game(0x0003_0102, 256, 1024), LIMIT).unwrap();
        image.write_u32(0x180, 42).unwrap();
        let mut quetzal = Quetzal::new();
        image.save_to_quetzal(&mut quetzal);
        image.write_u32(0x180, LIMIT).unwrap();
        image.restore_from_quetzal(&quetzal, None).unwrap();
        assert_eq!(image.read_u32(0x180).unwrap(), 42);
        assert_eq!(quetzal.get_chunk(*b"IFhd").unwrap().len(), IFHD_SIZE);
    }

    #[test]
    fn test_cmem_only_is_rejected() {
        let mut image = Image::new(game(0x0003_0102, 256, 1024), LIMIT).unwrap();
        let mut quetzal = Quetzal::new();
        quetzal.add_chunk(*b"CMem", vec![0, 0, 0, 0]);
        assert!(matches!(
            image.restore_from_quetzal(&quetzal, None),
            Err(VmError::CompressedMemory)
        ));
    }

    #[test]
    fn test_verify_checksum() {
        let mut bytes = game(0x0003_0102, 256, 1024);
        bytes[0x100] = 1;
        let sum = bytes
            .chunks_exact(4)
            .map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
            .fold(0u32, u32::wrapping_add);
        bytes[32..36].copy_from_slice(&sum.to_be_bytes());
        let image = Image::new(bytes.clone(), LIMIT).unwrap();
        assert!(image.verify());
        bytes[0x101] = 1;
        let image = Image::new(bytes, LIMIT).unwrap();
        assert!(!image.verify());
    }

    #[test]
    fn test_end_mem_over_limit_is_rejected() {
        assert!(matches!(
            Image::new(game(0x0003_0102, 256, 0x4000_0000), LIMIT),
            Err(VmError::MemoryLimit {
                requested: 0x4000_0000,
                limit: LIMIT
            })
        ));
    }

    #[test]
    fn test_memory_cap_holds_after_load() {
        let mut image = Image::new(game(0x0003_0102, 256, 1024), 2048).unwrap();
        assert!(image.set_end_mem(2048));
        assert!(!image.set_end_mem(2049));
    }
}
