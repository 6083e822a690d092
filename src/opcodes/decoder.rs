//! Instruction decoder
//!
//! Turns the bytes at an address into a [`DecodedInstruction`]: the opcode,
//! its operands in declared order, and the total encoded length.

use super::operands::{LoadOperand, Operand, StoreOperand};
use super::{Opcode, OpcodeRule};
use crate::interpreter::errors::{VmError, VmResult};
use crate::memory::MemoryArea;

/// One decoded instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub address: u32,
    pub opcode: Opcode,
    pub loads: Vec<LoadOperand>,
    pub stores: Vec<StoreOperand>,
    /// Store operand handed to the handler instead of being stored
    pub delayed: Option<StoreOperand>,
    /// Encoded size in bytes
    pub length: u32,
}

impl DecodedInstruction {
    pub fn next_pc(&self) -> u32 {
        self.address.wrapping_add(self.length)
    }

    /// Operands in the order they were encoded
    pub fn operands(&self) -> Vec<Operand> {
        let mut out = Vec::with_capacity(self.opcode.operand_count());
        if self.opcode.rule() == OpcodeRule::Catch {
            out.extend(self.delayed.map(Operand::from));
            out.extend(self.loads.iter().copied().map(Operand::from));
        } else {
            out.extend(self.loads.iter().copied().map(Operand::from));
            out.extend(self.stores.iter().copied().map(Operand::from));
            out.extend(self.delayed.map(Operand::from));
        }
        out
    }
}

/// Read the variable-length opcode number at `address`; returns the number
/// and how many bytes it took
pub fn read_opcode_number(mem: &MemoryArea, address: u32) -> VmResult<(u32, u32)> {
    let first = mem.read_byte(address)?;
    Ok(if first < 0x80 {
        (first as u32, 1)
    } else if first < 0xC0 {
        (mem.read_u16(address)? as u32 - 0x8000, 2)
    } else {
        (mem.read_u32(address)? - 0xC000_0000, 4)
    })
}

pub fn decode(mem: &MemoryArea, address: u32) -> VmResult<DecodedInstruction> {
    let (code, prefix) = read_opcode_number(mem, address)?;
    let opcode = Opcode::try_from(code)
        .map_err(|opcode| VmError::UnknownOpcode { opcode, address })?;

    let count = opcode.operand_count();
    let mut pos = address + prefix;
    let mut modes = Vec::with_capacity(count);
    for i in 0..count {
        let byte = mem.read_byte(pos + (i / 2) as u32)?;
        modes.push(if i % 2 == 0 { byte & 0x0F } else { byte >> 4 });
    }
    pos += count.div_ceil(2) as u32;

    let mut modes = modes.into_iter();
    let mut next_mode = || modes.next().unwrap_or(0);

    let mut loads = Vec::with_capacity(opcode.load_count());
    let mut stores = Vec::with_capacity(opcode.store_count());
    let mut delayed = None;

    if opcode.rule() == OpcodeRule::Catch {
        delayed = Some(decode_store(mem, &mut pos, next_mode(), address)?);
        loads.push(decode_load(mem, &mut pos, next_mode(), address)?);
    } else {
        for _ in 0..opcode.load_count() {
            loads.push(decode_load(mem, &mut pos, next_mode(), address)?);
        }
        for _ in 0..opcode.store_count() {
            stores.push(decode_store(mem, &mut pos, next_mode(), address)?);
        }
        if opcode.rule() == OpcodeRule::DelayedStore {
            delayed = Some(decode_store(mem, &mut pos, next_mode(), address)?);
        }
    }

    Ok(DecodedInstruction {
        address,
        opcode,
        loads,
        stores,
        delayed,
        length: pos - address,
    })
}

/// Read an unsigned value of 1, 2 or 4 bytes and advance `pos`
fn read_sized(mem: &MemoryArea, pos: &mut u32, width: u32) -> VmResult<u32> {
    let value = match width {
        1 => mem.read_byte(*pos)? as u32,
        2 => mem.read_u16(*pos)? as u32,
        _ => mem.read_u32(*pos)?,
    };
    *pos += width;
    Ok(value)
}

fn mode_width(mode: u8) -> u32 {
    match mode & 0x3 {
        1 => 1,
        2 => 2,
        _ => 4,
    }
}

fn decode_load(mem: &MemoryArea, pos: &mut u32, mode: u8, address: u32) -> VmResult<LoadOperand> {
    Ok(match mode {
        0x0 => LoadOperand::Const(0),
        0x1 => LoadOperand::Const(read_sized(mem, pos, 1)? as u8 as i8 as i32 as u32),
        0x2 => LoadOperand::Const(read_sized(mem, pos, 2)? as u16 as i16 as i32 as u32),
        0x3 => LoadOperand::Const(read_sized(mem, pos, 4)?),
        0x5..=0x7 => LoadOperand::Memory(read_sized(mem, pos, mode_width(mode))?),
        0x8 => LoadOperand::Stack,
        0x9..=0xB => LoadOperand::Local(read_sized(mem, pos, mode_width(mode))?),
        0xD..=0xF => LoadOperand::Ram(read_sized(mem, pos, mode_width(mode))?),
        _ => return Err(VmError::InvalidOperandType { mode, address }),
    })
}

fn decode_store(mem: &MemoryArea, pos: &mut u32, mode: u8, address: u32) -> VmResult<StoreOperand> {
    Ok(match mode {
        0x0 => StoreOperand::Discard,
        0x5..=0x7 => StoreOperand::Memory(read_sized(mem, pos, mode_width(mode))?),
        0x8 => StoreOperand::Stack,
        0x9..=0xB => StoreOperand::Local(read_sized(mem, pos, mode_width(mode))?),
        0xD..=0xF => StoreOperand::Ram(read_sized(mem, pos, mode_width(mode))?),
        _ => return Err(VmError::InvalidStoreOperandType { mode, address }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::encoder::encode_opcode;

    fn decode_bytes(bytes: &[u8]) -> DecodedInstruction {
        let mem = MemoryArea::from_bytes(bytes.to_vec(), 0);
        decode(&mem, 0).unwrap()
    }

    #[test]
    fn test_decode_add_to_memory() {
        // add 1 1 -> *0x3A0
        let instr = decode_bytes(&[0x10, 0x11, 0x06, 0x01, 0x01, 0x03, 0xA0]);
        assert_eq!(instr.opcode, Opcode::Add);
        assert_eq!(instr.loads, vec![LoadOperand::Const(1), LoadOperand::Const(1)]);
        assert_eq!(instr.stores, vec![StoreOperand::Memory(0x3A0)]);
        assert_eq!(instr.length, 7);
    }

    #[test]
    fn test_sign_extension() {
        // copy -1 -> push
        let instr = decode_bytes(&[0x40, 0x81, 0xFF]);
        assert_eq!(instr.loads, vec![LoadOperand::Const(0xFFFF_FFFF)]);
        assert_eq!(instr.stores, vec![StoreOperand::Stack]);
    }

    #[test]
    fn test_two_and_four_byte_opcodes() {
        let instr = decode_bytes(&[0x81, 0x02, 0x08]);
        assert_eq!(instr.opcode, Opcode::Getmemsize);
        assert_eq!(instr.length, 3);
        let instr = decode_bytes(&[0xC0, 0x00, 0x10, 0x00, 0x11, 0x81, 0x01, 0x05, 0x09]);
        assert_eq!(instr.opcode, Opcode::Fyrecall);
        assert_eq!(
            instr.loads,
            vec![
                LoadOperand::Const(1),
                LoadOperand::Const(5),
                LoadOperand::Const(9)
            ]
        );
        assert_eq!(instr.stores, vec![StoreOperand::Stack]);
    }

    #[test]
    fn test_catch_operand_order() {
        // catch push 8
        let instr = decode_bytes(&[0x32, 0x18, 0x08]);
        assert_eq!(instr.delayed, Some(StoreOperand::Stack));
        assert_eq!(instr.loads, vec![LoadOperand::Const(8)]);
        assert_eq!(instr.length, 3);
    }

    #[test]
    fn test_invalid_modes() {
        let mem = MemoryArea::from_bytes(vec![0x40, 0x14, 0x00], 0);
        assert!(matches!(
            decode(&mem, 0),
            Err(VmError::InvalidOperandType { mode: 4, .. })
        ));
        let mem = MemoryArea::from_bytes(vec![0x40, 0x11, 0x00, 0x00], 0);
        assert!(matches!(
            decode(&mem, 0),
            Err(VmError::InvalidStoreOperandType { mode: 1, .. })
        ));
        let mem = MemoryArea::from_bytes(vec![0x16], 0);
        assert!(matches!(
            decode(&mem, 0),
            Err(VmError::UnknownOpcode { opcode: 0x16, .. })
        ));
    }

    fn sample_operand(i: usize) -> Operand {
        match i % 7 {
            0 => Operand::Const(-3),
            1 => Operand::Addr(0x1234),
            2 => Operand::Stack,
            3 => Operand::Local(8),
            4 => Operand::Ram(0x10_0000),
            5 => Operand::Const(0x12_3456),
            _ => Operand::Const(0),
        }
    }

    #[test]
    fn test_round_trip_every_opcode() {
        for &op in Opcode::ALL {
            let catch = op.rule() == OpcodeRule::Catch;
            let stores_from = if catch { 0 } else { op.load_count() };
            let operands: Vec<Operand> = (0..op.operand_count())
                .map(|i| {
                    let candidate = sample_operand(i + op.code() as usize);
                    let is_store = if catch { i == 0 } else { i >= stores_from };
                    match candidate {
                        Operand::Const(v) if is_store && v != 0 => Operand::Stack,
                        other => other,
                    }
                })
                .collect();
            let bytes = encode_opcode(op.mnemonic(), &operands).unwrap();
            let instr = decode_bytes(&bytes);
            assert_eq!(instr.opcode, op);
            assert_eq!(instr.operands(), operands, "{}", op);
            assert_eq!(instr.length as usize, bytes.len(), "{}", op);
        }
    }
}
