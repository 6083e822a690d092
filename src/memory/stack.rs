//! Call stack implementation
//!
//! The stack is one fixed-size byte region holding call frames and values
//! interleaved:
//! - [`Stack`]: the region plus the frame registers (`sp`, `fp`, `frame_len`, `locals_pos`)
//! - [`CallStub`]: the four-word resume record pushed under every call or print redirect
//! - [`DestType`]: what a stub does with the value it is resumed with
//!
//! # Frame Layout
//!
//! ```text
//! fp + 0           frame_len
//! fp + 4           locals_pos
//! fp + 8           locals format pairs, zero padded to 4 bytes
//! fp + locals_pos  locals, naturally aligned, zero padded to 4 bytes
//! fp + frame_len   value stack
//! ```

use super::MemoryArea;
use crate::interpreter::errors::{VmError, VmResult};

/// Destination kinds recorded in a call stub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestType {
    Null = 0,
    Memory = 1,
    Local = 2,
    Stack = 3,
    ResumeCompressed = 10,
    ResumeFunction = 11,
    ResumeNumber = 12,
    ResumeCString = 13,
    ResumeUnicode = 14,
}

impl TryFrom<u32> for DestType {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => DestType::Null,
            1 => DestType::Memory,
            2 => DestType::Local,
            3 => DestType::Stack,
            10 => DestType::ResumeCompressed,
            11 => DestType::ResumeFunction,
            12 => DestType::ResumeNumber,
            13 => DestType::ResumeCString,
            14 => DestType::ResumeUnicode,
            other => return Err(other),
        })
    }
}

/// Resume record: pushed as `dest_type, dest_addr, pc, frame_ptr` (frame_ptr on top)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallStub {
    pub dest_type: u32,
    pub dest_addr: u32,
    pub pc: u32,
    pub frame_ptr: u32,
}

impl CallStub {
    pub fn new(dest_type: DestType, dest_addr: u32, pc: u32, frame_ptr: u32) -> Self {
        CallStub {
            dest_type: dest_type as u32,
            dest_addr,
            pc,
            frame_ptr,
        }
    }
}

/// The VM stack and its frame registers
#[derive(Debug, Clone)]
pub struct Stack {
    area: MemoryArea,
    pub sp: u32,
    pub fp: u32,
    pub frame_len: u32,
    pub locals_pos: u32,
}

impl Stack {
    pub fn new(size: u32) -> Self {
        Stack {
            area: MemoryArea::new(size, size),
            sp: 0,
            fp: 0,
            frame_len: 0,
            locals_pos: 0,
        }
    }

    /// Drop every frame
    pub fn reset(&mut self) {
        self.sp = 0;
        self.fp = 0;
        self.frame_len = 0;
        self.locals_pos = 0;
    }

    pub fn size(&self) -> u32 {
        self.area.size()
    }

    /// Stack bytes from the bottom up to `sp`
    pub fn contents(&self) -> &[u8] {
        &self.area.as_slice()[..self.sp as usize]
    }

    /// Replace the stack contents, leaving `sp` just past them
    pub fn load(&mut self, bytes: &[u8]) -> VmResult<()> {
        if bytes.len() > self.area.size() as usize {
            return Err(VmError::StackOverflow);
        }
        self.area.write_bytes(0, bytes)?;
        self.sp = bytes.len() as u32;
        Ok(())
    }

    pub fn read_byte(&self, offset: u32) -> VmResult<u8> {
        Ok(self.area.read_byte(offset)?)
    }

    pub fn read_u16(&self, offset: u32) -> VmResult<u16> {
        Ok(self.area.read_u16(offset)?)
    }

    pub fn read_u32(&self, offset: u32) -> VmResult<u32> {
        Ok(self.area.read_u32(offset)?)
    }

    pub fn write_byte(&mut self, offset: u32, value: u32) -> VmResult<()> {
        self.area
            .write_byte(offset, value)
            .map_err(|_| VmError::StackOverflow)
    }

    pub fn write_u16(&mut self, offset: u32, value: u32) -> VmResult<()> {
        self.area
            .write_u16(offset, value)
            .map_err(|_| VmError::StackOverflow)
    }

    pub fn write_u32(&mut self, offset: u32, value: u32) -> VmResult<()> {
        self.area
            .write_u32(offset, value)
            .map_err(|_| VmError::StackOverflow)
    }

    pub fn push(&mut self, value: u32) -> VmResult<()> {
        self.write_u32(self.sp, value)?;
        self.sp += 4;
        Ok(())
    }

    /// Pop a value from the current frame's value stack
    pub fn pop(&mut self) -> VmResult<u32> {
        if self.sp < self.values_base() + 4 {
            return Err(VmError::StackUnderflow);
        }
        self.sp -= 4;
        self.read_u32(self.sp)
    }

    /// Number of values above the current frame
    pub fn count(&self) -> u32 {
        self.sp.saturating_sub(self.values_base()) / 4
    }

    /// The value `depth` entries below the top (0 is the top)
    pub fn peek(&self, depth: u32) -> VmResult<u32> {
        if depth >= self.count() {
            return Err(VmError::StackUnderflow);
        }
        self.read_u32(self.sp - 4 * (depth + 1))
    }

    pub fn swap(&mut self) -> VmResult<()> {
        let a = self.pop()?;
        let b = self.pop()?;
        self.push(a)?;
        self.push(b)
    }

    /// Rotate the top `count` values by `shift` places; positive shifts move
    /// values toward the top
    pub fn roll(&mut self, count: u32, shift: i32) -> VmResult<()> {
        if count == 0 {
            return Ok(());
        }
        if count > self.count() {
            return Err(VmError::StackUnderflow);
        }
        let base = self.sp - 4 * count;
        let values = (0..count)
            .map(|i| self.read_u32(base + 4 * i))
            .collect::<VmResult<Vec<u32>>>()?;
        let n = count as i64;
        for (i, value) in values.into_iter().enumerate() {
            let to = (i as i64 + shift as i64).rem_euclid(n) as u32;
            self.write_u32(base + 4 * to, value)?;
        }
        Ok(())
    }

    /// Push a copy of the top `count` values
    pub fn copy_top(&mut self, count: u32) -> VmResult<()> {
        if count > self.count() {
            return Err(VmError::StackUnderflow);
        }
        let base = self.sp - 4 * count;
        for i in 0..count {
            let value = self.read_u32(base + 4 * i)?;
            self.push(value)?;
        }
        Ok(())
    }

    pub fn push_stub(&mut self, stub: CallStub) -> VmResult<()> {
        self.push(stub.dest_type)?;
        self.push(stub.dest_addr)?;
        self.push(stub.pc)?;
        self.push(stub.frame_ptr)
    }

    /// Pop a call stub without the frame underflow check; stubs sit below
    /// the frame they resume into.
    pub fn pop_stub(&mut self) -> VmResult<CallStub> {
        if self.sp < 16 {
            return Err(VmError::StackUnderflow);
        }
        self.sp -= 16;
        Ok(CallStub {
            dest_type: self.read_u32(self.sp)?,
            dest_addr: self.read_u32(self.sp + 4)?,
            pc: self.read_u32(self.sp + 8)?,
            frame_ptr: self.read_u32(self.sp + 12)?,
        })
    }

    /// Stack offset of a local variable of `width` bytes, checked against the frame
    pub fn local_address(&self, offset: u32, width: u32) -> VmResult<u32> {
        let start = self.locals_pos.checked_add(offset);
        let end = start.and_then(|start| start.checked_add(width));
        match (start, end) {
            (Some(start), Some(end)) if end <= self.frame_len => Ok(self.fp + start),
            _ => Err(VmError::LocalOutOfRange(offset)),
        }
    }

    fn values_base(&self) -> u32 {
        self.fp + self.frame_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_with(values: &[u32]) -> Stack {
        let mut stack = Stack::new(256);
        for &v in values {
            stack.push(v).unwrap();
        }
        stack
    }

    #[test]
    fn test_pop_underflow_at_frame_base() {
        let mut stack = Stack::new(64);
        stack.fp = 0;
        stack.frame_len = 8;
        stack.sp = 8;
        assert!(matches!(stack.pop(), Err(VmError::StackUnderflow)));
        stack.push(5).unwrap();
        assert_eq!(stack.pop().unwrap(), 5);
    }

    #[test]
    fn test_stub_push_order() {
        let mut stack = Stack::new(64);
        stack
            .push_stub(CallStub::new(DestType::Memory, 0x40, 0x100, 0x20))
            .unwrap();
        assert_eq!(stack.read_u32(0).unwrap(), 1);
        assert_eq!(stack.read_u32(12).unwrap(), 0x20);
        let stub = stack.pop_stub().unwrap();
        assert_eq!(stub.pc, 0x100);
        assert_eq!(stub.dest_addr, 0x40);
        assert_eq!(stack.sp, 0);
    }

    #[test]
    fn test_roll_moves_values_up() {
        // bottom..top: 8 7 6 5 4 3 2 1 0
        let mut stack = stack_with(&[8, 7, 6, 5, 4, 3, 2, 1, 0]);
        stack.roll(5, 1).unwrap();
        let values: Vec<u32> = (0..9).rev().map(|d| stack.peek(d).unwrap()).collect();
        assert_eq!(values, vec![8, 7, 6, 5, 0, 4, 3, 2, 1]);
    }

    #[test]
    fn test_roll_negative_shift() {
        let mut stack = stack_with(&[3, 2, 1, 0]);
        stack.roll(3, -1).unwrap();
        let values: Vec<u32> = (0..4).rev().map(|d| stack.peek(d).unwrap()).collect();
        assert_eq!(values, vec![3, 1, 0, 2]);
    }

    #[test]
    fn test_copy_and_swap() {
        let mut stack = stack_with(&[1, 2]);
        stack.copy_top(2).unwrap();
        assert_eq!(stack.count(), 4);
        stack.swap().unwrap();
        assert_eq!(stack.peek(0).unwrap(), 1);
        assert_eq!(stack.peek(1).unwrap(), 2);
    }

    #[test]
    fn test_local_address_bounds() {
        let mut stack = Stack::new(64);
        stack.fp = 0;
        stack.locals_pos = 12;
        stack.frame_len = 16;
        assert_eq!(stack.local_address(0, 4).unwrap(), 12);
        assert!(stack.local_address(1, 4).is_err());
        assert!(stack.local_address(3, 1).is_ok());
        assert!(stack.local_address(0xFFFF_FFF2, 4).is_err());
    }

    #[test]
    fn test_dest_type_conversion() {
        assert_eq!(DestType::try_from(13), Ok(DestType::ResumeCString));
        assert_eq!(DestType::try_from(4), Err(4));
    }
}
