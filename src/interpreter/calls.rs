//! Call frames: entering and leaving functions, call stubs and branches
//!
//! Every call pushes a [`CallStub`] recording where the result goes and where
//! execution resumes. Returning from a function and finishing a printed string
//! both end in [`Engine::resume_call_stub`], which pops that stub.

use super::constants::{FUNC_LOCAL_ARGS, FUNC_STACK_ARGS};
use super::engine::{Engine, ExecMode};
use super::errors::{VmError, VmResult};
use crate::memory::stack::{CallStub, DestType};
use crate::opcodes::machine::DelayedStore;
use log::debug;

impl Engine {
    /// Build a frame for the function at `address` and point `pc` at its code.
    /// `args` are copied into the locals; extra locals are zeroed.
    pub(crate) fn enter_function(&mut self, address: u32, args: &[u32]) -> VmResult<()> {
        self.exec_mode = ExecMode::Code;
        let fp = self.stack.sp;
        self.stack.fp = fp;
        self.stack.push(0)?;
        self.stack.push(0)?;

        // copy the locals format, terminator included
        let mut pos = address + 1;
        let mut layout = Vec::new();
        let mut local_size = 0u32;
        loop {
            let size = self.image.read_byte(pos)? as u32;
            let count = self.image.read_byte(pos + 1)? as u32;
            pos += 2;
            let sp = self.stack.sp;
            self.stack.write_byte(sp, size)?;
            self.stack.write_byte(sp + 1, count)?;
            self.stack.sp += 2;
            if size == 0 || count == 0 {
                break;
            }
            if !matches!(size, 1 | 2 | 4) {
                return Err(VmError::InvalidLocalsFormat(address));
            }
            local_size = align(local_size, size) + size * count;
            layout.push((size, count));
        }
        self.pad_stack()?;

        let locals_pos = self.stack.sp - fp;
        self.stack.write_u32(fp + 4, locals_pos)?;

        let base = self.stack.sp;
        for i in 0..local_size {
            self.stack.write_byte(base + i, 0)?;
        }
        let mut offset = 0;
        let mut values = args.iter().copied();
        for (size, count) in layout {
            offset = align(offset, size);
            for _ in 0..count {
                let value = values.next().unwrap_or(0);
                match size {
                    1 => self.stack.write_byte(base + offset, value & 0xFF)?,
                    2 => self.stack.write_u16(base + offset, value & 0xFFFF)?,
                    _ => self.stack.write_u32(base + offset, value)?,
                }
                offset += size;
            }
        }
        self.stack.sp += local_size;
        self.pad_stack()?;

        let frame_len = self.stack.sp - fp;
        self.stack.write_u32(fp, frame_len)?;
        self.stack.frame_len = frame_len;
        self.stack.locals_pos = locals_pos;
        self.pc = pos;
        Ok(())
    }

    fn pad_stack(&mut self) -> VmResult<()> {
        while self.stack.sp % 4 != 0 {
            let sp = self.stack.sp;
            self.stack.write_byte(sp, 0)?;
            self.stack.sp += 1;
        }
        Ok(())
    }

    /// Call the function at `address`. Native veneer routines run at once and
    /// store their result; bytecode functions get a new frame.
    pub(crate) fn call_function(
        &mut self,
        address: u32,
        args: &[u32],
        dest: DelayedStore,
        tail_call: bool,
    ) -> VmResult<()> {
        if let Some(routine) = self.veneer.intercept(address) {
            let result = self.veneer.call(routine, &mut self.image, args)?;
            if tail_call {
                self.exec_mode = ExecMode::Return;
                self.pc = result;
            } else {
                self.store_delayed(dest, result)?;
            }
            return Ok(());
        }

        let kind = self.image.read_byte(address)?;
        if kind != FUNC_STACK_ARGS && kind != FUNC_LOCAL_ARGS {
            return Err(VmError::InvalidFunctionType { kind, address });
        }
        debug!("call {:#010x} with {} args", address, args.len());

        if tail_call {
            self.stack.sp = self.stack.fp;
        } else {
            let stub = CallStub::new(dest.dest_type, dest.dest_addr, self.pc, self.stack.fp);
            self.stack.push_stub(stub)?;
        }

        if kind == FUNC_STACK_ARGS {
            self.enter_function(address, &[])?;
            for &arg in args.iter().rev() {
                self.stack.push(arg)?;
            }
            self.stack.push(args.len() as u32)?;
        } else {
            self.enter_function(address, args)?;
        }
        Ok(())
    }

    /// Return `result` from the current function; returning from the
    /// outermost frame ends the game
    pub(crate) fn return_from_function(&mut self, result: u32) -> VmResult<()> {
        if self.stack.fp == 0 {
            self.running = false;
            return Ok(());
        }
        self.stack.sp = self.stack.fp;
        self.resume_call_stub(result)
    }

    /// Pop a call stub and continue where it says, delivering `result`
    pub(crate) fn resume_call_stub(&mut self, result: u32) -> VmResult<()> {
        let stub = self.stack.pop_stub()?;
        let dest_type =
            DestType::try_from(stub.dest_type).map_err(VmError::InvalidDestType)?;

        self.pc = stub.pc;
        self.exec_mode = ExecMode::Code;

        let new_fp = stub.frame_ptr;
        let frame_len = self.stack.read_u32(new_fp)?;
        let locals_pos = self.stack.read_u32(new_fp + 4)?;

        match dest_type {
            // printing continues inside the same frame
            DestType::ResumeFunction => return Ok(()),
            DestType::ResumeCString => self.exec_mode = ExecMode::CString,
            DestType::ResumeUnicode => self.exec_mode = ExecMode::UnicodeString,
            DestType::ResumeNumber => {
                self.exec_mode = ExecMode::Number;
                self.printing_digit = stub.dest_addr;
            }
            DestType::ResumeCompressed => {
                self.exec_mode = ExecMode::CompressedString;
                self.printing_digit = stub.dest_addr;
            }
            DestType::Null | DestType::Memory | DestType::Local | DestType::Stack => {}
        }

        self.stack.fp = new_fp;
        self.stack.frame_len = frame_len;
        self.stack.locals_pos = locals_pos;

        self.store_delayed(
            DelayedStore {
                dest_type,
                dest_addr: stub.dest_addr,
            },
            result,
        )
    }

    /// Write a value captured for later. Resume destinations are not stores
    /// and are ignored here.
    pub(crate) fn store_delayed(&mut self, dest: DelayedStore, value: u32) -> VmResult<()> {
        match dest.dest_type {
            DestType::Memory => self.image.write_u32(dest.dest_addr, value),
            DestType::Local => {
                let at = self.stack.local_address(dest.dest_addr, 4)?;
                self.stack.write_u32(at, value)
            }
            DestType::Stack => self.stack.push(value),
            _ => Ok(()),
        }
    }

    /// Branch by `offset`; offsets 0 and 1 return that value instead
    pub(crate) fn branch(&mut self, offset: u32) -> VmResult<()> {
        match offset {
            0 | 1 => self.return_from_function(offset),
            _ => {
                self.pc = self.pc.wrapping_add(offset).wrapping_sub(2);
                Ok(())
            }
        }
    }
}

fn align(offset: u32, size: u32) -> u32 {
    (offset + size - 1) & !(size - 1)
}
