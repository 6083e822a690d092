//! String printing and the output systems
//!
//! `streamstr` and `streamnum` do not print in one go. They push a call stub
//! and switch the engine into a printing mode, where each [`Engine::step`]
//! produces one character. With the filter output system each character
//! becomes a call to the filter function, whose stub resumes the printing
//! mode afterwards. Compressed strings may also call functions or print
//! other strings from inside their decoding table.

use super::constants::{FUNC_LOCAL_ARGS, FUNC_STACK_ARGS, STRING_C, STRING_COMPRESSED, STRING_UNICODE};
use super::engine::{Engine, ExecMode};
use super::errors::{VmError, VmResult};
use crate::memory::stack::{CallStub, DestType};
use crate::opcodes::machine::{DelayedStore, IoSystem};

impl Engine {
    /// Send one character to the active output system. With the filter
    /// system this calls the filter function.
    pub(crate) fn stream_char_core(&mut self, ch: u32) -> VmResult<()> {
        match self.io_system {
            IoSystem::Null => Ok(()),
            IoSystem::Filter(filter) => self.call_function(filter, &[ch], DelayedStore::NULL, false),
            IoSystem::Glk | IoSystem::Channels => {
                self.write_output(ch);
                Ok(())
            }
        }
    }

    /// Append a character to the current channel
    pub(crate) fn write_output(&mut self, ch: u32) {
        self.output
            .write_char(char::from_u32(ch).unwrap_or(char::REPLACEMENT_CHARACTER));
    }

    /// Print a character from inside a printing mode. A filter call resumes
    /// the mode through `resume`, carrying `position` as the digit or bit index.
    fn emit_in_mode(&mut self, ch: u32, resume: DestType, position: u32) -> VmResult<()> {
        match self.io_system {
            IoSystem::Filter(filter) => {
                let dest = DelayedStore {
                    dest_type: resume,
                    dest_addr: position,
                };
                self.call_function(filter, &[ch], dest, false)
            }
            _ => self.stream_char_core(ch),
        }
    }

    pub(crate) fn print_number(&mut self, value: u32) -> VmResult<()> {
        self.push_resume_stub(DestType::ResumeFunction, 0)?;
        self.exec_mode = ExecMode::Number;
        self.pc = value;
        self.printing_digit = 0;
        Ok(())
    }

    pub(crate) fn print_string(&mut self, address: u32) -> VmResult<()> {
        // validate before the stub goes on
        self.string_kind(address)?;
        self.push_resume_stub(DestType::ResumeFunction, 0)?;
        self.enter_string(address)
    }

    fn push_resume_stub(&mut self, resume: DestType, position: u32) -> VmResult<()> {
        let stub = CallStub::new(resume, position, self.pc, self.stack.fp);
        self.stack.push_stub(stub)
    }

    fn string_kind(&self, address: u32) -> VmResult<u8> {
        let kind = self.image.read_byte(address)?;
        match kind {
            STRING_C | STRING_UNICODE => Ok(kind),
            STRING_COMPRESSED if self.decoding_table == 0 => Err(VmError::NoDecodingTable),
            STRING_COMPRESSED => Ok(kind),
            _ => Err(VmError::InvalidStringType { kind, address }),
        }
    }

    /// Switch into the printing mode for the string object at `address`
    fn enter_string(&mut self, address: u32) -> VmResult<()> {
        let (mode, start) = match self.string_kind(address)? {
            STRING_C => (ExecMode::CString, address + 1),
            // type byte plus three bytes of padding
            STRING_UNICODE => (ExecMode::UnicodeString, address + 4),
            _ => (ExecMode::CompressedString, address + 1),
        };
        self.exec_mode = mode;
        self.pc = start;
        self.printing_digit = 0;
        Ok(())
    }

    pub(crate) fn next_cstring_char(&mut self) -> VmResult<()> {
        let ch = self.image.read_byte(self.pc)? as u32;
        if ch == 0 {
            return self.resume_call_stub(0);
        }
        self.pc += 1;
        self.emit_in_mode(ch, DestType::ResumeCString, 0)
    }

    pub(crate) fn next_unicode_char(&mut self) -> VmResult<()> {
        let ch = self.image.read_u32(self.pc)?;
        if ch == 0 {
            return self.resume_call_stub(0);
        }
        self.pc += 4;
        self.emit_in_mode(ch, DestType::ResumeUnicode, 0)
    }

    pub(crate) fn next_digit(&mut self) -> VmResult<()> {
        let text = (self.pc as i32).to_string();
        let index = self.printing_digit;
        let Some(&digit) = text.as_bytes().get(index as usize) else {
            return self.resume_call_stub(0);
        };
        self.printing_digit += 1;
        self.emit_in_mode(digit as u32, DestType::ResumeNumber, index + 1)
    }

    fn next_bit(&mut self) -> VmResult<bool> {
        let byte = self.image.read_byte(self.pc)?;
        let bit = (byte >> self.printing_digit) & 1 != 0;
        self.printing_digit += 1;
        if self.printing_digit == 8 {
            self.printing_digit = 0;
            self.pc += 1;
        }
        Ok(bit)
    }

    /// Walk the decoding table from the root to a leaf and act on it
    pub(crate) fn next_compressed_char(&mut self) -> VmResult<()> {
        if self.decoding_table == 0 {
            return Err(VmError::NoDecodingTable);
        }
        let mut node = self.image.read_u32(self.decoding_table + 8)?;
        loop {
            let kind = self.image.read_byte(node)?;
            match kind {
                // branch: left child for a 0 bit, right for a 1
                0x00 => {
                    let right = self.next_bit()?;
                    node = self.image.read_u32(node + if right { 5 } else { 1 })?;
                }
                0x01 => return self.resume_call_stub(0),
                0x02 => {
                    let ch = self.image.read_byte(node + 1)? as u32;
                    return self.emit_in_mode(ch, DestType::ResumeCompressed, self.printing_digit);
                }
                0x04 => {
                    let ch = self.image.read_u32(node + 1)?;
                    return self.emit_in_mode(ch, DestType::ResumeCompressed, self.printing_digit);
                }
                0x03 => return self.embedded_string(node + 1, false),
                0x05 => return self.embedded_string(node + 1, true),
                0x08..=0x0B => return self.indirect_reference(node, kind),
                _ => return Err(VmError::InvalidNodeType { kind, address: node }),
            }
        }
    }

    /// A string stored directly in a table leaf
    fn embedded_string(&mut self, start: u32, unicode: bool) -> VmResult<()> {
        if let IoSystem::Filter(_) = self.io_system {
            // print it through the filter in its own mode, then come back
            self.push_resume_stub(DestType::ResumeCompressed, self.printing_digit)?;
            self.pc = start;
            self.printing_digit = 0;
            self.exec_mode = if unicode {
                ExecMode::UnicodeString
            } else {
                ExecMode::CString
            };
            return Ok(());
        }

        let mut at = start;
        loop {
            let ch = if unicode {
                self.image.read_u32(at)?
            } else {
                self.image.read_byte(at)? as u32
            };
            if ch == 0 {
                return Ok(());
            }
            self.stream_char_core(ch)?;
            at += if unicode { 4 } else { 1 };
        }
    }

    /// Leaf pointing at a string or function, possibly through a pointer and
    /// possibly with arguments
    fn indirect_reference(&mut self, node: u32, kind: u8) -> VmResult<()> {
        let mut address = self.image.read_u32(node + 1)?;
        if kind == 0x09 || kind == 0x0B {
            address = self.image.read_u32(address)?;
        }
        let args = if kind >= 0x0A {
            let count = self.image.read_u32(node + 5)?;
            (0..count)
                .map(|i| self.image.read_u32(node + 9 + 4 * i))
                .collect::<VmResult<Vec<u32>>>()?
        } else {
            Vec::new()
        };

        let target = self.image.read_byte(address)?;
        match target {
            STRING_C | STRING_COMPRESSED | STRING_UNICODE => {
                self.string_kind(address)?;
                self.push_resume_stub(DestType::ResumeCompressed, self.printing_digit)?;
                self.enter_string(address)
            }
            FUNC_STACK_ARGS | FUNC_LOCAL_ARGS => {
                let dest = DelayedStore {
                    dest_type: DestType::ResumeCompressed,
                    dest_addr: self.printing_digit,
                };
                self.call_function(address, &args, dest, false)
            }
            _ => Err(VmError::InvalidStringType {
                kind: target,
                address,
            }),
        }
    }
}
