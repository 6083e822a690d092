//! The `fyrecall` system call surface and the minimal Glk shim

use super::constants::{fyre, glk, channel_name, STRING_C, STRING_UNICODE};
use super::engine::Engine;
use super::errors::{VmError, VmResult};
use super::host::{Awaiting, HostRequest};
use crate::opcodes::machine::Flow;
use log::debug;

impl Engine {
    pub(crate) fn system_call(&mut self, call: u32, x: u32, y: u32) -> VmResult<Flow> {
        if !self.options.fyre_enabled {
            return Err(VmError::FyreCallDisabled);
        }

        match call {
            fyre::READ_LINE => {
                if self.capabilities.line_input {
                    let awaiting = Awaiting::Line {
                        buffer: x,
                        size: y,
                        stores: Vec::new(),
                    };
                    return self.suspend(HostRequest::ReadLine { max_len: y }, awaiting);
                }
                self.write_line(x, y, "")?;
                Ok(Flow::Store(0))
            }
            fyre::READ_KEY => {
                if self.capabilities.key_input {
                    let awaiting = Awaiting::Key { stores: Vec::new() };
                    return self.suspend(HostRequest::ReadKey, awaiting);
                }
                Ok(Flow::Store(0))
            }
            fyre::TO_LOWER => Ok(Flow::Store(map_case(x, char::to_lowercase))),
            fyre::TO_UPPER => Ok(Flow::Store(map_case(x, char::to_uppercase))),
            fyre::CHANNEL => {
                self.output.set_channel(channel_name(x));
                Ok(Flow::Store(0))
            }
            fyre::SET_VENEER => {
                let installed = self.options.veneer_enabled && self.veneer.set_slot(x, y);
                Ok(Flow::Store(installed as u32))
            }
            fyre::TRANSITION_REQUESTED => {
                self.transition_requested = x != 0;
                Ok(Flow::Store(0))
            }
            fyre::SET_STYLE => Ok(Flow::Store(0)),
            other => Err(VmError::UnknownFyreCall(other)),
        }
    }

    /// Write `text` into a line buffer: a length word, then up to `size`
    /// Latin-1 bytes
    pub(crate) fn write_line(&mut self, buffer: u32, size: u32, text: &str) -> VmResult<()> {
        let bytes: Vec<u8> = text
            .chars()
            .take(size as usize)
            .map(|c| u8::try_from(c as u32).unwrap_or(b'?'))
            .collect();
        self.image.write_u32(buffer, bytes.len() as u32)?;
        self.image.write_bytes(buffer + 4, &bytes)
    }

    /// Glk output calls. Everything is written to the current channel; all
    /// other selectors do nothing and return 0.
    pub(crate) fn glk_call(&mut self, selector: u32, args: &[u32]) -> VmResult<u32> {
        let arg = |i: usize| args.get(i).copied().unwrap_or(0);
        match selector {
            glk::PUT_CHAR | glk::PUT_CHAR_UNI => self.write_output(arg(0)),
            glk::PUT_CHAR_STREAM => self.write_output(arg(1)),
            glk::PUT_STRING => self.glk_put_string(arg(0))?,
            glk::PUT_STRING_STREAM => self.glk_put_string(arg(1))?,
            glk::PUT_STRING_UNI => self.glk_put_string_uni(arg(0))?,
            glk::PUT_BUFFER => self.glk_put_buffer(arg(0), arg(1))?,
            glk::PUT_BUFFER_STREAM => self.glk_put_buffer(arg(1), arg(2))?,
            glk::PUT_BUFFER_UNI => {
                for i in 0..arg(1) {
                    let ch = self.image.read_u32(arg(0) + 4 * i)?;
                    self.write_output(ch);
                }
            }
            other => debug!("glk selector {:#x} ignored", other),
        }
        Ok(0)
    }

    fn glk_put_string(&mut self, address: u32) -> VmResult<()> {
        let mut at = address;
        if self.image.read_byte(at)? == STRING_C {
            at += 1;
        }
        loop {
            let ch = self.image.read_byte(at)?;
            if ch == 0 {
                return Ok(());
            }
            self.write_output(ch as u32);
            at += 1;
        }
    }

    fn glk_put_string_uni(&mut self, address: u32) -> VmResult<()> {
        let mut at = address;
        if self.image.read_byte(at)? == STRING_UNICODE {
            at += 4;
        }
        loop {
            let ch = self.image.read_u32(at)?;
            if ch == 0 {
                return Ok(());
            }
            self.write_output(ch);
            at += 4;
        }
    }

    fn glk_put_buffer(&mut self, address: u32, len: u32) -> VmResult<()> {
        let bytes = self.image.read_bytes(address, len)?.to_vec();
        for b in bytes {
            self.write_output(b as u32);
        }
        Ok(())
    }
}

fn map_case<I>(ch: u32, convert: fn(char) -> I) -> u32
where
    I: Iterator<Item = char>,
{
    char::from_u32(ch)
        .and_then(|c| convert(c).next())
        .map_or(ch, |c| c as u32)
}
