//! The interface opcode handlers run against
//!
//! Handlers in [`handlers`](super::handlers) never touch the engine directly;
//! they see the VM through [`Machine`], which the engine implements.

use crate::image::Image;
use crate::interpreter::errors::VmResult;
use crate::memory::stack::{DestType, Stack};

/// What the engine does after a handler returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Nothing to store
    Next,
    /// Store into the first store operand
    Store(u32),
    /// Store into both store operands
    StorePair(u32, u32),
    /// Suspended until the host answers
    Wait,
}

/// A store destination captured now and written later
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayedStore {
    pub dest_type: DestType,
    pub dest_addr: u32,
}

impl DelayedStore {
    pub const NULL: DelayedStore = DelayedStore {
        dest_type: DestType::Null,
        dest_addr: 0,
    };
}

/// Output system selected by `setiosys`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoSystem {
    Null,
    Filter(u32),
    Glk,
    Channels,
}

impl IoSystem {
    pub const NULL: u32 = 0;
    pub const FILTER: u32 = 1;
    pub const GLK: u32 = 2;
    pub const CHANNELS: u32 = 20;

    pub fn from_mode(mode: u32, rock: u32) -> Option<IoSystem> {
        match mode {
            Self::NULL => Some(IoSystem::Null),
            Self::FILTER => Some(IoSystem::Filter(rock)),
            Self::GLK => Some(IoSystem::Glk),
            Self::CHANNELS => Some(IoSystem::Channels),
            _ => None,
        }
    }

    /// `(mode, rock)` as reported by `getiosys`
    pub fn mode_and_rock(&self) -> (u32, u32) {
        match *self {
            IoSystem::Null => (Self::NULL, 0),
            IoSystem::Filter(addr) => (Self::FILTER, addr),
            IoSystem::Glk => (Self::GLK, 0),
            IoSystem::Channels => (Self::CHANNELS, 0),
        }
    }
}

pub trait Machine {
    fn image(&self) -> &Image;
    fn image_mut(&mut self) -> &mut Image;
    fn stack(&self) -> &Stack;
    fn stack_mut(&mut self) -> &mut Stack;

    fn pc(&self) -> u32;
    fn set_pc(&mut self, pc: u32);

    // control flow
    fn take_branch(&mut self, offset: u32) -> VmResult<()>;
    fn leave_function(&mut self, result: u32) -> VmResult<()>;
    fn perform_call(
        &mut self,
        address: u32,
        args: &[u32],
        dest: DelayedStore,
        tail_call: bool,
    ) -> VmResult<()>;
    fn perform_delayed_store(&mut self, dest: DelayedStore, value: u32) -> VmResult<()>;
    fn resume_from_call_stub(&mut self, result: u32) -> VmResult<()>;
    fn quit(&mut self);
    fn restart(&mut self) -> VmResult<()>;

    // output
    fn io_system(&self) -> IoSystem;
    fn set_io_system(&mut self, mode: u32, rock: u32);
    fn stream_char(&mut self, ch: u32) -> VmResult<()>;
    fn stream_unichar(&mut self, ch: u32) -> VmResult<()>;
    fn stream_num(&mut self, value: u32) -> VmResult<()>;
    fn stream_string(&mut self, address: u32) -> VmResult<()>;
    fn decoding_table(&self) -> u32;
    fn set_decoding_table(&mut self, address: u32);

    // memory and heap
    fn set_mem_size(&mut self, size: u32) -> u32;
    fn heap_start(&self) -> u32;
    fn malloc(&mut self, size: u32) -> u32;
    fn mfree(&mut self, address: u32) -> VmResult<()>;
    fn protect(&mut self, start: u32, len: u32);

    // host and state
    fn random(&mut self, range: u32) -> u32;
    fn set_random(&mut self, seed: u32);
    fn save(&mut self, dest: DelayedStore) -> VmResult<Flow>;
    fn restore(&mut self, dest: DelayedStore) -> VmResult<Flow>;
    fn save_undo(&mut self, dest: DelayedStore) -> VmResult<Flow>;
    fn restore_undo(&mut self, dest: DelayedStore) -> VmResult<Flow>;
    fn glk(&mut self, selector: u32, args: &[u32]) -> VmResult<u32>;
    fn fyre_call(&mut self, call: u32, x: u32, y: u32) -> VmResult<Flow>;
    fn accel_func(&mut self, number: u32, address: u32);
    fn accel_param(&mut self, index: u32, value: u32);
}
