// Execution engine for Glulx games

use super::constants::{FUNC_LOCAL_ARGS, FUNC_STACK_ARGS};
use super::errors::{VmError, VmResult};
use super::host::{Awaiting, Capabilities, HostReply, HostRequest, RunState};
use super::output::{merge_output, ChannelOutput, OutputBuffer};
use super::veneer::Veneer;
use crate::config::EngineOptions;
use crate::image::Image;
use crate::memory::heap::HeapAllocator;
use crate::memory::stack::{DestType, Stack};
use crate::opcodes::decoder::{decode, DecodedInstruction};
use crate::opcodes::handlers;
use crate::opcodes::machine::{DelayedStore, Flow, IoSystem};
use crate::opcodes::operands::{LoadOperand, StoreOperand};
use crate::opcodes::OpcodeRule;
use crate::snapshot::quetzal::Quetzal;
use crate::snapshot::SnapshotHistory;
use log::trace;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;

/// What the program counter currently walks through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Bytecode
    Code,
    /// Latin-1 characters of an E0 string
    CString,
    /// 32-bit characters of an E2 string
    UnicodeString,
    /// Digits of the signed number held in `pc`
    Number,
    /// Huffman-coded bits of an E1 string; `printing_digit` is the bit index
    CompressedString,
    /// A native routine finished a tail call; `pc` holds its result
    Return,
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecMode::Code => "code",
            ExecMode::CString => "c-string",
            ExecMode::UnicodeString => "unicode",
            ExecMode::Number => "number",
            ExecMode::CompressedString => "compressed",
            ExecMode::Return => "return",
        };
        f.write_str(name)
    }
}

/// Outcome of a single [`Engine::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// Suspended on a host request
    Waiting,
    Halted,
}

type OutputHandler = Box<dyn FnMut(ChannelOutput)>;

/// A running Glulx game
pub struct Engine {
    pub(crate) image: Image,
    pub(crate) stack: Stack,

    pub(crate) pc: u32,
    pub(crate) exec_mode: ExecMode,
    /// Digit index in number mode, bit index in compressed mode
    pub(crate) printing_digit: u32,
    pub(crate) decoding_table: u32,

    pub(crate) io_system: IoSystem,
    pub(crate) output: OutputBuffer,

    pub(crate) heap: Option<HeapAllocator>,
    pub(crate) rng: StdRng,
    pub(crate) veneer: Veneer,
    pub(crate) options: EngineOptions,
    pub(crate) capabilities: Capabilities,

    pub(crate) running: bool,
    pub(crate) awaiting: Option<Awaiting>,
    pub(crate) request: Option<HostRequest>,

    /// Range kept intact across `restart`
    pub(crate) protection: Option<(u32, u32)>,
    pub(crate) undo: SnapshotHistory,
    pub(crate) transition_requested: bool,

    output_handler: Option<OutputHandler>,
    /// Output waiting for `take_output` when no handler is installed
    delivered: ChannelOutput,
}

impl Engine {
    /// Load a game file. Nothing runs until [`start`](Self::start) or
    /// [`bootstrap`](Self::bootstrap).
    pub fn new(game: Vec<u8>, options: EngineOptions) -> VmResult<Engine> {
        let image = Image::new(game, options.max_memory)?;
        let stack_size = image.header().stack_size;
        if stack_size > options.max_memory {
            return Err(VmError::MemoryLimit {
                requested: stack_size,
                limit: options.max_memory,
            });
        }
        let stack = Stack::new(stack_size);
        let decoding_table = image.header().decoding_table;
        let rng = match options.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let undo = SnapshotHistory::new(options.undo_limit);

        Ok(Engine {
            image,
            stack,
            pc: 0,
            exec_mode: ExecMode::Code,
            printing_digit: 0,
            decoding_table,
            io_system: IoSystem::Null,
            output: OutputBuffer::new(),
            heap: None,
            rng,
            veneer: Veneer::new(),
            options,
            capabilities: Capabilities::default(),
            running: false,
            awaiting: None,
            request: None,
            protection: None,
            undo,
            transition_requested: false,
            output_handler: None,
            delivered: ChannelOutput::default(),
        })
    }

    pub fn set_capabilities(&mut self, capabilities: Capabilities) {
        self.capabilities = capabilities;
    }

    /// Receive each output batch as it is delivered instead of queueing it
    pub fn set_output_handler<F>(&mut self, handler: F)
    where
        F: FnMut(ChannelOutput) + 'static,
    {
        self.output_handler = Some(Box::new(handler));
    }

    /// Output delivered since the last call, when no handler is installed
    pub fn take_output(&mut self) -> ChannelOutput {
        std::mem::take(&mut self.delivered)
    }

    /// Set up the initial call frame for the start function
    pub fn bootstrap(&mut self) -> VmResult<()> {
        self.stack.reset();
        self.io_system = IoSystem::Null;
        self.exec_mode = ExecMode::Code;
        self.printing_digit = 0;
        self.awaiting = None;
        self.request = None;
        self.running = true;

        let start = self.image.header().start_func;
        let kind = self.image.read_byte(start)?;
        match kind {
            FUNC_STACK_ARGS => {
                self.enter_function(start, &[])?;
                self.stack.push(0)?;
            }
            FUNC_LOCAL_ARGS => self.enter_function(start, &[])?,
            _ => {
                return Err(VmError::InvalidFunctionType {
                    kind,
                    address: start,
                })
            }
        }
        Ok(())
    }

    /// Bootstrap and run until the first suspension or the end
    pub fn start(&mut self) -> VmResult<RunState> {
        self.bootstrap()?;
        self.run()
    }

    /// Run until the game halts or needs the host
    pub fn run(&mut self) -> VmResult<RunState> {
        loop {
            let step = match self.step() {
                Ok(step) => step,
                Err(err) => {
                    self.running = false;
                    self.deliver_output();
                    return Err(err);
                }
            };
            match step {
                Step::Continue => {}
                Step::Waiting => {
                    self.deliver_output();
                    let request = self.request.clone().ok_or(VmError::UnexpectedReply)?;
                    return Ok(RunState::Waiting(request));
                }
                Step::Halted => {
                    self.deliver_output();
                    return Ok(RunState::Halted);
                }
            }
        }
    }

    /// Advance by one instruction, or one output unit in a printing mode
    pub fn step(&mut self) -> VmResult<Step> {
        if self.awaiting.is_some() {
            return Ok(Step::Waiting);
        }
        if !self.running {
            return Ok(Step::Halted);
        }

        match self.exec_mode {
            ExecMode::Code => self.step_code()?,
            ExecMode::CString => self.next_cstring_char()?,
            ExecMode::UnicodeString => self.next_unicode_char()?,
            ExecMode::Number => self.next_digit()?,
            ExecMode::CompressedString => self.next_compressed_char()?,
            ExecMode::Return => {
                let result = self.pc;
                self.return_from_function(result)?;
            }
        }

        Ok(if self.awaiting.is_some() {
            Step::Waiting
        } else if self.running {
            Step::Continue
        } else {
            Step::Halted
        })
    }

    /// Complete the outstanding request and keep running
    pub fn resume_after_wait(&mut self, reply: HostReply) -> VmResult<RunState> {
        let awaiting = self.awaiting.take().ok_or(VmError::UnexpectedReply)?;
        let request = self.request.take();

        match (awaiting, reply) {
            (Awaiting::Line { buffer, size, stores }, HostReply::Line(text)) => {
                self.write_line(buffer, size, text.as_deref().unwrap_or(""))?;
                self.store_all(&stores, 0)?;
            }
            (Awaiting::Key { stores }, HostReply::Key(key)) => {
                self.store_all(&stores, key.map_or(0, |c| c as u32))?;
            }
            (Awaiting::Save(dest), HostReply::Saved(ok))
            | (Awaiting::SaveUndo(dest), HostReply::UndoSaved(ok)) => {
                self.store_delayed(dest, if ok { 0 } else { 1 })?;
            }
            (Awaiting::Restore(dest), HostReply::Loaded(data))
            | (Awaiting::RestoreUndo(dest), HostReply::UndoLoaded(data)) => match data {
                Some(bytes) => {
                    let quetzal = Quetzal::load(&bytes)?;
                    self.load_from_quetzal(&quetzal)?;
                }
                None => self.store_delayed(dest, 1)?,
            },
            (awaiting, _) => {
                self.awaiting = Some(awaiting);
                self.request = request;
                return Err(VmError::UnexpectedReply);
            }
        }
        self.run()
    }

    fn deliver_output(&mut self) {
        if self.output.is_empty() {
            return;
        }
        let batch = self.output.flush();
        match self.output_handler.as_mut() {
            Some(handler) => handler(batch),
            None => merge_output(&mut self.delivered, batch),
        }
    }

    fn step_code(&mut self) -> VmResult<()> {
        let instr = decode(self.image.memory(), self.pc)?;
        trace!(target: "fyrevm::exec", "{:#010x} {}", instr.address, instr.opcode);
        let (mnemonic, address) = (instr.opcode.mnemonic(), instr.address);
        self.execute_instruction(&instr)
            .map_err(|err| err.in_instruction(mnemonic, address))
    }

    fn execute_instruction(&mut self, instr: &DecodedInstruction) -> VmResult<()> {
        let width = operand_width(instr.opcode.rule());
        let args = instr
            .loads
            .iter()
            .map(|&op| self.load_operand(op, width))
            .collect::<VmResult<Vec<u32>>>()?;
        let dest = match instr.delayed {
            Some(op) => self.delayed_store(op),
            None => DelayedStore::NULL,
        };
        self.pc = instr.next_pc();

        match handlers::execute(self, instr.opcode, &args, dest)? {
            Flow::Next => {}
            Flow::Store(value) => {
                if let Some(&op) = instr.stores.first() {
                    self.store_operand(op, value, width)?;
                }
            }
            Flow::StorePair(first, second) => {
                if let [a, b] = instr.stores.as_slice() {
                    self.store_operand(*a, first, width)?;
                    self.store_operand(*b, second, width)?;
                }
            }
            Flow::Wait => match self.awaiting.as_mut() {
                Some(Awaiting::Line { stores, .. }) | Some(Awaiting::Key { stores }) => {
                    *stores = instr.stores.clone();
                }
                _ => {}
            },
        }
        Ok(())
    }

    fn load_operand(&mut self, op: LoadOperand, width: u32) -> VmResult<u32> {
        match op {
            LoadOperand::Const(value) => Ok(value),
            LoadOperand::Memory(address) => self.read_sized(address, width),
            LoadOperand::Ram(offset) => {
                let address = self.image.get_ram_address(offset);
                self.read_sized(address, width)
            }
            LoadOperand::Local(offset) => {
                let at = self.stack.local_address(offset, width)?;
                match width {
                    1 => Ok(self.stack.read_byte(at)? as u32),
                    2 => Ok(self.stack.read_u16(at)? as u32),
                    _ => self.stack.read_u32(at),
                }
            }
            LoadOperand::Stack => self.stack.pop(),
        }
    }

    pub(crate) fn store_operand(&mut self, op: StoreOperand, value: u32, width: u32) -> VmResult<()> {
        let value = mask(value, width);
        match op {
            StoreOperand::Discard => Ok(()),
            StoreOperand::Memory(address) => self.write_sized(address, value, width),
            StoreOperand::Ram(offset) => {
                let address = self.image.get_ram_address(offset);
                self.write_sized(address, value, width)
            }
            StoreOperand::Local(offset) => {
                let at = self.stack.local_address(offset, width)?;
                match width {
                    1 => self.stack.write_byte(at, value),
                    2 => self.stack.write_u16(at, value),
                    _ => self.stack.write_u32(at, value),
                }
            }
            StoreOperand::Stack => self.stack.push(value),
        }
    }

    fn store_all(&mut self, stores: &[StoreOperand], value: u32) -> VmResult<()> {
        for &op in stores {
            self.store_operand(op, value, 4)?;
        }
        Ok(())
    }

    fn read_sized(&self, address: u32, width: u32) -> VmResult<u32> {
        match width {
            1 => Ok(self.image.read_byte(address)? as u32),
            2 => Ok(self.image.read_u16(address)? as u32),
            _ => self.image.read_u32(address),
        }
    }

    fn write_sized(&mut self, address: u32, value: u32, width: u32) -> VmResult<()> {
        match width {
            1 => self.image.write_byte(address, value),
            2 => self.image.write_u16(address, value),
            _ => self.image.write_u32(address, value),
        }
    }

    /// Capture a store operand as a destination for later
    fn delayed_store(&self, op: StoreOperand) -> DelayedStore {
        let (dest_type, dest_addr) = match op {
            StoreOperand::Discard => (DestType::Null, 0),
            StoreOperand::Memory(address) => (DestType::Memory, address),
            StoreOperand::Ram(offset) => (DestType::Memory, self.image.get_ram_address(offset)),
            StoreOperand::Local(offset) => (DestType::Local, offset),
            StoreOperand::Stack => (DestType::Stack, 0),
        };
        DelayedStore {
            dest_type,
            dest_addr,
        }
    }

    // Accessors for hosts and the machine pane

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn fp(&self) -> u32 {
        self.stack.fp
    }

    pub fn sp(&self) -> u32 {
        self.stack.sp
    }

    pub fn frame_len(&self) -> u32 {
        self.stack.frame_len
    }

    pub fn locals_pos(&self) -> u32 {
        self.stack.locals_pos
    }

    pub fn exec_mode(&self) -> ExecMode {
        self.exec_mode
    }

    pub fn io_system(&self) -> IoSystem {
        self.io_system
    }

    pub fn current_channel(&self) -> &str {
        self.output.current_channel()
    }

    pub fn heap_blocks(&self) -> usize {
        self.heap.as_ref().map_or(0, HeapAllocator::block_count)
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn veneer(&self) -> &Veneer {
        &self.veneer
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_waiting(&self) -> bool {
        self.awaiting.is_some()
    }

    /// Whether the game asked for a screen transition since the last call
    pub fn take_transition_request(&mut self) -> bool {
        std::mem::take(&mut self.transition_requested)
    }

    /// The instruction at `pc` as text, when executing code
    pub fn disassemble_current(&self) -> Option<String> {
        if self.exec_mode != ExecMode::Code {
            return None;
        }
        let instr = decode(self.image.memory(), self.pc).ok()?;
        let operands: Vec<String> = instr.operands().iter().map(|op| op.to_string()).collect();
        Some(format!("{} {}", instr.opcode, operands.join(" ")).trim_end().to_string())
    }
}

fn operand_width(rule: OpcodeRule) -> u32 {
    match rule {
        OpcodeRule::Indirect8Bit => 1,
        OpcodeRule::Indirect16Bit => 2,
        _ => 4,
    }
}

fn mask(value: u32, width: u32) -> u32 {
    match width {
        1 => value & 0xFF,
        2 => value & 0xFFFF,
        _ => value,
    }
}
