// Helpers for assembling small game files in tests
#![allow(dead_code)]

use fyrevm::image::{HEADER_SIZE, MAGIC};
use fyrevm::interpreter::output::ChannelOutput;
use fyrevm::opcodes::encoder::encode_text;
use fyrevm::{Engine, EngineOptions, RunState};

pub const RAM_START: u32 = 0x400;
pub const START_FUNC: u32 = 0x100;
pub const END_MEM: u32 = 0x1000;

/// Assemble one instruction, panicking on bad test input
pub fn op(mnemonic: &str, operands: &[&str]) -> Vec<u8> {
    encode_text(mnemonic, operands)
        .unwrap_or_else(|e| panic!("cannot assemble {} {:?}: {}", mnemonic, operands, e))
}

/// Total length of a run of instructions, for branch offsets
pub fn len_of(code: &[Vec<u8>]) -> u32 {
    code.iter().map(|i| i.len() as u32).sum()
}

/// Branch offset that skips `code` when placed right before it
pub fn skip(code: &[Vec<u8>]) -> String {
    (len_of(code) + 2).to_string()
}

/// A Glulx 3.1 game file laid out in memory order
pub struct GameBuilder {
    bytes: Vec<u8>,
    ram_start: u32,
    end_mem: u32,
    stack_size: u32,
    start_func: u32,
    decoding_table: u32,
}

impl GameBuilder {
    pub fn new() -> Self {
        GameBuilder {
            bytes: vec![0; RAM_START as usize + 0x100],
            ram_start: RAM_START,
            end_mem: END_MEM,
            stack_size: 0x1000,
            start_func: START_FUNC,
            decoding_table: 0,
        }
    }

    pub fn layout(mut self, ram_start: u32, file_len: u32, end_mem: u32, stack_size: u32) -> Self {
        self.bytes.resize(file_len as usize, 0);
        self.ram_start = ram_start;
        self.end_mem = end_mem;
        self.stack_size = stack_size;
        self
    }

    pub fn start_func(mut self, address: u32) -> Self {
        self.start_func = address;
        self
    }

    pub fn decoding_table(mut self, address: u32) -> Self {
        self.decoding_table = address;
        self
    }

    pub fn bytes(mut self, address: u32, data: &[u8]) -> Self {
        let start = address as usize;
        assert!(start >= HEADER_SIZE as usize, "write over the header");
        if self.bytes.len() < start + data.len() {
            self.bytes.resize(start + data.len(), 0);
        }
        self.bytes[start..start + data.len()].copy_from_slice(data);
        self
    }

    /// A function taking its arguments in locals
    pub fn function(self, address: u32, locals: &[(u8, u8)], body: &[Vec<u8>]) -> Self {
        self.function_of_kind(0xC1, address, locals, body)
    }

    /// A function taking its arguments on the stack
    pub fn stack_function(self, address: u32, body: &[Vec<u8>]) -> Self {
        self.function_of_kind(0xC0, address, &[], body)
    }

    fn function_of_kind(self, kind: u8, address: u32, locals: &[(u8, u8)], body: &[Vec<u8>]) -> Self {
        let mut code = vec![kind];
        for &(size, count) in locals {
            code.push(size);
            code.push(count);
        }
        code.extend_from_slice(&[0, 0]);
        for instr in body {
            code.extend_from_slice(instr);
        }
        self.bytes(address, &code)
    }

    /// An `E0` string
    pub fn cstring(self, address: u32, text: &str) -> Self {
        let mut data = vec![0xE0];
        data.extend_from_slice(text.as_bytes());
        data.push(0);
        self.bytes(address, &data)
    }

    pub fn word(self, address: u32, value: u32) -> Self {
        self.bytes(address, &value.to_be_bytes())
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = self.bytes.clone();
        let file_len = out.len() as u32;
        let fields = [
            MAGIC,
            0x0003_0100,
            self.ram_start,
            file_len,
            self.end_mem.max(file_len),
            self.stack_size,
            self.start_func,
            self.decoding_table,
            0,
        ];
        for (i, field) in fields.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&field.to_be_bytes());
        }
        out
    }
}

pub fn engine(game: Vec<u8>) -> Engine {
    Engine::new(game, EngineOptions::default().with_seed(7)).expect("game should load")
}

/// Run a game with no host capabilities to the end and collect its output
pub fn run_to_end(engine: &mut Engine) -> ChannelOutput {
    let state = engine.start().expect("game should run");
    assert_eq!(state, RunState::Halted);
    engine.take_output()
}

/// RAM word at `offset` from the start of RAM
pub fn ram_word(engine: &Engine, offset: u32) -> u32 {
    engine
        .image()
        .read_u32(RAM_START + offset)
        .expect("address in range")
}
