//! Fatal error types for the VM
//!
//! This module defines [`VmError`], covering every condition that stops a game:
//! a malformed image, a decoding failure, a bad memory or stack access, or an
//! incompatible save file.
//!
//! Errors raised while an instruction executes are wrapped in
//! [`VmError::Instruction`] so the host sees which opcode failed and where.
//! Object-model misuse caught by the veneer is not an error: it is logged and
//! the routine yields 0.

use crate::memory::MemoryError;
use crate::snapshot::quetzal::QuetzalError;
use thiserror::Error;

pub type VmResult<T> = Result<T, VmError>;

#[derive(Debug, Error)]
pub enum VmError {
    #[error("game file is too short ({0} bytes)")]
    ImageTooShort(usize),

    #[error("not a Glulx game file (magic {0:#010x})")]
    BadMagic(u32),

    #[error("unsupported Glulx version {major}.{minor}")]
    UnsupportedVersion { major: u32, minor: u32 },

    #[error("inconsistent header: ramStart {ram_start:#x}, endMem {end_mem:#x}")]
    InconsistentHeader { ram_start: u32, end_mem: u32 },

    #[error("unrecognized opcode {opcode:#x} at {address:#010x}")]
    UnknownOpcode { opcode: u32, address: u32 },

    #[error("unrecognized mnemonic '{0}'")]
    UnknownMnemonic(String),

    #[error("invalid operand '{0}'")]
    InvalidOperand(String),

    #[error("wrong operand count for {mnemonic}: expected {expected}, got {got}")]
    OperandCount {
        mnemonic: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("unsupported operand type {mode:#x} at {address:#010x}")]
    InvalidOperandType { mode: u8, address: u32 },

    #[error("unsupported store operand type {mode:#x} at {address:#010x}")]
    InvalidStoreOperandType { mode: u8, address: u32 },

    #[error("write into ROM at {0:#010x}")]
    RomWrite(u32),

    #[error("game needs {requested:#x} bytes of memory, limit is {limit:#x}")]
    MemoryLimit { requested: u32, limit: u32 },

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("stack overflow")]
    StackOverflow,

    #[error("stack underflow")]
    StackUnderflow,

    #[error("local variable access out of frame at offset {0:#x}")]
    LocalOutOfRange(u32),

    #[error("invalid calling convention {kind:#04x} for function at {address:#010x}")]
    InvalidFunctionType { kind: u8, address: u32 },

    #[error("invalid locals format in function at {0:#010x}")]
    InvalidLocalsFormat(u32),

    #[error("invalid destination type {0} in call stub")]
    InvalidDestType(u32),

    #[error("invalid string type {kind:#04x} at {address:#010x}")]
    InvalidStringType { kind: u8, address: u32 },

    #[error("invalid node type {kind:#04x} in string decoding table at {address:#010x}")]
    InvalidNodeType { kind: u8, address: u32 },

    #[error("compressed string printed with no decoding table")]
    NoDecodingTable,

    #[error("invalid catch token {0:#x}")]
    InvalidCatchToken(u32),

    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid key size {0} for a direct search key")]
    InvalidKeySize(u32),

    #[error("attempt to free unallocated block at {0:#010x}")]
    InvalidFree(u32),

    #[error("debugtrap: {0:#x}")]
    DebugTrap(u32),

    #[error("unrecognized fyrecall {0}")]
    UnknownFyreCall(u32),

    #[error("fyrecall is disabled")]
    FyreCallDisabled,

    #[error("saved game doesn't match this story file")]
    SaveMismatch,

    #[error("saved game is missing the {0} chunk")]
    MissingChunk(&'static str),

    #[error("compressed memory (CMem) is not supported")]
    CompressedMemory,

    #[error("corrupt {0} chunk in saved game")]
    CorruptChunk(&'static str),

    #[error(transparent)]
    Quetzal(#[from] QuetzalError),

    #[error("host reply does not match the pending request")]
    UnexpectedReply,

    #[error("{mnemonic} at {address:#010x}: {source}")]
    Instruction {
        mnemonic: &'static str,
        address: u32,
        #[source]
        source: Box<VmError>,
    },
}

impl VmError {
    /// Attach the failing instruction to an error
    pub fn in_instruction(self, mnemonic: &'static str, address: u32) -> Self {
        match self {
            VmError::Instruction { .. } => self,
            other => VmError::Instruction {
                mnemonic,
                address,
                source: Box::new(other),
            },
        }
    }

    /// The underlying error, without instruction context
    pub fn root(&self) -> &VmError {
        match self {
            VmError::Instruction { source, .. } => source.root(),
            other => other,
        }
    }
}
