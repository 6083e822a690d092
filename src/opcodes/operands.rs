//! Operand addressing modes
//!
//! Decoded instructions carry [`LoadOperand`]s and [`StoreOperand`]s. The
//! encoder and disassembly work with the mode-neutral [`Operand`], which also
//! parses the textual forms `pop`/`push`, `*NNNN` (memory), `*R:NN` (RAM
//! relative) and `Fr:NN` (local), with hex addresses.

use crate::interpreter::errors::VmError;
use std::fmt;
use std::str::FromStr;

/// Where a load operand reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOperand {
    /// Immediate, already sign-extended
    Const(u32),
    Memory(u32),
    Ram(u32),
    Local(u32),
    Stack,
}

/// Where a store operand writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperand {
    Discard,
    Memory(u32),
    Ram(u32),
    Local(u32),
    Stack,
}

/// An operand independent of whether it is loaded or stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// Immediate value; as a store operand, `Const(0)` discards
    Const(i32),
    Addr(u32),
    Ram(u32),
    Local(u32),
    Stack,
}

impl From<LoadOperand> for Operand {
    fn from(op: LoadOperand) -> Self {
        match op {
            LoadOperand::Const(v) => Operand::Const(v as i32),
            LoadOperand::Memory(a) => Operand::Addr(a),
            LoadOperand::Ram(a) => Operand::Ram(a),
            LoadOperand::Local(a) => Operand::Local(a),
            LoadOperand::Stack => Operand::Stack,
        }
    }
}

impl From<StoreOperand> for Operand {
    fn from(op: StoreOperand) -> Self {
        match op {
            StoreOperand::Discard => Operand::Const(0),
            StoreOperand::Memory(a) => Operand::Addr(a),
            StoreOperand::Ram(a) => Operand::Ram(a),
            StoreOperand::Local(a) => Operand::Local(a),
            StoreOperand::Stack => Operand::Stack,
        }
    }
}

impl From<i32> for Operand {
    fn from(v: i32) -> Self {
        Operand::Const(v)
    }
}

fn parse_hex(s: &str, whole: &str) -> Result<u32, VmError> {
    u32::from_str_radix(s, 16).map_err(|_| VmError::InvalidOperand(whole.to_string()))
}

impl FromStr for Operand {
    type Err = VmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "pop" || s == "push" {
            Ok(Operand::Stack)
        } else if let Some(rest) = s.strip_prefix("*R:") {
            Ok(Operand::Ram(parse_hex(rest, s)?))
        } else if let Some(rest) = s.strip_prefix("Fr:") {
            Ok(Operand::Local(parse_hex(rest, s)?))
        } else if let Some(rest) = s.strip_prefix('*') {
            Ok(Operand::Addr(parse_hex(rest, s)?))
        } else if let Ok(v) = s.parse::<i32>() {
            Ok(Operand::Const(v))
        } else {
            // large unsigned immediates
            s.parse::<u32>()
                .map(|v| Operand::Const(v as i32))
                .map_err(|_| VmError::InvalidOperand(s.to_string()))
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Const(v) => write!(f, "{}", v),
            Operand::Addr(a) => write!(f, "*{:X}", a),
            Operand::Ram(a) => write!(f, "*R:{:X}", a),
            Operand::Local(a) => write!(f, "Fr:{:X}", a),
            Operand::Stack => f.write_str("sp"),
        }
    }
}
